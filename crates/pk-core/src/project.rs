//! Project file serialization

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{Corner, Model, Part, PartId, VertexRef};

/// Current project file format version
pub const PROJECT_VERSION: u32 = 1;

/// A part corner addressed by the part's position in [`Project::parts`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexRecord {
    pub part: usize,
    pub corner: Corner,
}

/// Project file: parts and the coincident constraints between them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// File format version
    pub version: u32,
    /// Project name
    pub name: String,
    pub parts: Vec<Part>,
    pub constraints: Vec<(VertexRecord, VertexRecord)>,
}

impl Default for Project {
    fn default() -> Self {
        Self::new("New Project")
    }
}

impl Project {
    /// Create a new empty project
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: PROJECT_VERSION,
            name: name.into(),
            parts: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Snapshot a model.
    ///
    /// Constraints that reference removed parts cannot be stored and are
    /// dropped.
    pub fn from_model(name: impl Into<String>, model: &Model) -> Self {
        let mut index = HashMap::new();
        let mut parts = Vec::with_capacity(model.part_count());
        for (id, part) in model.parts() {
            index.insert(id, parts.len());
            parts.push(part.clone());
        }

        let record = |vertex: VertexRef| {
            index.get(&vertex.part).map(|&part| VertexRecord {
                part,
                corner: vertex.corner,
            })
        };
        let mut constraints = Vec::with_capacity(model.constraint_count());
        for (id, constraint) in model.constraints() {
            match (record(constraint.vertex1()), record(constraint.vertex2())) {
                (Some(a), Some(b)) => constraints.push((a, b)),
                _ => warn!("Skipping constraint {:?} on a removed part", id),
            }
        }

        Self {
            version: PROJECT_VERSION,
            name: name.into(),
            parts,
            constraints,
        }
    }

    /// Build a model, returning it with the ids of [`Project::parts`] in order
    pub fn into_model(self) -> Result<(Model, Vec<PartId>), ProjectError> {
        if self.version > PROJECT_VERSION {
            return Err(ProjectError::UnsupportedVersion(self.version));
        }

        let mut model = Model::new();
        let ids: Vec<PartId> = self.parts.into_iter().map(|p| model.add_part(p)).collect();

        for (n, (a, b)) in self.constraints.into_iter().enumerate() {
            let resolve = |record: VertexRecord| {
                ids.get(record.part)
                    .map(|&part| VertexRef::new(part, record.corner))
                    .ok_or_else(|| {
                        ProjectError::InvalidConstraint(format!(
                            "constraint {n} references part {} of {}",
                            record.part,
                            ids.len()
                        ))
                    })
            };
            let (a, b) = (resolve(a)?, resolve(b)?);
            model
                .add_constraint(a, b)
                .map_err(|e| ProjectError::InvalidConstraint(format!("constraint {n}: {e}")))?;
        }

        // Loading is not an edit observers need to hear about
        model.drain_events();
        Ok((model, ids))
    }

    /// Save project to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        let path = path.as_ref();
        let content = self.to_bytes()?;
        std::fs::write(path, content).map_err(|e| ProjectError::Io(e.to_string()))?;
        Ok(())
    }

    /// Serialize project to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProjectError> {
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ProjectError::Serialize(e.to_string()))?;
        Ok(content.into_bytes())
    }

    /// Load project from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ProjectError::Io(e.to_string()))?;
        let project: Project =
            ron::from_str(&content).map_err(|e| ProjectError::Deserialize(e.to_string()))?;
        Ok(project)
    }

    /// Load project from bytes
    pub fn load_from_bytes(data: &[u8]) -> Result<Self, ProjectError> {
        let content =
            std::str::from_utf8(data).map_err(|e| ProjectError::Deserialize(e.to_string()))?;
        let project: Project =
            ron::from_str(content).map_err(|e| ProjectError::Deserialize(e.to_string()))?;
        Ok(project)
    }

    /// Find a part index by name
    pub fn find_part(&self, name: &str) -> Option<usize> {
        self.parts.iter().position(|p| p.name == name)
    }
}

/// Project-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Unsupported project version: {0}")]
    UnsupportedVersion(u32),
    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),
}
