//! Solve driver configuration
//!
//! Settings can be loaded from a RON file; missing fields take their
//! defaults.

use std::path::Path;

use pk_sketch::SolverConfig;
use serde::{Deserialize, Serialize};

/// Settings of a [`crate::solver::SolveDriver`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Numeric settings passed to the engine's solver
    pub solver: SolverConfig,
    /// Report every unsatisfied constraint of a failed solve
    pub force_all: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            force_all: true,
        }
    }
}

impl DriverConfig {
    /// Load a config from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_ron(&content)
    }

    /// Parse a config from RON text
    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        ron::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

/// Config-related errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Config parse error: {0}")]
    Parse(String),
    #[error("Serialization error: {0}")]
    Serialize(String),
}
