//! Assembly model
//!
//! Parts and coincident constraints live in slot maps owned by the [`Model`].
//! Vertices are addressed by `(PartId, Corner)` keys, so neither parts nor
//! constraints hold references to each other.

mod constraint;
mod part;

use glam::{DQuat, DVec3};
use slotmap::SlotMap;
use tracing::debug;

pub use constraint::{CoincidentConstraint, Side};
pub use part::{Corner, FixedDimension, InvalidCorner, Part, PartKind, PartVertex};

use crate::geometry::{self, Plane};

slotmap::new_key_type! {
    /// Key of a part in a [`Model`]
    pub struct PartId;

    /// Key of a coincident constraint in a [`Model`]
    pub struct ConstraintId;
}

/// Address of one part corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexRef {
    pub part: PartId,
    pub corner: Corner,
}

impl VertexRef {
    pub fn new(part: PartId, corner: Corner) -> Self {
        Self { part, corner }
    }
}

/// Notifications for observers such as renderers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEvent {
    PartAdded(PartId),
    PartRemoved(PartId),
    /// Position, size or rotation changed
    PartChanged(PartId),
}

/// Model-related errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Part not found: {0:?}")]
    PartNotFound(PartId),
    #[error("Constraint not found: {0:?}")]
    ConstraintNotFound(ConstraintId),
    #[error("Vertex {0:?} cannot be coincident with itself")]
    SelfCoincident(VertexRef),
    #[error("Vertices are already joined by constraint {0:?}")]
    DuplicateConstraint(ConstraintId),
    #[error("Constraint {constraint:?} references removed part {part:?}")]
    DanglingConstraint {
        constraint: ConstraintId,
        part: PartId,
    },
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Parts and the coincident constraints between their corners
#[derive(Debug, Default)]
pub struct Model {
    parts: SlotMap<PartId, Part>,
    constraints: SlotMap<ConstraintId, CoincidentConstraint>,
    events: Vec<ModelEvent>,
    /// Bumped when parts or constraints are added or removed
    structure_revision: u64,
    /// Bumped on every position, size or rotation write
    geometry_revision: u64,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    // ============== Parts ==============

    /// Add a part, dropping any constraint registrations it carries
    pub fn add_part(&mut self, mut part: Part) -> PartId {
        part.clear_constraints();
        let name = part.name.clone();
        let id = self.parts.insert(part);
        self.structure_revision += 1;
        self.events.push(ModelEvent::PartAdded(id));
        debug!("Added part '{}' ({:?})", name, id);
        id
    }

    /// Remove a part.
    ///
    /// Constraints touching it stay in the model and are reported by
    /// [`Model::validate`]; use [`Model::remove_part_with_constraints`] to
    /// drop them as well.
    pub fn remove_part(&mut self, id: PartId) -> Option<Part> {
        let part = self.parts.remove(id)?;
        self.structure_revision += 1;
        self.events.push(ModelEvent::PartRemoved(id));
        debug!("Removed part '{}' ({:?})", part.name, id);
        Some(part)
    }

    /// Remove a part together with every constraint touching it
    pub fn remove_part_with_constraints(&mut self, id: PartId) -> Option<Part> {
        if !self.parts.contains_key(id) {
            return None;
        }
        let touching: Vec<ConstraintId> = self
            .constraints
            .iter()
            .filter(|(_, c)| c.touches_part(id))
            .map(|(cid, _)| cid)
            .collect();
        for cid in touching {
            self.remove_constraint(cid);
        }
        self.remove_part(id)
    }

    pub fn part(&self, id: PartId) -> Option<&Part> {
        self.parts.get(id)
    }

    pub fn contains_part(&self, id: PartId) -> bool {
        self.parts.contains_key(id)
    }

    /// Parts in insertion order of their slots
    pub fn parts(&self) -> impl Iterator<Item = (PartId, &Part)> {
        self.parts.iter()
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Find a part by name
    pub fn find_part(&self, name: &str) -> Option<PartId> {
        self.parts
            .iter()
            .find(|(_, part)| part.name == name)
            .map(|(id, _)| id)
    }

    /// Set a part's position and size
    pub fn set_part_geometry(&mut self, id: PartId, position: DVec3, size: DVec3) -> ModelResult<()> {
        let part = self.parts.get_mut(id).ok_or(ModelError::PartNotFound(id))?;
        part.set_geometry(position, size);
        self.geometry_changed(id);
        Ok(())
    }

    pub fn set_part_rotation(&mut self, id: PartId, rotation: DQuat) -> ModelResult<()> {
        let part = self.parts.get_mut(id).ok_or(ModelError::PartNotFound(id))?;
        part.set_rotation(rotation);
        self.geometry_changed(id);
        Ok(())
    }

    fn geometry_changed(&mut self, id: PartId) {
        self.geometry_revision += 1;
        self.events.push(ModelEvent::PartChanged(id));
    }

    // ============== Constraints ==============

    /// Join two corners with a coincident constraint, registering it on both
    pub fn add_constraint(&mut self, a: VertexRef, b: VertexRef) -> ModelResult<ConstraintId> {
        if a == b {
            return Err(ModelError::SelfCoincident(a));
        }
        let part_a = self.parts.get(a.part).ok_or(ModelError::PartNotFound(a.part))?;
        if !self.parts.contains_key(b.part) {
            return Err(ModelError::PartNotFound(b.part));
        }
        if let Some(existing) = part_a
            .constraints_at(a.corner)
            .iter()
            .copied()
            .find(|cid| self.constraints.get(*cid).is_some_and(|c| c.joins(a, b)))
        {
            return Err(ModelError::DuplicateConstraint(existing));
        }

        let id = self.constraints.insert(CoincidentConstraint::new(a, b));
        for vertex in [a, b] {
            if let Some(part) = self.parts.get_mut(vertex.part) {
                part.register_constraint(vertex.corner, id);
            }
        }
        self.structure_revision += 1;
        Ok(id)
    }

    /// Remove a constraint, deregistering it from whichever of its parts remain
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Option<CoincidentConstraint> {
        let constraint = self.constraints.remove(id)?;
        for vertex in constraint.vertices() {
            if let Some(part) = self.parts.get_mut(vertex.part) {
                part.unregister_constraint(vertex.corner, id);
            }
        }
        self.structure_revision += 1;
        Some(constraint)
    }

    pub fn constraint(&self, id: ConstraintId) -> Option<&CoincidentConstraint> {
        self.constraints.get(id)
    }

    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintId, &CoincidentConstraint)> {
        self.constraints.iter()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    // ============== Vertices ==============

    pub fn vertex(&self, vertex: VertexRef) -> Option<PartVertex<'_>> {
        self.parts.get(vertex.part).map(|part| part.vertex(vertex.corner))
    }

    /// Constraints registered on a vertex (empty if its part is gone)
    pub fn constraints_at(&self, vertex: VertexRef) -> &[ConstraintId] {
        self.parts
            .get(vertex.part)
            .map(|part| part.constraints_at(vertex.corner))
            .unwrap_or(&[])
    }

    /// Plane of the face containing a vertex (normal along the part's local Z)
    pub fn face_plane(&self, vertex: VertexRef) -> Option<Plane> {
        let part = self.parts.get(vertex.part)?;
        let [_, _, z] = geometry::axes(part.rotation());
        Some(Plane::new(part.vertex_position(vertex.corner), z))
    }

    // ============== Bookkeeping ==============

    /// Check that every constraint joins corners of parts in the model
    pub fn validate(&self) -> Result<(), Vec<ModelError>> {
        let errors: Vec<ModelError> = self
            .constraints
            .iter()
            .flat_map(|(cid, c)| {
                c.vertices()
                    .into_iter()
                    .filter(|v| !self.parts.contains_key(v.part))
                    .map(move |v| ModelError::DanglingConstraint {
                        constraint: cid,
                        part: v.part,
                    })
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Take the queued events
    pub fn drain_events(&mut self) -> Vec<ModelEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn structure_revision(&self) -> u64 {
        self.structure_revision
    }

    pub fn geometry_revision(&self) -> u64 {
        self.geometry_revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corner(index: u8) -> Corner {
        Corner::new(index).unwrap()
    }

    fn two_panels() -> (Model, PartId, PartId) {
        let mut model = Model::new();
        let a = model.add_part(Part::panel("a", DVec3::new(100.0, 50.0, 10.0)));
        let b = model.add_part(
            Part::panel("b", DVec3::new(100.0, 50.0, 10.0))
                .with_position(DVec3::new(100.0, 0.0, 0.0)),
        );
        (model, a, b)
    }

    #[test]
    fn test_add_part_emits_event() {
        let (mut model, a, b) = two_panels();
        assert_eq!(
            model.drain_events(),
            vec![ModelEvent::PartAdded(a), ModelEvent::PartAdded(b)]
        );
        assert!(model.drain_events().is_empty());
        assert_eq!(model.find_part("b"), Some(b));
        assert_eq!(model.part_count(), 2);
    }

    #[test]
    fn test_constraint_registered_on_both_vertices() {
        let (mut model, a, b) = two_panels();
        let va = VertexRef::new(a, corner(1));
        let vb = VertexRef::new(b, corner(0));
        let revision = model.structure_revision();
        model.drain_events();

        let id = model.add_constraint(va, vb).unwrap();
        assert_eq!(model.constraints_at(va), &[id]);
        assert_eq!(model.vertex(vb).unwrap().constraints(), &[id]);
        assert!(model.structure_revision() > revision);
        // Constraint edits are not announced
        assert!(model.drain_events().is_empty());

        model.remove_constraint(id).unwrap();
        assert!(model.constraints_at(va).is_empty());
        assert!(model.constraints_at(vb).is_empty());
    }

    #[test]
    fn test_rejects_self_and_duplicate_constraints() {
        let (mut model, a, b) = two_panels();
        let va = VertexRef::new(a, corner(1));
        let vb = VertexRef::new(b, corner(0));

        assert_eq!(
            model.add_constraint(va, va),
            Err(ModelError::SelfCoincident(va))
        );
        let id = model.add_constraint(va, vb).unwrap();
        assert_eq!(
            model.add_constraint(vb, va),
            Err(ModelError::DuplicateConstraint(id))
        );
    }

    #[test]
    fn test_constraint_on_missing_part() {
        let (mut model, a, b) = two_panels();
        model.remove_part(b);
        let result = model.add_constraint(VertexRef::new(a, corner(0)), VertexRef::new(b, corner(0)));
        assert_eq!(result, Err(ModelError::PartNotFound(b)));
    }

    #[test]
    fn test_remove_part_leaves_dangling_constraint() {
        let (mut model, a, b) = two_panels();
        let id = model
            .add_constraint(VertexRef::new(a, corner(1)), VertexRef::new(b, corner(0)))
            .unwrap();

        model.remove_part(b);
        assert!(model.constraint(id).is_some());
        assert_eq!(
            model.validate(),
            Err(vec![ModelError::DanglingConstraint { constraint: id, part: b }])
        );
    }

    #[test]
    fn test_remove_part_with_constraints() {
        let (mut model, a, b) = two_panels();
        let va = VertexRef::new(a, corner(1));
        model
            .add_constraint(va, VertexRef::new(b, corner(0)))
            .unwrap();

        assert!(model.remove_part_with_constraints(b).is_some());
        assert_eq!(model.constraint_count(), 0);
        assert!(model.constraints_at(va).is_empty());
        assert!(model.validate().is_ok());
        assert!(model.remove_part_with_constraints(b).is_none());
    }

    #[test]
    fn test_geometry_write_emits_change() {
        let (mut model, a, _) = two_panels();
        model.drain_events();
        let revision = model.geometry_revision();

        model
            .set_part_geometry(a, DVec3::new(1.0, 2.0, 3.0), DVec3::ONE)
            .unwrap();
        assert_eq!(model.drain_events(), vec![ModelEvent::PartChanged(a)]);
        assert_eq!(model.geometry_revision(), revision + 1);
        assert_eq!(
            model.vertex(VertexRef::new(a, Corner::FAR)).unwrap().position(),
            DVec3::new(2.0, 3.0, 4.0)
        );
    }

    #[test]
    fn test_face_plane() {
        let (model, a, _) = two_panels();
        let plane = model.face_plane(VertexRef::new(a, corner(5))).unwrap();
        assert_eq!(plane.normal, DVec3::Z);
        assert_eq!(plane.signed_distance(DVec3::new(3.0, 4.0, 10.0)), 0.0);
    }
}
