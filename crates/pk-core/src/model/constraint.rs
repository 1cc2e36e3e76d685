//! Coincident constraints between part vertices

use super::{PartId, VertexRef};

/// Which end of a coincident constraint a vertex fills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Vertex1,
    Vertex2,
}

/// Asserts that two part corners share one world position.
///
/// The relation is symmetric; `(a, b)` and `(b, a)` describe the same
/// constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoincidentConstraint {
    vertex1: VertexRef,
    vertex2: VertexRef,
}

impl CoincidentConstraint {
    pub(crate) fn new(vertex1: VertexRef, vertex2: VertexRef) -> Self {
        Self { vertex1, vertex2 }
    }

    pub fn vertex1(&self) -> VertexRef {
        self.vertex1
    }

    pub fn vertex2(&self) -> VertexRef {
        self.vertex2
    }

    pub fn vertices(&self) -> [VertexRef; 2] {
        [self.vertex1, self.vertex2]
    }

    pub fn vertex(&self, side: Side) -> VertexRef {
        match side {
            Side::Vertex1 => self.vertex1,
            Side::Vertex2 => self.vertex2,
        }
    }

    /// Side filled by `vertex`, `None` if the constraint does not touch it
    pub fn side_of(&self, vertex: VertexRef) -> Option<Side> {
        if self.vertex1 == vertex {
            Some(Side::Vertex1)
        } else if self.vertex2 == vertex {
            Some(Side::Vertex2)
        } else {
            None
        }
    }

    /// The vertex on the other side of `vertex`
    pub fn other(&self, vertex: VertexRef) -> Option<VertexRef> {
        self.side_of(vertex).map(|side| match side {
            Side::Vertex1 => self.vertex2,
            Side::Vertex2 => self.vertex1,
        })
    }

    /// Whether either vertex belongs to `part`
    pub fn touches_part(&self, part: PartId) -> bool {
        self.vertex1.part == part || self.vertex2.part == part
    }

    /// Whether this constraint joins the same pair of vertices, in any order
    pub fn joins(&self, a: VertexRef, b: VertexRef) -> bool {
        (self.vertex1 == a && self.vertex2 == b) || (self.vertex1 == b && self.vertex2 == a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Corner, Model, Part};
    use glam::DVec3;

    fn two_refs() -> (VertexRef, VertexRef, PartId) {
        let mut model = Model::new();
        let a = model.add_part(Part::panel("a", DVec3::ONE));
        let b = model.add_part(Part::panel("b", DVec3::ONE));
        (
            VertexRef::new(a, Corner::FAR),
            VertexRef::new(b, Corner::ORIGIN),
            a,
        )
    }

    #[test]
    fn test_sides() {
        let (a, b, part_a) = two_refs();
        let constraint = CoincidentConstraint::new(a, b);

        assert_eq!(constraint.side_of(a), Some(Side::Vertex1));
        assert_eq!(constraint.side_of(b), Some(Side::Vertex2));
        assert_eq!(constraint.vertex(Side::Vertex2), b);
        assert_eq!(constraint.other(b), Some(a));
        assert!(constraint.touches_part(part_a));

        let unrelated = VertexRef::new(part_a, Corner::ORIGIN);
        assert_eq!(constraint.side_of(unrelated), None);
        assert_eq!(constraint.other(unrelated), None);
    }

    #[test]
    fn test_joins_is_symmetric() {
        let (a, b, _) = two_refs();
        let constraint = CoincidentConstraint::new(a, b);
        assert!(constraint.joins(a, b));
        assert!(constraint.joins(b, a));
        assert!(!constraint.joins(a, a));
    }
}
