//! Part, Corner and PartVertex definitions

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use super::ConstraintId;
use crate::geometry;

/// One of the 8 corners of a part, indexed by `x + 2y + 4z`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Corner(u8);

/// A corner index outside 0..8
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid corner index: {0} (expected 0..8)")]
pub struct InvalidCorner(pub u8);

impl Corner {
    pub const COUNT: usize = 8;

    pub const ALL: [Corner; 8] = [
        Corner(0),
        Corner(1),
        Corner(2),
        Corner(3),
        Corner(4),
        Corner(5),
        Corner(6),
        Corner(7),
    ];

    /// Corner at the part's local origin
    pub const ORIGIN: Corner = Corner(0);

    /// Corner diagonally opposite the local origin
    pub const FAR: Corner = Corner(7);

    pub fn new(index: u8) -> Option<Self> {
        (index < 8).then_some(Self(index))
    }

    pub fn from_coords(x: bool, y: bool, z: bool) -> Self {
        Self(x as u8 | (y as u8) << 1 | (z as u8) << 2)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn x(self) -> u8 {
        self.0 & 1
    }

    pub fn y(self) -> u8 {
        (self.0 >> 1) & 1
    }

    /// Not masked, so a corrupted index shows up as a value above 1
    pub fn z(self) -> u8 {
        self.0 >> 2
    }

    /// Local coordinate triple as a vector of 0s and 1s
    pub fn unit(self) -> DVec3 {
        DVec3::new(self.x() as f64, self.y() as f64, self.z() as f64)
    }

    /// The corner on the same (x, y) edge in the other face
    pub fn across(self) -> Corner {
        Corner(self.0 ^ 0b100)
    }
}

impl TryFrom<u8> for Corner {
    type Error = InvalidCorner;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Corner::new(index).ok_or(InvalidCorner(index))
    }
}

impl From<Corner> for u8 {
    fn from(corner: Corner) -> Self {
        corner.0
    }
}

impl std::fmt::Display for Corner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x(), self.y(), self.z())
    }
}

/// A dimension a part variant holds fixed during solving
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedDimension {
    pub from: Corner,
    pub to: Corner,
    pub length: f64,
}

/// Part variant, deciding which cross-section dimensions are fixed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PartKind {
    /// Sheet material: only the thickness (local Z) is fixed
    Panel { thickness: f64 },
    /// Stock with a fixed cross-section: width (local Y) and height (local Z)
    /// are fixed, the length (local X) is free
    Beam { width: f64, height: f64 },
}

impl PartKind {
    pub fn name(&self) -> &'static str {
        match self {
            PartKind::Panel { .. } => "Panel",
            PartKind::Beam { .. } => "Beam",
        }
    }

    /// Corner distances held fixed for this variant
    pub fn fixed_dimensions(&self) -> Vec<FixedDimension> {
        match *self {
            PartKind::Panel { thickness } => vec![FixedDimension {
                from: Corner::ORIGIN,
                to: Corner(4),
                length: thickness,
            }],
            PartKind::Beam { width, height } => vec![
                FixedDimension {
                    from: Corner::ORIGIN,
                    to: Corner(2),
                    length: width,
                },
                FixedDimension {
                    from: Corner::ORIGIN,
                    to: Corner(4),
                    length: height,
                },
            ],
        }
    }
}

/// An oriented rectangular prism
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    /// World position of corner (0, 0, 0)
    position: DVec3,
    /// Extents along the local axes; negative flips the part along that axis
    size: DVec3,
    /// Orientation of the local axes
    rotation: DQuat,
    kind: PartKind,
    /// Coincident constraints touching each corner (runtime only)
    #[serde(skip)]
    vertex_constraints: [Vec<ConstraintId>; 8],
}

impl Part {
    /// Create a part of the given variant at the world origin
    pub fn new(name: impl Into<String>, kind: PartKind, size: DVec3) -> Self {
        Self {
            name: name.into(),
            position: DVec3::ZERO,
            size,
            rotation: DQuat::IDENTITY,
            kind,
            vertex_constraints: Default::default(),
        }
    }

    /// Create a panel whose thickness is the Z extent of `size`
    pub fn panel(name: impl Into<String>, size: DVec3) -> Self {
        Self::new(
            name,
            PartKind::Panel {
                thickness: size.z.abs(),
            },
            size,
        )
    }

    /// Create a beam whose cross-section is the Y and Z extents of `size`
    pub fn beam(name: impl Into<String>, size: DVec3) -> Self {
        Self::new(
            name,
            PartKind::Beam {
                width: size.y.abs(),
                height: size.z.abs(),
            },
            size,
        )
    }

    pub fn with_position(mut self, position: DVec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: DQuat) -> Self {
        self.rotation = rotation.normalize();
        self
    }

    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn size(&self) -> DVec3 {
        self.size
    }

    pub fn rotation(&self) -> DQuat {
        self.rotation
    }

    pub fn kind(&self) -> PartKind {
        self.kind
    }

    /// World position of a corner
    pub fn vertex_position(&self, corner: Corner) -> DVec3 {
        geometry::box_point(self.position, self.size, self.rotation, corner.unit())
    }

    pub fn vertex(&self, corner: Corner) -> PartVertex<'_> {
        PartVertex { part: self, corner }
    }

    /// All 8 corners in index order
    pub fn vertices(&self) -> impl Iterator<Item = PartVertex<'_>> {
        Corner::ALL.into_iter().map(|corner| self.vertex(corner))
    }

    /// Coincident constraints registered on a corner
    pub fn constraints_at(&self, corner: Corner) -> &[ConstraintId] {
        &self.vertex_constraints[corner.index()]
    }

    pub(crate) fn set_geometry(&mut self, position: DVec3, size: DVec3) {
        self.position = position;
        self.size = size;
    }

    pub(crate) fn set_rotation(&mut self, rotation: DQuat) {
        self.rotation = rotation.normalize();
    }

    pub(crate) fn register_constraint(&mut self, corner: Corner, id: ConstraintId) {
        let list = &mut self.vertex_constraints[corner.index()];
        if !list.contains(&id) {
            list.push(id);
        }
    }

    pub(crate) fn unregister_constraint(&mut self, corner: Corner, id: ConstraintId) {
        self.vertex_constraints[corner.index()].retain(|c| *c != id);
    }

    pub(crate) fn clear_constraints(&mut self) {
        self.vertex_constraints = Default::default();
    }
}

/// One corner of a part
#[derive(Debug, Clone, Copy)]
pub struct PartVertex<'a> {
    part: &'a Part,
    corner: Corner,
}

impl<'a> PartVertex<'a> {
    pub fn part(&self) -> &'a Part {
        self.part
    }

    pub fn corner(&self) -> Corner {
        self.corner
    }

    /// World position derived from the part's position, size and rotation
    pub fn position(&self) -> DVec3 {
        self.part.vertex_position(self.corner)
    }

    pub fn constraints(&self) -> &'a [ConstraintId] {
        self.part.constraints_at(self.corner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_corner_bits() {
        let corner = Corner::from_coords(true, false, true);
        assert_eq!(corner.index(), 5);
        assert_eq!((corner.x(), corner.y(), corner.z()), (1, 0, 1));
        assert_eq!(corner.unit(), DVec3::new(1.0, 0.0, 1.0));
        assert_eq!(corner.across(), Corner::from_coords(true, false, false));
        assert_eq!(Corner::ALL[7], Corner::FAR);
    }

    #[test]
    fn test_corner_rejects_out_of_range() {
        assert!(Corner::new(8).is_none());
        assert_eq!(Corner::try_from(9), Err(InvalidCorner(9)));
        assert_eq!(Corner::try_from(3).map(Corner::index), Ok(3));
    }

    #[test]
    fn test_panel_vertex_positions() {
        let part = Part::panel("side", DVec3::new(600.0, 400.0, 18.0))
            .with_position(DVec3::new(10.0, 0.0, 0.0))
            .with_rotation(DQuat::from_rotation_z(FRAC_PI_2));

        assert_eq!(part.vertex(Corner::ORIGIN).position(), part.position());
        // Local X maps to world Y after the rotation
        let far = part.vertex(Corner::FAR).position();
        assert!(far.abs_diff_eq(DVec3::new(-390.0, 600.0, 18.0), 1e-9));
        assert_eq!(part.vertices().count(), 8);
    }

    #[test]
    fn test_kind_fixed_dimensions() {
        let panel = Part::panel("p", DVec3::new(1.0, 2.0, -0.5));
        assert_eq!(panel.kind(), PartKind::Panel { thickness: 0.5 });
        let dims = panel.kind().fixed_dimensions();
        assert_eq!(dims.len(), 1);
        assert_eq!((dims[0].from, dims[0].to), (Corner::ORIGIN, Corner::new(4).unwrap()));

        let beam = Part::beam("b", DVec3::new(900.0, 40.0, 60.0));
        let dims = beam.kind().fixed_dimensions();
        assert_eq!(dims.len(), 2);
        assert_eq!(dims[0].length, 40.0);
        assert_eq!(dims[1].length, 60.0);
        assert_eq!(beam.kind().name(), "Beam");
    }

    #[test]
    fn test_constraint_registration_is_idempotent() {
        let mut part = Part::panel("p", DVec3::ONE);
        let id = ConstraintId::default();
        part.register_constraint(Corner::FAR, id);
        part.register_constraint(Corner::FAR, id);
        assert_eq!(part.constraints_at(Corner::FAR), &[id]);

        part.unregister_constraint(Corner::FAR, id);
        assert!(part.vertex(Corner::FAR).constraints().is_empty());
    }
}
