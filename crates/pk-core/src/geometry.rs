//! Geometry primitives
//!
//! Box corner math and plane/line intersection shared by the model and the
//! solver bridge.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Lines closer than this to parallel with a plane do not intersect it
const PARALLEL_EPSILON: f64 = 1e-12;

/// World position of a point given in unit box coordinates.
///
/// `unit` components are 0 or 1 for corners; `size` may be negative, which
/// flips the box along that axis.
pub fn box_point(position: DVec3, size: DVec3, rotation: DQuat, unit: DVec3) -> DVec3 {
    position + rotation * (size * unit)
}

/// Coordinates of a world point in a frame placed at `position` with `rotation`
pub fn to_local(position: DVec3, rotation: DQuat, world: DVec3) -> DVec3 {
    rotation.inverse() * (world - position)
}

/// Local X, Y and Z axes of a rotation in world space
pub fn axes(rotation: DQuat) -> [DVec3; 3] {
    [rotation * DVec3::X, rotation * DVec3::Y, rotation * DVec3::Z]
}

/// Orientation of the plane that measures depth along a part's local Z.
///
/// Its U axis is the part's local Z, V the local Y and its normal the
/// negated local X.
pub fn z_workplane_rotation(rotation: DQuat) -> DQuat {
    rotation * DQuat::from_rotation_y(-std::f64::consts::FRAC_PI_2)
}

/// An infinite plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub origin: DVec3,
    /// Unit normal
    pub normal: DVec3,
}

impl Plane {
    /// Create a plane, normalizing the normal
    pub fn new(origin: DVec3, normal: DVec3) -> Self {
        Self {
            origin,
            normal: normal.normalize_or_zero(),
        }
    }

    /// Signed distance of a point along the normal
    pub fn signed_distance(&self, point: DVec3) -> f64 {
        (point - self.origin).dot(self.normal)
    }

    /// Closest point on the plane
    pub fn project_point(&self, point: DVec3) -> DVec3 {
        point - self.normal * self.signed_distance(point)
    }

    /// Intersection with a line, `None` when the line is parallel to the plane
    pub fn intersect_line(&self, line: &Line) -> Option<DVec3> {
        let denom = line.direction.dot(self.normal);
        if denom.abs() < PARALLEL_EPSILON {
            return None;
        }
        let t = (self.origin - line.origin).dot(self.normal) / denom;
        Some(line.point_at(t))
    }
}

/// An infinite line (e.g. a pointer ray)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Line {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }

    /// Line through two points
    pub fn through(a: DVec3, b: DVec3) -> Self {
        Self::new(a, b - a)
    }

    pub fn point_at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_box_point_with_negative_size() {
        let p = box_point(
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(2.0, -3.0, 4.0),
            DQuat::IDENTITY,
            DVec3::new(1.0, 1.0, 0.0),
        );
        assert_eq!(p, DVec3::new(3.0, -2.0, 1.0));
    }

    #[test]
    fn test_to_local_inverts_box_point() {
        let rotation = DQuat::from_euler(glam::EulerRot::XYZ, 0.3, -0.7, 1.1);
        let position = DVec3::new(5.0, -2.0, 0.5);
        let size = DVec3::new(600.0, 400.0, 18.0);
        let world = box_point(position, size, rotation, DVec3::ONE);
        let local = to_local(position, rotation, world);
        assert!(local.abs_diff_eq(size, 1e-9));
    }

    #[test]
    fn test_z_workplane_axes() {
        let rotation = DQuat::from_rotation_z(FRAC_PI_2);
        let [x, y, z] = axes(rotation);
        let [u, v, n] = axes(z_workplane_rotation(rotation));
        assert!(u.abs_diff_eq(z, 1e-12));
        assert!(v.abs_diff_eq(y, 1e-12));
        assert!(n.abs_diff_eq(-x, 1e-12));
    }

    #[test]
    fn test_plane_line_intersection() {
        let plane = Plane::new(DVec3::new(0.0, 0.0, 2.0), DVec3::new(0.0, 0.0, 5.0));
        let line = Line::through(DVec3::new(1.0, 1.0, 0.0), DVec3::new(2.0, 3.0, 1.0));
        let hit = plane.intersect_line(&line).unwrap();
        assert_relative_eq!(hit.x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(hit.y, 5.0, epsilon = 1e-12);
        assert_relative_eq!(hit.z, 2.0, epsilon = 1e-12);
        assert_relative_eq!(plane.signed_distance(hit), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parallel_line_misses_plane() {
        let plane = Plane::new(DVec3::ZERO, DVec3::Z);
        let line = Line::new(DVec3::new(0.0, 0.0, 1.0), DVec3::X);
        assert!(plane.intersect_line(&line).is_none());
    }

    #[test]
    fn test_project_point() {
        let plane = Plane::new(DVec3::new(0.0, 1.0, 0.0), DVec3::Y);
        let p = plane.project_point(DVec3::new(4.0, 7.0, -2.0));
        assert_eq!(p, DVec3::new(4.0, 1.0, -2.0));
    }
}
