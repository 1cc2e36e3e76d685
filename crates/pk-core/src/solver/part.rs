//! Part parametrization
//!
//! A part becomes two workplanes (its start and end faces) sharing the
//! part's orientation. The planes are anchored at two points on a third,
//! constant "z-workplane" whose U axis runs along the part's local Z, so the
//! depth of each face is a single free coordinate. Each face carries the 4
//! corners with that z bit as free 2D points, held in a rectangle by
//! horizontal/vertical constraints and tied to the other face by coincidence
//! in the start plane's frame.

use glam::{DQuat, DVec3};
use pk_sketch::{EntityId, Group};
use tracing::debug;

use super::engine::SolverEngine;
use super::{SolverError, SolverResult};
use crate::geometry::{self, Plane};
use crate::model::{Corner, Model, Part, PartId, PartKind};

/// A face plane of a parametrized part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverWorkplane {
    pub workplane: EntityId,
    /// 2D point on the z-workplane; its U coordinate is the face depth
    pub origin: EntityId,
}

/// The solver point of one part corner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverVertex {
    corner: Corner,
    point: EntityId,
    face: SolverWorkplane,
    dragged: bool,
}

impl SolverVertex {
    pub fn corner(&self) -> Corner {
        self.corner
    }

    pub fn point(&self) -> EntityId {
        self.point
    }

    pub fn face(&self) -> SolverWorkplane {
        self.face
    }

    pub fn is_dragged(&self) -> bool {
        self.dragged
    }
}

/// Handles created by [`SolverPart::add_to_solver`]
#[derive(Debug, Clone)]
struct Parametrization {
    kind: PartKind,
    origin: EntityId,
    orientation: EntityId,
    z_normal: EntityId,
    start: SolverWorkplane,
    end: SolverWorkplane,
    vertices: [SolverVertex; 8],
}

/// Solver-side representation of one part
#[derive(Debug, Clone)]
pub struct SolverPart {
    part: PartId,
    params: Option<Parametrization>,
}

impl SolverPart {
    pub fn new(part: PartId) -> Self {
        Self { part, params: None }
    }

    pub fn part(&self) -> PartId {
        self.part
    }

    pub fn is_built(&self) -> bool {
        self.params.is_some()
    }

    pub fn kind(&self) -> Option<PartKind> {
        self.params.as_ref().map(|p| p.kind)
    }

    /// Create the part's entities and constraints in `engine`
    pub fn add_to_solver<E: SolverEngine>(&mut self, engine: &mut E, part: &Part) -> SolverResult<()> {
        let position = part.position();
        let size = part.size();
        let rotation = part.rotation();

        let origin = engine.add_point_3d(Group::CONSTANT, position);
        let orientation = engine.add_normal_3d(Group::CONSTANT, rotation);
        let z_normal =
            engine.add_normal_3d(Group::CONSTANT, geometry::z_workplane_rotation(rotation));
        let z_workplane = engine.add_workplane(Group::CONSTANT, origin, z_normal)?;
        let reference = engine.add_point_2d(Group::CONSTANT, z_workplane, 0.0, 0.0)?;

        // Face origins may only slide along U (the local Z axis)
        let start_origin = engine.add_point_2d(Group::SOLVE, z_workplane, 0.0, 0.0)?;
        engine.horizontal(Group::SOLVE, start_origin, reference, z_workplane)?;
        let end_origin = engine.add_point_2d(Group::SOLVE, z_workplane, size.z, 0.0)?;
        engine.horizontal(Group::SOLVE, end_origin, reference, z_workplane)?;

        let start = SolverWorkplane {
            workplane: engine.add_workplane(Group::SOLVE, start_origin, orientation)?,
            origin: start_origin,
        };
        let end = SolverWorkplane {
            workplane: engine.add_workplane(Group::SOLVE, end_origin, orientation)?,
            origin: end_origin,
        };

        let mut vertices = Vec::with_capacity(Corner::COUNT);
        for corner in Corner::ALL {
            let face = face_of(corner, start, end)?;
            let (u, v) = face_coords(corner, size);
            let point = engine.add_point_2d(Group::SOLVE, face.workplane, u, v)?;
            vertices.push(SolverVertex {
                corner,
                point,
                face,
                dragged: false,
            });
        }
        let vertices: [SolverVertex; 8] = vertices
            .try_into()
            .map_err(|_| SolverError::Precondition("part needs exactly 8 corners".into()))?;

        for face in [start, end] {
            let corners: Vec<EntityId> = vertices
                .iter()
                .filter(|v| v.face == face)
                .map(|v| v.point)
                .collect();
            if let [c00, c10, c01, c11] = corners[..] {
                engine.horizontal(Group::SOLVE, c00, c10, face.workplane)?;
                engine.horizontal(Group::SOLVE, c01, c11, face.workplane)?;
                engine.vertical(Group::SOLVE, c00, c01, face.workplane)?;
                engine.vertical(Group::SOLVE, c10, c11, face.workplane)?;
            }
        }

        // Extrusion: both faces share one cross-section
        for front in vertices.iter().filter(|v| v.face == start) {
            let back = &vertices[front.corner.across().index()];
            engine.coincident(Group::SOLVE, front.point, back.point, Some(start.workplane))?;
        }

        let kind = part.kind();
        for dim in kind.fixed_dimensions() {
            engine.distance(
                Group::SOLVE,
                vertices[dim.from.index()].point,
                vertices[dim.to.index()].point,
                dim.length,
                None,
            )?;
        }

        debug!(
            "Parametrized {} '{}' with {} fixed dimensions",
            kind.name(),
            part.name,
            kind.fixed_dimensions().len()
        );

        self.params = Some(Parametrization {
            kind,
            origin,
            orientation,
            z_normal,
            start,
            end,
            vertices,
        });
        Ok(())
    }

    /// Push the part's current geometry into the existing params
    pub fn update<E: SolverEngine>(&self, engine: &mut E, part: &Part) -> SolverResult<()> {
        let params = self.built("update")?;
        let size = part.size();
        let rotation = part.rotation();

        write(engine, params.origin, part.position().to_array())?;
        write(engine, params.orientation, quat_params(rotation))?;
        write(
            engine,
            params.z_normal,
            quat_params(geometry::z_workplane_rotation(rotation)),
        )?;
        write(engine, params.start.origin, [0.0, 0.0])?;
        write(engine, params.end.origin, [size.z, 0.0])?;
        for vertex in &params.vertices {
            let (u, v) = face_coords(vertex.corner, size);
            write(engine, vertex.point, [u, v])?;
        }
        Ok(())
    }

    /// Position and size implied by the solved params
    pub fn solved_geometry<E: SolverEngine>(&self, engine: &E) -> SolverResult<(DVec3, DVec3)> {
        let params = self.built("apply")?;
        let (position, rotation) = frame(engine, params)?;
        let near = local_coords(engine, &params.vertices[Corner::ORIGIN.index()])?;
        let far = local_coords(engine, &params.vertices[Corner::FAR.index()])?;
        Ok((position + rotation * near, far - near))
    }

    /// Write the solved position and size onto the part
    pub fn apply<E: SolverEngine>(&self, engine: &E, model: &mut Model) -> SolverResult<()> {
        let (position, size) = self.solved_geometry(engine)?;
        model.set_part_geometry(self.part, position, size)?;
        Ok(())
    }

    /// Pin a corner for the next solve.
    ///
    /// The face origin is pinned with the corner so the face depth is held
    /// too. Pins can only be dropped by rebuilding.
    pub fn set_dragged<E: SolverEngine>(
        &mut self,
        engine: &mut E,
        corner: Corner,
        dragged: bool,
    ) -> SolverResult<()> {
        let params = self
            .params
            .as_mut()
            .ok_or_else(|| SolverError::Precondition("set_dragged before add_to_solver".into()))?;
        let vertex = &mut params.vertices[corner.index()];
        match (vertex.dragged, dragged) {
            (false, true) => {
                engine.dragged(Group::SOLVE, vertex.point)?;
                engine.dragged(Group::SOLVE, vertex.face.origin)?;
                vertex.dragged = true;
                debug!("Pinned corner {} of part {:?}", corner, self.part);
                Ok(())
            }
            (true, false) => Err(SolverError::Precondition(format!(
                "corner {corner} stays pinned until the sketch is rebuilt"
            ))),
            _ => Ok(()),
        }
    }

    /// Set a corner's solver point (and its face depth) to a world target
    pub fn move_vertex<E: SolverEngine>(
        &self,
        engine: &mut E,
        corner: Corner,
        target: DVec3,
    ) -> SolverResult<()> {
        let params = self.built("move_vertex")?;
        let (position, rotation) = frame(engine, params)?;
        let local = geometry::to_local(position, rotation, target);
        let vertex = &params.vertices[corner.index()];
        write(engine, vertex.face.origin, [local.z, 0.0])?;
        write(engine, vertex.point, [local.x, local.y])?;
        Ok(())
    }

    /// World position of a corner as currently held by the engine
    pub fn vertex_position<E: SolverEngine>(&self, engine: &E, corner: Corner) -> SolverResult<DVec3> {
        let params = self.built("vertex_position")?;
        let (position, rotation) = frame(engine, params)?;
        let local = local_coords(engine, &params.vertices[corner.index()])?;
        Ok(position + rotation * local)
    }

    /// Plane of the face holding a corner, through the corner's solver position
    pub fn face_plane<E: SolverEngine>(&self, engine: &E, corner: Corner) -> SolverResult<Plane> {
        let params = self.built("face_plane")?;
        let (_, rotation) = frame(engine, params)?;
        let [_, _, z] = geometry::axes(rotation);
        Ok(Plane::new(self.vertex_position(engine, corner)?, z))
    }

    pub fn vertex(&self, corner: Corner) -> Option<&SolverVertex> {
        self.params.as_ref().map(|p| &p.vertices[corner.index()])
    }

    /// All 8 solver vertices, empty before [`SolverPart::add_to_solver`]
    pub fn vertices(&self) -> &[SolverVertex] {
        self.params
            .as_ref()
            .map(|p| p.vertices.as_slice())
            .unwrap_or(&[])
    }

    /// Face workplane holding a corner
    pub fn workplane_for(&self, corner: Corner) -> SolverResult<SolverWorkplane> {
        let params = self.built("workplane_for")?;
        face_of(corner, params.start, params.end)
    }

    fn built(&self, operation: &str) -> SolverResult<&Parametrization> {
        self.params.as_ref().ok_or_else(|| {
            SolverError::Precondition(format!("{operation} before add_to_solver"))
        })
    }
}

fn face_of(corner: Corner, start: SolverWorkplane, end: SolverWorkplane) -> SolverResult<SolverWorkplane> {
    match corner.z() {
        0 => Ok(start),
        1 => Ok(end),
        _ => Err(SolverError::IllegalVertex(corner)),
    }
}

/// Initial (u, v) of a corner on its face
fn face_coords(corner: Corner, size: DVec3) -> (f64, f64) {
    let unit = corner.unit();
    (unit.x * size.x, unit.y * size.y)
}

fn quat_params(q: DQuat) -> [f64; 4] {
    [q.w, q.x, q.y, q.z]
}

/// Position and rotation the part was parametrized with
fn frame<E: SolverEngine>(engine: &E, params: &Parametrization) -> SolverResult<(DVec3, DQuat)> {
    let position = DVec3::from_array(read(engine, params.origin)?);
    let [w, x, y, z] = read(engine, params.orientation)?;
    Ok((position, DQuat::from_xyzw(x, y, z, w).normalize()))
}

/// Corner position in the part's local frame: (u, v + face v, face depth)
fn local_coords<E: SolverEngine>(engine: &E, vertex: &SolverVertex) -> SolverResult<DVec3> {
    let [u, v] = read(engine, vertex.point)?;
    let [depth, offset] = read(engine, vertex.face.origin)?;
    Ok(DVec3::new(u, v + offset, depth))
}

fn read<E: SolverEngine, const N: usize>(engine: &E, entity: EntityId) -> SolverResult<[f64; N]> {
    let params = engine.params(entity)?;
    if params.len() != N {
        return Err(SolverError::ParamShape {
            entity,
            expected: N,
            found: params.len(),
        });
    }
    let mut values = [0.0; N];
    for (value, param) in values.iter_mut().zip(&params) {
        *value = engine.param_value(*param)?;
    }
    Ok(values)
}

fn write<E: SolverEngine, const N: usize>(
    engine: &mut E,
    entity: EntityId,
    values: [f64; N],
) -> SolverResult<()> {
    let params = engine.params(entity)?;
    if params.len() != N {
        return Err(SolverError::ParamShape {
            entity,
            expected: N,
            found: params.len(),
        });
    }
    for (param, value) in params.into_iter().zip(values) {
        engine.set_param_value(param, value)?;
    }
    Ok(())
}
