#![allow(clippy::unwrap_used)]

use crate::engine::{ParticleEngine, ParticleStore};
use crate::math::{Point3, Vector3};
use crate::operations::creation::{MakeBoxGrid, MakeQuadGrid, MakeTetrahedron, MeshBuild};
use crate::operations::MeshEditor;
use crate::solver::{MeshId, MeshLogger};
use crate::topology::{BodyId, Mesh, SurfaceId, VertexId};
use crate::types::{BodyTypeId, SurfaceTypeId};

pub(crate) fn p(x: f64, y: f64, z: f64) -> Point3 {
    Point3::new(x, y, z)
}

/// Unattached vertex with its own particle.
pub(crate) fn vertex(mesh: &mut Mesh, engine: &mut ParticleStore, pos: Point3) -> VertexId {
    let particle = engine.create_particle(pos).unwrap();
    mesh.create_vertex(particle, pos).unwrap()
}

/// A mesh with its engine and edit log, plus the objects it was built from.
pub(crate) struct Fixture {
    pub mesh: Mesh,
    pub engine: ParticleStore,
    pub log: MeshLogger,
    pub vertices: Vec<VertexId>,
    pub surfaces: Vec<SurfaceId>,
    pub bodies: Vec<BodyId>,
    /// First body, or a null handle for sheets.
    pub body: BodyId,
}

impl Fixture {
    fn build(make: impl FnOnce(&mut MeshEditor<'_>) -> crate::Result<MeshBuild>) -> Self {
        let mut mesh = Mesh::default();
        let mut engine = ParticleStore::default();
        let mut log = MeshLogger::default();
        let build = {
            let mut editor = MeshEditor::new(MeshId::default(), &mut mesh, &mut engine, &mut log);
            make(&mut editor).unwrap()
        };
        Self {
            mesh,
            engine,
            log,
            body: build.bodies.first().copied().unwrap_or_default(),
            vertices: build.vertices,
            surfaces: build.surfaces,
            bodies: build.bodies,
        }
    }

    pub(crate) fn editor(&mut self) -> MeshEditor<'_> {
        MeshEditor::new(MeshId::default(), &mut self.mesh, &mut self.engine, &mut self.log)
    }
}

/// Corner tetrahedron of the unit cube.
pub(crate) fn tetrahedron() -> Fixture {
    Fixture::build(|ed| MakeTetrahedron::new(SurfaceTypeId(0), BodyTypeId(0)).execute(ed))
}

/// Unit-spaced sheet of `nx` by `ny` quads.
pub(crate) fn quad_grid(nx: usize, ny: usize) -> Fixture {
    Fixture::build(|ed| MakeQuadGrid::new(SurfaceTypeId(0), nx, ny).execute(ed))
}

/// Block of unit cubes.
pub(crate) fn box_grid(nx: usize, ny: usize, nz: usize) -> Fixture {
    Fixture::build(|ed| {
        MakeBoxGrid::new(SurfaceTypeId(0), BodyTypeId(0), nx, ny, nz).execute(ed)
    })
}

/// Moves every vertex by a deterministic offset of at most `amplitude` per
/// axis, then resyncs.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn jitter(fx: &mut Fixture, amplitude: f64) {
    for (n, v) in fx.mesh.vertex_ids().into_iter().enumerate() {
        let t = n as f64;
        let offset = Vector3::new(
            (1.3 * t + 0.7).sin(),
            (2.1 * t + 1.1).sin(),
            (0.9 * t + 2.3).sin(),
        ) * amplitude;
        let particle = fx.mesh.vertex(v).unwrap().particle();
        let pos = fx.engine.position(particle).unwrap();
        fx.engine.set_position(particle, pos + offset).unwrap();
    }
    fx.mesh.position_changed(&mut fx.engine).unwrap();
}

/// Every cached position and derived geometry value, in slot order.
pub(crate) fn geometry_fingerprint(mesh: &Mesh) -> Vec<f64> {
    let mut values = Vec::new();
    for (_, v) in mesh.vertices() {
        values.extend(v.position().iter());
    }
    for (_, s) in mesh.surfaces() {
        values.push(s.area());
        values.extend(s.centroid().iter());
        values.extend(s.normal().iter());
    }
    for (_, b) in mesh.bodies() {
        values.push(b.volume());
        values.push(b.area());
        values.extend(b.centroid().iter());
    }
    values
}

/// Central-difference gradient of `f` with respect to the position of `v`.
///
/// The vertex is restored afterwards.
pub(crate) fn numeric_gradient(
    fx: &mut Fixture,
    v: VertexId,
    f: impl Fn(&Mesh) -> f64,
) -> Vector3 {
    const H: f64 = 1e-6;
    let particle = fx.mesh.vertex(v).unwrap().particle();
    let origin = fx.engine.position(particle).unwrap();
    let mut grad = Vector3::zeros();
    for axis in 0..3 {
        let mut sample = |delta: f64| {
            let mut pos = origin;
            pos[axis] += delta;
            fx.engine.set_position(particle, pos).unwrap();
            fx.mesh.position_changed(&mut fx.engine).unwrap();
            f(&fx.mesh)
        };
        let plus = sample(H);
        let minus = sample(-H);
        grad[axis] = (plus - minus) / (2.0 * H);
    }
    fx.engine.set_position(particle, origin).unwrap();
    fx.mesh.position_changed(&mut fx.engine).unwrap();
    grad
}
