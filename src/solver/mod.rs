pub mod forces;
mod log;
mod pool;

pub use log::{MeshLogEvent, MeshLogEventKind, MeshLogger};
pub use pool::WorkerPool;

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use tracing::{debug, info};

use crate::actors::{ActorContext, ActorRegistry};
use crate::engine::{ParticleEngine, ParticleId, ParticleStore};
use crate::error::{OperationError, Result, TopologyError};
use crate::io::{export_mesh, export_types, import_mesh, import_types, ImportSummary, IoElement};
use crate::math::{Matrix3, Point3, Vector3};
use crate::metrics;
use crate::operations::MeshEditor;
use crate::topology::{raw_id, Mesh, VertexId, DEFAULT_POOL_INCREMENT};
use crate::types::{
    BodyType, BodyTypeId, StructureType, StructureTypeId, SurfaceType, SurfaceTypeId,
    TypeRegistry,
};

slotmap::new_key_type! {
    /// Identifier of a mesh registered with a solver.
    pub struct MeshId;
}

/// Solver parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Worker count; `None` uses the machine parallelism.
    pub num_threads: Option<usize>,
    /// Slots added to a mesh pool each time it grows.
    pub pool_increment: usize,
    /// Distance used by [`MeshSolver::find_vertex`].
    pub find_vertex_tolerance: f64,
    /// Mirror every mesh log event to `tracing`.
    pub forward_log_events: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            pool_increment: DEFAULT_POOL_INCREMENT,
            find_vertex_tolerance: 1e-4,
            forward_log_events: false,
        }
    }
}

/// Simulation context coupling meshes to a particle engine.
///
/// A step runs [`pre_step_start`](Self::pre_step_start), then
/// [`pre_step_join`](Self::pre_step_join), then the engine integrates, then
/// [`post_step_start`](Self::post_step_start). Edits go through
/// [`edit`](Self::edit) between phases.
#[derive(Debug)]
pub struct MeshSolver<E: ParticleEngine> {
    engine: E,
    meshes: SlotMap<MeshId, Arc<Mutex<Mesh>>>,
    types: TypeRegistry,
    actors: ActorRegistry,
    pool: WorkerPool,
    /// Grow-only buffer of per-vertex forces, meshes laid out back to back.
    forces: Vec<Vector3>,
    /// Particle receiving each entry of `forces`.
    targets: Vec<ParticleId>,
    surface_vertex_counts: SecondaryMap<MeshId, usize>,
    log: MeshLogger,
    config: SolverConfig,
    dirty: bool,
    engine_lock: Mutex<()>,
}

impl<E: ParticleEngine> MeshSolver<E> {
    /// Creates a solver around `engine` and starts its worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AllocationFailure`] if the worker pool
    /// cannot be started.
    pub fn new(engine: E, config: SolverConfig) -> Result<Self> {
        let pool = WorkerPool::new(config.num_threads)?;
        info!(threads = pool.size(), "mesh solver created");
        Ok(Self {
            engine,
            meshes: SlotMap::with_key(),
            types: TypeRegistry::new(),
            actors: ActorRegistry::with_builtins(),
            pool,
            forces: Vec::new(),
            targets: Vec::new(),
            surface_vertex_counts: SecondaryMap::new(),
            log: MeshLogger::new(config.forward_log_events),
            config,
            dirty: false,
            engine_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Scoped guard serializing solver state changes against an engine
    /// stepping on another thread.
    pub fn engine_lock(&self) -> MutexGuard<'_, ()> {
        self.engine_lock.lock()
    }

    #[must_use]
    pub fn log(&self) -> &MeshLogger {
        &self.log
    }

    // --- Meshes ---

    /// Registers an empty mesh.
    pub fn new_mesh(&mut self) -> MeshId {
        self.load_mesh(Mesh::new(self.config.pool_increment))
    }

    /// Registers an existing mesh. Its particles must live in this solver's engine.
    pub fn load_mesh(&mut self, mesh: Mesh) -> MeshId {
        let vertices = mesh.num_vertices();
        let id = self.meshes.insert(Arc::new(Mutex::new(mesh)));
        self.dirty = true;
        info!(mesh = raw_id(id), vertices, "mesh loaded");
        id
    }

    /// Deregisters a mesh and hands it back. Its particles stay in the engine.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::NotFound`] for an unknown id, or
    /// [`OperationError::InvalidInput`] if another handle to the mesh is
    /// still held.
    pub fn unload_mesh(&mut self, id: MeshId) -> Result<Mesh> {
        let shared = self.meshes.get(id).ok_or_else(|| not_found(id))?;
        if Arc::strong_count(shared) > 1 {
            return Err(OperationError::InvalidInput(format!(
                "mesh {} is still shared",
                raw_id(id)
            ))
            .into());
        }
        let shared = self.meshes.remove(id).ok_or_else(|| not_found(id))?;
        self.surface_vertex_counts.remove(id);
        let mesh = Arc::try_unwrap(shared)
            .map_err(|_| OperationError::InvalidInput(format!("mesh {} is still shared", raw_id(id))))?
            .into_inner();
        info!(mesh = raw_id(id), "mesh unloaded");
        Ok(mesh)
    }

    /// Shared handle to a registered mesh.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::NotFound`] for an unknown id.
    pub fn mesh(&self, id: MeshId) -> Result<Arc<Mutex<Mesh>>> {
        self.meshes
            .get(id)
            .map(Arc::clone)
            .ok_or_else(|| not_found(id))
    }

    #[must_use]
    pub fn mesh_ids(&self) -> Vec<MeshId> {
        self.meshes.keys().collect()
    }

    #[must_use]
    pub fn num_meshes(&self) -> usize {
        self.meshes.len()
    }

    /// Runs `f` with exclusive access to mesh `id`, holding its lock
    /// for the whole call.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::NotFound`] for an unknown id, or the error
    /// returned by `f`.
    pub fn edit<R, F>(&mut self, id: MeshId, f: F) -> Result<R>
    where
        F: FnOnce(&mut MeshEditor<'_>) -> Result<R>,
    {
        let shared = self.mesh(id)?;
        let mut guard = shared.lock();
        let mut editor = MeshEditor::new(id, &mut guard, &mut self.engine, &mut self.log);
        f(&mut editor)
    }

    /// First vertex of mesh `id` within the configured tolerance of `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::NotFound`] for an unknown mesh id.
    pub fn find_vertex(&self, id: MeshId, pos: &Point3) -> Result<Option<VertexId>> {
        let shared = self.mesh(id)?;
        let mesh = shared.lock();
        Ok(mesh.find_vertex(pos, self.config.find_vertex_tolerance))
    }

    // --- Types ---

    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// # Errors
    ///
    /// See [`TypeRegistry::register_surface_type`].
    pub fn register_surface_type(&mut self, ty: SurfaceType) -> Result<SurfaceTypeId> {
        self.types.register_surface_type(ty)
    }

    /// # Errors
    ///
    /// See [`TypeRegistry::register_body_type`].
    pub fn register_body_type(&mut self, ty: BodyType) -> Result<BodyTypeId> {
        self.types.register_body_type(ty)
    }

    /// # Errors
    ///
    /// See [`TypeRegistry::register_structure_type`].
    pub fn register_structure_type(&mut self, ty: StructureType) -> Result<StructureTypeId> {
        self.types.register_structure_type(ty)
    }

    /// Decoders used when importing actors.
    #[must_use]
    pub fn actor_registry(&self) -> &ActorRegistry {
        &self.actors
    }

    pub fn actor_registry_mut(&mut self) -> &mut ActorRegistry {
        &mut self.actors
    }

    // --- Step phases ---

    /// Evaluates the force on every vertex of every mesh into the force
    /// buffer. Clears the edit log.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an actor.
    pub fn pre_step_start(&mut self) -> Result<()> {
        self.log.clear();

        let shared: Vec<(MeshId, Arc<Mutex<Mesh>>)> = self
            .meshes
            .iter()
            .map(|(id, mesh)| (id, Arc::clone(mesh)))
            .collect();
        let guards: Vec<(MeshId, MutexGuard<'_, Mesh>)> =
            shared.iter().map(|(id, mesh)| (*id, mesh.lock())).collect();

        let total: usize = guards.iter().map(|(_, mesh)| mesh.num_vertices()).sum();
        if self.forces.len() < total {
            debug!(from = self.forces.len(), to = total, "growing force buffer");
            self.forces.resize(total, Vector3::zeros());
        }
        self.forces.fill(Vector3::zeros());
        self.targets.clear();

        let dt = self.engine.dt();
        let mut offset = 0;
        for (id, mesh) in &guards {
            let ctx = ActorContext {
                mesh,
                types: &self.types,
                dt,
            };
            let vertices = mesh.vertex_ids();
            let results = self
                .pool
                .parallel_map(vertices.len(), |i| forces::vertex_force(&ctx, vertices[i]));
            for (slot, force) in self.forces[offset..].iter_mut().zip(results) {
                *slot = force?;
            }
            for v in &vertices {
                self.targets.push(mesh.vertex(*v)?.particle());
            }
            offset += vertices.len();

            let pairs = mesh.surfaces().map(|(_, s)| s.vertices().len()).sum();
            self.surface_vertex_counts.insert(*id, pairs);
        }
        Ok(())
    }

    /// Adds the buffered forces to the particles' force accumulators.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects a force.
    pub fn pre_step_join(&mut self) -> Result<()> {
        for (particle, force) in self.targets.iter().zip(&self.forces) {
            if self.engine.contains(*particle) {
                self.engine.add_force(*particle, *force)?;
            }
        }
        Ok(())
    }

    /// Resyncs every mesh from the engine, then runs each mesh's quality pass.
    ///
    /// # Errors
    ///
    /// Returns an error if a resync fails. A quality pass only fails on a
    /// resync error; rejected repairs are skipped.
    pub fn post_step_start(&mut self) -> Result<()> {
        self.set_dirty(true);
        self.position_changed()?;

        for (id, shared) in &self.meshes {
            let mut guard = shared.lock();
            let Some(quality) = guard.quality().cloned() else {
                continue;
            };
            let mut editor = MeshEditor::new(id, &mut guard, &mut self.engine, &mut self.log);
            quality.run(&mut editor)?;
        }
        Ok(())
    }

    /// Resyncs every mesh from the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if a vertex's particle no longer exists.
    pub fn position_changed(&mut self) -> Result<()> {
        for shared in self.meshes.values() {
            shared.lock().position_changed(&mut self.engine)?;
        }
        self.dirty = false;
        Ok(())
    }

    /// Resyncs if anything is dirty or `force` is set.
    ///
    /// # Errors
    ///
    /// See [`MeshSolver::position_changed`].
    pub fn update(&mut self, force: bool) -> Result<()> {
        if force || self.is_dirty() {
            self.position_changed()?;
        }
        Ok(())
    }

    /// Returns `true` if the solver or any of its meshes is dirty.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.meshes.values().any(|mesh| mesh.lock().is_dirty())
    }

    /// Sets the dirty flag of the solver and of every mesh.
    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
        for mesh in self.meshes.values() {
            mesh.lock().set_dirty(dirty);
        }
    }

    /// Shrinks the force buffer to a single entry.
    pub fn compact(&mut self) {
        let before = self.forces.len();
        self.forces.clear();
        self.forces.push(Vector3::zeros());
        self.forces.shrink_to_fit();
        self.targets.clear();
        self.targets.shrink_to_fit();
        info!(before, "force buffer compacted");
    }

    /// Buffered forces from the last force pass, meshes back to back in
    /// registration order. Entries past the live vertex count are zero.
    #[must_use]
    pub fn force_buffer(&self) -> &[Vector3] {
        &self.forces
    }

    /// Surface-vertex membership pairs of mesh `id` counted by the last
    /// force pass.
    #[must_use]
    pub fn surface_vertex_count(&self, id: MeshId) -> Option<usize> {
        self.surface_vertex_counts.get(id).copied()
    }

    /// Force on vertex `v` of mesh `id`, evaluated now.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh or vertex does not exist.
    pub fn vertex_force(&self, id: MeshId, v: VertexId) -> Result<Vector3> {
        let shared = self.mesh(id)?;
        let mesh = shared.lock();
        let ctx = ActorContext {
            mesh: &mesh,
            types: &self.types,
            dt: self.engine.dt(),
        };
        forces::vertex_force(&ctx, v)
    }

    /// Energy acting on vertex `v` of mesh `id`, evaluated now.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh or vertex does not exist.
    pub fn vertex_energy(&self, id: MeshId, v: VertexId) -> Result<f64> {
        let shared = self.mesh(id)?;
        let mesh = shared.lock();
        let ctx = ActorContext {
            mesh: &mesh,
            types: &self.types,
            dt: self.engine.dt(),
        };
        forces::vertex_energy(&ctx, v)
    }

    /// Strain of the edge `v1`-`v2` of mesh `id` over one engine step.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh or a vertex does not exist, or the edge is
    /// degenerate.
    pub fn edge_strain(&self, id: MeshId, v1: VertexId, v2: VertexId) -> Result<Matrix3> {
        let shared = self.mesh(id)?;
        let mesh = shared.lock();
        metrics::edge_strain(&mesh, v1, v2, self.engine.dt())
    }

    /// Strain at vertex `v` of mesh `id` over one engine step.
    ///
    /// # Errors
    ///
    /// Returns an error if the mesh or vertex does not exist, or `v` has no
    /// neighbors.
    pub fn vertex_strain(&self, id: MeshId, v: VertexId) -> Result<Matrix3> {
        let shared = self.mesh(id)?;
        let mesh = shared.lock();
        metrics::vertex_strain(&mesh, v, self.engine.dt())
    }

    // --- Export / import ---

    /// Exports the configuration, every type and every mesh.
    ///
    /// # Errors
    ///
    /// Returns an error if an actor cannot be encoded.
    pub fn export(&self) -> Result<IoElement> {
        let mut root = IoElement::encode("Solver", &self.config)?;
        root.insert("types", export_types(&self.types)?);
        let meshes = self
            .meshes
            .values()
            .map(|mesh| export_mesh(&mesh.lock()))
            .collect::<Result<Vec<_>>>()?;
        root.insert("meshes", IoElement::list("Meshes", meshes));
        Ok(root)
    }

    /// Registers the types of an exported solver and loads each of its
    /// meshes as a new mesh. The exported configuration is not applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed. Meshes loaded before
    /// the failing one stay loaded.
    pub fn import(&mut self, element: &IoElement) -> Result<Vec<(MeshId, ImportSummary)>> {
        element.expect_kind("Solver")?;
        let type_maps = import_types(element.child("types")?, &mut self.types, &self.actors)?;
        let mut loaded = Vec::new();
        for item in &element.child("meshes")?.items {
            let mut mesh = Mesh::new(self.config.pool_increment);
            let summary = import_mesh(item, &mut mesh, &mut self.engine, &self.actors, &type_maps)?;
            loaded.push((self.load_mesh(mesh), summary));
        }
        Ok(loaded)
    }
}

impl MeshSolver<ParticleStore> {
    /// Runs one full step with the in-memory engine: force pass, join,
    /// integration over `dt`, then resync and quality.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a phase.
    pub fn step(&mut self, dt: f64) -> Result<()> {
        self.engine.clear_forces();
        self.pre_step_start()?;
        self.pre_step_join()?;
        self.engine.step(dt);
        self.post_step_start()
    }
}

fn not_found(id: MeshId) -> crate::error::MeshError {
    TopologyError::NotFound(format!("mesh {}", raw_id(id))).into()
}
