pub mod creation;
mod insert;
mod merge;
mod remove;
mod replace;
mod split;

pub use insert::{InsertTarget, InsertVertex};
pub use merge::MergeVertices;
pub use remove::RemoveObject;
pub use replace::{ReplaceBody, ReplaceSurface};
pub use split::{SplitPlan, SplitVertex};

use tracing::debug;

use crate::engine::ParticleEngine;
use crate::error::Result;
use crate::math::Point3;
use crate::solver::{MeshId, MeshLogger};
use crate::topology::{
    BodyId, Mesh, MeshObj, Removal, StructureId, SurfaceId, VertexId,
};
use crate::types::{BodyTypeId, StructureTypeId, SurfaceTypeId};

/// Exclusive access to one mesh, its particle engine and the edit log.
///
/// Obtained from [`crate::solver::MeshSolver::edit`], which holds the mesh
/// lock for the editor's lifetime.
pub struct MeshEditor<'a> {
    mesh_id: MeshId,
    mesh: &'a mut Mesh,
    engine: &'a mut dyn ParticleEngine,
    log: &'a mut MeshLogger,
}

impl<'a> MeshEditor<'a> {
    #[must_use]
    pub fn new(
        mesh_id: MeshId,
        mesh: &'a mut Mesh,
        engine: &'a mut dyn ParticleEngine,
        log: &'a mut MeshLogger,
    ) -> Self {
        Self {
            mesh_id,
            mesh,
            engine,
            log,
        }
    }

    #[must_use]
    pub fn mesh_id(&self) -> MeshId {
        self.mesh_id
    }

    #[must_use]
    pub fn mesh(&self) -> &Mesh {
        &*self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut *self.mesh
    }

    #[must_use]
    pub fn engine(&self) -> &dyn ParticleEngine {
        &*self.engine
    }

    pub fn engine_mut(&mut self) -> &mut (dyn ParticleEngine + 'a) {
        &mut *self.engine
    }

    /// Creates a particle at `position` and an unattached vertex bound to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the vertex pool cannot grow or the engine cannot
    /// create a particle.
    pub fn create_vertex(&mut self, position: Point3) -> Result<VertexId> {
        self.mesh.ensure_available_vertices(1)?;
        let particle = self.engine.create_particle(position)?;
        let v = self.mesh.create_vertex(particle, position)?;
        self.log.create(self.mesh_id, v.into());
        Ok(v)
    }

    /// # Errors
    ///
    /// See [`Mesh::create_surface`].
    pub fn create_surface(
        &mut self,
        type_id: SurfaceTypeId,
        vertices: &[VertexId],
    ) -> Result<SurfaceId> {
        let s = self.mesh.create_surface(type_id, vertices)?;
        self.log.create(self.mesh_id, s.into());
        Ok(s)
    }

    /// # Errors
    ///
    /// See [`Mesh::create_body`].
    pub fn create_body(
        &mut self,
        type_id: BodyTypeId,
        density: f64,
        surfaces: &[SurfaceId],
    ) -> Result<BodyId> {
        let b = self.mesh.create_body(type_id, density, surfaces)?;
        self.log.create(self.mesh_id, b.into());
        Ok(b)
    }

    /// # Errors
    ///
    /// See [`Mesh::create_structure`].
    pub fn create_structure(
        &mut self,
        type_id: StructureTypeId,
        bodies: &[BodyId],
        parents: &[StructureId],
    ) -> Result<StructureId> {
        let st = self.mesh.create_structure(type_id, bodies, parents)?;
        self.log.create(self.mesh_id, st.into());
        Ok(st)
    }

    /// Moves the particle of `v` and the vertex's cached position.
    ///
    /// # Errors
    ///
    /// Returns an error if `v` or its particle is not live.
    pub fn set_position(&mut self, v: VertexId, position: Point3) -> Result<()> {
        let vertex = self.mesh.vertex_mut(v)?;
        self.engine.set_position(vertex.particle, position)?;
        vertex.position = position;
        Ok(())
    }

    /// Removes an object with its dependents and destroys the particles of
    /// removed vertices.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is not live.
    pub fn remove(&mut self, obj: MeshObj) -> Result<Removal> {
        let removal = self.mesh.remove(obj)?;
        for particle in &removal.particles {
            if self.engine.contains(*particle) {
                self.engine.destroy_particle(*particle)?;
            }
        }
        for removed in &removal.objects {
            self.log.destroy(self.mesh_id, *removed);
        }
        Ok(removal)
    }

    /// Recomputes the neighbor caches of every live vertex in `vertices`.
    pub(crate) fn update_neighbors(&mut self, vertices: &[VertexId]) -> Result<()> {
        for v in vertices {
            if self.mesh.contains_vertex(*v) {
                self.mesh.update_neighbor_vertices(*v)?;
            }
        }
        Ok(())
    }

    pub fn log_operation(&mut self, name: &str, objs: &[MeshObj]) {
        self.log.operation(self.mesh_id, name, objs);
    }

    /// Resyncs geometry, or only marks the mesh dirty while a quality pass runs.
    ///
    /// # Errors
    ///
    /// Returns an error if a vertex's particle no longer exists.
    pub fn commit(&mut self) -> Result<()> {
        if self.mesh.quality_working() {
            self.mesh.set_dirty(true);
            return Ok(());
        }
        debug!("resyncing mesh geometry after edit");
        self.resync()
    }

    /// Refreshes every vertex snapshot and all derived geometry.
    ///
    /// # Errors
    ///
    /// Returns an error if a vertex's particle no longer exists.
    pub fn resync(&mut self) -> Result<()> {
        self.mesh.position_changed(&mut *self.engine)
    }
}
