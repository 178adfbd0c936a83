pub mod body;
pub mod object;
pub mod structure;
pub mod surface;
pub mod vertex;

pub use body::{BodyData, BodyGeometry, BodyId};
pub use object::{MeshObj, MeshObjKind};
pub use structure::{StructureData, StructureId};
pub use surface::{SurfaceData, SurfaceGeometry, SurfaceId};
pub use vertex::{VertexData, VertexId};

use slotmap::{Key, SlotMap};

use crate::engine::{ParticleEngine, ParticleId};
use crate::error::{OperationError, Result, TopologyError};
use crate::math::Point3;
use crate::quality::MeshQuality;
use crate::types::{BodyTypeId, StructureTypeId, SurfaceTypeId};

/// Number of slots a pool grows by when it runs out of free slots.
pub const DEFAULT_POOL_INCREMENT: usize = 100;

/// Minimum number of vertices a surface must keep.
pub const MIN_SURFACE_VERTICES: usize = 3;

/// Minimum number of surfaces a body must keep.
pub const MIN_BODY_SURFACES: usize = 4;

// slotmap reserves one slot and stores indices as u32.
const MAX_SLOTS: usize = u32::MAX as usize - 1;

/// Raw integer id of a handle, as written to exported documents.
#[must_use]
pub fn raw_id<K: Key>(key: K) -> u64 {
    key.data().as_ffi()
}

/// Objects and particles released by [`Mesh::remove`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Removal {
    /// Every removed object, in removal order.
    pub objects: Vec<MeshObj>,
    /// Particles bound to removed vertices. The caller destroys them.
    pub particles: Vec<ParticleId>,
}

/// Pooled arena that owns all vertices, surfaces, bodies and structures.
///
/// Objects reference each other via typed handles (generational indices).
/// A surface's ordered vertex list, a body's surface list and a structure's
/// body and parent lists are authoritative. The reverse relations (vertex
/// surfaces, surface bodies, body structures, structure children) are
/// secondary indices kept in sync by the mutation primitives here and
/// checked by [`Mesh::validate`].
#[derive(Debug)]
pub struct Mesh {
    vertices: SlotMap<VertexId, VertexData>,
    surfaces: SlotMap<SurfaceId, SurfaceData>,
    bodies: SlotMap<BodyId, BodyData>,
    structures: SlotMap<StructureId, StructureData>,
    pool_increment: usize,
    dirty: bool,
    quality: Option<MeshQuality>,
    quality_working: bool,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_INCREMENT)
    }
}

impl Mesh {
    /// Creates an empty mesh whose pools grow by `pool_increment` slots.
    #[must_use]
    pub fn new(pool_increment: usize) -> Self {
        Self {
            vertices: SlotMap::with_key(),
            surfaces: SlotMap::with_key(),
            bodies: SlotMap::with_key(),
            structures: SlotMap::with_key(),
            pool_increment: pool_increment.max(1),
            dirty: false,
            quality: None,
            quality_working: false,
        }
    }

    // --- Counts and iteration ---

    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    #[must_use]
    pub fn num_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    #[must_use]
    pub fn num_structures(&self) -> usize {
        self.structures.len()
    }

    /// Number of slots a pool grows by.
    #[must_use]
    pub fn pool_increment(&self) -> usize {
        self.pool_increment
    }

    /// Total number of allocated slots over all pools.
    #[must_use]
    pub fn pool_capacity(&self) -> usize {
        self.vertices.capacity()
            + self.surfaces.capacity()
            + self.bodies.capacity()
            + self.structures.capacity()
    }

    /// Live vertices in slot order.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &VertexData)> {
        self.vertices.iter()
    }

    /// Live surfaces in slot order.
    pub fn surfaces(&self) -> impl Iterator<Item = (SurfaceId, &SurfaceData)> {
        self.surfaces.iter()
    }

    /// Live bodies in slot order.
    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &BodyData)> {
        self.bodies.iter()
    }

    /// Live structures in slot order.
    pub fn structures(&self) -> impl Iterator<Item = (StructureId, &StructureData)> {
        self.structures.iter()
    }

    /// Snapshot of live vertex handles in slot order.
    #[must_use]
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        self.vertices.keys().collect()
    }

    /// Snapshot of live surface handles in slot order.
    #[must_use]
    pub fn surface_ids(&self) -> Vec<SurfaceId> {
        self.surfaces.keys().collect()
    }

    /// Snapshot of live body handles in slot order.
    #[must_use]
    pub fn body_ids(&self) -> Vec<BodyId> {
        self.bodies.keys().collect()
    }

    /// Snapshot of live structure handles in slot order.
    #[must_use]
    pub fn structure_ids(&self) -> Vec<StructureId> {
        self.structures.keys().collect()
    }

    // --- Accessors ---

    /// Returns a reference to the vertex data.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if the vertex is not live.
    pub fn vertex(&self, id: VertexId) -> std::result::Result<&VertexData, TopologyError> {
        self.vertices
            .get(id)
            .ok_or(TopologyError::InvalidHandle("vertex"))
    }

    pub(crate) fn vertex_mut(
        &mut self,
        id: VertexId,
    ) -> std::result::Result<&mut VertexData, TopologyError> {
        self.vertices
            .get_mut(id)
            .ok_or(TopologyError::InvalidHandle("vertex"))
    }

    /// Returns a reference to the surface data.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if the surface is not live.
    pub fn surface(&self, id: SurfaceId) -> std::result::Result<&SurfaceData, TopologyError> {
        self.surfaces
            .get(id)
            .ok_or(TopologyError::InvalidHandle("surface"))
    }

    /// Returns a mutable reference to the surface data.
    ///
    /// Relations are not reachable through this reference; use it to manage
    /// instance actors.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if the surface is not live.
    pub fn surface_mut(
        &mut self,
        id: SurfaceId,
    ) -> std::result::Result<&mut SurfaceData, TopologyError> {
        self.surfaces
            .get_mut(id)
            .ok_or(TopologyError::InvalidHandle("surface"))
    }

    /// Returns a reference to the body data.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if the body is not live.
    pub fn body(&self, id: BodyId) -> std::result::Result<&BodyData, TopologyError> {
        self.bodies
            .get(id)
            .ok_or(TopologyError::InvalidHandle("body"))
    }

    /// Returns a mutable reference to the body data.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if the body is not live.
    pub fn body_mut(&mut self, id: BodyId) -> std::result::Result<&mut BodyData, TopologyError> {
        self.bodies
            .get_mut(id)
            .ok_or(TopologyError::InvalidHandle("body"))
    }

    /// Returns a reference to the structure data.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if the structure is not live.
    pub fn structure(
        &self,
        id: StructureId,
    ) -> std::result::Result<&StructureData, TopologyError> {
        self.structures
            .get(id)
            .ok_or(TopologyError::InvalidHandle("structure"))
    }

    /// Returns a mutable reference to the structure data.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if the structure is not live.
    pub fn structure_mut(
        &mut self,
        id: StructureId,
    ) -> std::result::Result<&mut StructureData, TopologyError> {
        self.structures
            .get_mut(id)
            .ok_or(TopologyError::InvalidHandle("structure"))
    }

    #[must_use]
    pub fn contains_vertex(&self, id: VertexId) -> bool {
        self.vertices.contains_key(id)
    }

    #[must_use]
    pub fn contains_surface(&self, id: SurfaceId) -> bool {
        self.surfaces.contains_key(id)
    }

    #[must_use]
    pub fn contains_body(&self, id: BodyId) -> bool {
        self.bodies.contains_key(id)
    }

    #[must_use]
    pub fn contains_structure(&self, id: StructureId) -> bool {
        self.structures.contains_key(id)
    }

    // --- Dirty state and quality ---

    /// Returns `true` if topology or positions changed since the last resync.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Quality maintenance attached to this mesh, if any.
    #[must_use]
    pub fn quality(&self) -> Option<&MeshQuality> {
        self.quality.as_ref()
    }

    /// Attaches or detaches quality maintenance.
    pub fn set_quality(&mut self, quality: Option<MeshQuality>) {
        self.quality = quality;
    }

    /// Returns `true` while a quality pass is editing this mesh.
    #[must_use]
    pub fn quality_working(&self) -> bool {
        self.quality_working
    }

    pub(crate) fn set_quality_working(&mut self, working: bool) {
        self.quality_working = working;
    }

    // --- Pool management ---

    /// Grows the vertex pool so the next `n` vertex creations need no allocation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AllocationFailure`] if the pool cannot grow.
    pub fn ensure_available_vertices(&mut self, n: usize) -> Result<()> {
        ensure_free(&mut self.vertices, n, self.pool_increment, "vertex")
    }

    /// Grows the surface pool so the next `n` surface creations need no allocation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AllocationFailure`] if the pool cannot grow.
    pub fn ensure_available_surfaces(&mut self, n: usize) -> Result<()> {
        ensure_free(&mut self.surfaces, n, self.pool_increment, "surface")
    }

    /// Grows the body pool so the next `n` body creations need no allocation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AllocationFailure`] if the pool cannot grow.
    pub fn ensure_available_bodies(&mut self, n: usize) -> Result<()> {
        ensure_free(&mut self.bodies, n, self.pool_increment, "body")
    }

    /// Grows the structure pool so the next `n` structure creations need no allocation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AllocationFailure`] if the pool cannot grow.
    pub fn ensure_available_structures(&mut self, n: usize) -> Result<()> {
        ensure_free(&mut self.structures, n, self.pool_increment, "structure")
    }

    // --- Creation ---

    /// Creates a vertex bound to `particle`, caching `position` until the next resync.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AllocationFailure`] if the pool cannot grow.
    pub fn create_vertex(&mut self, particle: ParticleId, position: Point3) -> Result<VertexId> {
        self.ensure_available_vertices(1)?;
        let id = self.vertices.insert(VertexData::new(particle, position));
        self.dirty = true;
        Ok(id)
    }

    /// Creates a surface from an ordered, closed loop of vertices.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than three vertices are given, a vertex is
    /// repeated or not live, or the pool cannot grow.
    pub fn create_surface(
        &mut self,
        type_id: SurfaceTypeId,
        vertices: &[VertexId],
    ) -> Result<SurfaceId> {
        if vertices.len() < MIN_SURFACE_VERTICES {
            return Err(TopologyError::invalid(format!(
                "surface requires at least {MIN_SURFACE_VERTICES} vertices, got {}",
                vertices.len()
            ))
            .into());
        }
        for (i, v) in vertices.iter().enumerate() {
            self.vertex(*v)?;
            if vertices[..i].contains(v) {
                return Err(TopologyError::invalid("surface lists a vertex twice").into());
            }
        }
        self.ensure_available_surfaces(1)?;

        let id = self
            .surfaces
            .insert(SurfaceData::new(type_id, vertices.to_vec()));
        for v in vertices {
            self.vertex_mut(*v)?.surfaces.push(id);
        }
        for v in vertices {
            self.update_neighbor_vertices(*v)?;
        }
        self.surface_position_changed(id)?;
        self.dirty = true;
        Ok(id)
    }

    /// Creates a body enclosed by `surfaces`.
    ///
    /// Each surface's outward (`b1`) and inward (`b2`) slots are assigned
    /// from the body centroid once the body is created.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than four surfaces are given, a surface is
    /// repeated, not live or already adjoins two bodies, or the pool cannot grow.
    pub fn create_body(
        &mut self,
        type_id: BodyTypeId,
        density: f64,
        surfaces: &[SurfaceId],
    ) -> Result<BodyId> {
        if surfaces.len() < MIN_BODY_SURFACES {
            return Err(TopologyError::invalid(format!(
                "body requires at least {MIN_BODY_SURFACES} surfaces, got {}",
                surfaces.len()
            ))
            .into());
        }
        for (i, s) in surfaces.iter().enumerate() {
            let data = self.surface(*s)?;
            if surfaces[..i].contains(s) {
                return Err(TopologyError::invalid("body lists a surface twice").into());
            }
            if data.b1.is_some() && data.b2.is_some() {
                return Err(
                    TopologyError::invalid("surface already adjoins two bodies").into(),
                );
            }
        }
        self.ensure_available_bodies(1)?;

        let id = self
            .bodies
            .insert(BodyData::new(type_id, density, surfaces.to_vec()));
        for s in surfaces {
            let data = self.surface_mut(*s)?;
            if data.b1.is_none() {
                data.b1 = Some(id);
            } else {
                data.b2 = Some(id);
            }
        }
        self.body_update_internals(id)?;
        self.dirty = true;
        Ok(id)
    }

    /// Creates a structure grouping `bodies`, nested inside `parents`.
    ///
    /// # Errors
    ///
    /// Returns an error if a body or parent structure is not live, or the
    /// pool cannot grow.
    pub fn create_structure(
        &mut self,
        type_id: StructureTypeId,
        bodies: &[BodyId],
        parents: &[StructureId],
    ) -> Result<StructureId> {
        for b in bodies {
            self.body(*b)?;
        }
        for p in parents {
            self.structure(*p)?;
        }
        self.ensure_available_structures(1)?;

        let mut unique_bodies = bodies.to_vec();
        dedup_in_order(&mut unique_bodies);
        let mut unique_parents = parents.to_vec();
        dedup_in_order(&mut unique_parents);

        let id = self.structures.insert(StructureData::new(
            type_id,
            unique_bodies.clone(),
            unique_parents.clone(),
        ));
        for b in unique_bodies {
            self.body_mut(b)?.structures.push(id);
        }
        for p in unique_parents {
            self.structure_mut(p)?.children.push(id);
        }
        Ok(id)
    }

    // --- Relation primitives ---

    /// Splices `v` into surface `s` at `index`.
    pub(crate) fn insert_surface_vertex(
        &mut self,
        s: SurfaceId,
        index: usize,
        v: VertexId,
    ) -> Result<()> {
        self.vertex(v)?;
        let data = self.surface_mut(s)?;
        if data.vertices.contains(&v) {
            return Err(TopologyError::invalid("vertex already defines surface").into());
        }
        let index = index.min(data.vertices.len());
        data.vertices.insert(index, v);
        let vertex = self.vertex_mut(v)?;
        if !vertex.surfaces.contains(&s) {
            vertex.surfaces.push(s);
        }
        self.dirty = true;
        Ok(())
    }

    /// Removes `v` from surface `s`.
    pub(crate) fn remove_surface_vertex(&mut self, s: SurfaceId, v: VertexId) -> Result<()> {
        self.surface_mut(s)?.vertices.retain(|x| *x != v);
        if let Some(vertex) = self.vertices.get_mut(v) {
            vertex.surfaces.retain(|x| *x != s);
        }
        self.dirty = true;
        Ok(())
    }

    /// Replaces `old` by `new` in surface `s`, keeping its position in the loop.
    pub(crate) fn replace_surface_vertex(
        &mut self,
        s: SurfaceId,
        old: VertexId,
        new: VertexId,
    ) -> Result<()> {
        self.vertex(new)?;
        let data = self.surface_mut(s)?;
        if data.vertices.contains(&new) {
            return Err(TopologyError::invalid("replacement vertex already defines surface").into());
        }
        let slot = data
            .vertices
            .iter_mut()
            .find(|x| **x == old)
            .ok_or_else(|| TopologyError::invalid("vertex does not define surface"))?;
        *slot = new;
        if let Some(vertex) = self.vertices.get_mut(old) {
            vertex.surfaces.retain(|x| *x != s);
        }
        let vertex = self.vertex_mut(new)?;
        if !vertex.surfaces.contains(&s) {
            vertex.surfaces.push(s);
        }
        self.dirty = true;
        Ok(())
    }

    /// Removes surface `s` from body `b` and clears the matching body slot.
    pub(crate) fn detach_body_surface(&mut self, b: BodyId, s: SurfaceId) -> Result<()> {
        self.body_mut(b)?.surfaces.retain(|x| *x != s);
        if let Some(surface) = self.surfaces.get_mut(s) {
            surface.clear_body(b);
        }
        self.dirty = true;
        Ok(())
    }

    // --- Removal ---

    /// Removes an object and every object that depends on it.
    ///
    /// Surfaces left with fewer than three vertices and bodies left with
    /// fewer than four surfaces are removed as well. The returned
    /// [`Removal`] lists the particles of removed vertices, which the caller
    /// must destroy.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if the object is not live.
    pub fn remove(&mut self, obj: MeshObj) -> Result<Removal> {
        if !obj.is_live(self) {
            return Err(TopologyError::InvalidHandle(obj.kind().name()).into());
        }
        let mut removal = Removal::default();
        match obj {
            MeshObj::Vertex(v) => self.remove_vertex_into(v, &mut removal)?,
            MeshObj::Surface(s) => self.remove_surface_into(s, &mut removal)?,
            MeshObj::Body(b) => self.remove_body_into(b, &mut removal)?,
            MeshObj::Structure(st) => self.remove_structure_into(st, &mut removal)?,
        }
        self.dirty = true;
        Ok(removal)
    }

    fn remove_vertex_into(&mut self, v: VertexId, out: &mut Removal) -> Result<()> {
        let surfaces = self.vertex(v)?.surfaces.clone();
        for s in surfaces {
            let Some(data) = self.surfaces.get(s) else {
                continue;
            };
            if data.vertices.len() <= MIN_SURFACE_VERTICES {
                self.remove_surface_into(s, out)?;
            } else {
                self.remove_surface_vertex(s, v)?;
            }
        }
        let data = self
            .vertices
            .remove(v)
            .ok_or(TopologyError::InvalidHandle("vertex"))?;
        out.objects.push(MeshObj::Vertex(v));
        out.particles.push(data.particle);
        for n in data.neighbors {
            if self.contains_vertex(n) {
                self.update_neighbor_vertices(n)?;
            }
        }
        Ok(())
    }

    fn remove_surface_into(&mut self, s: SurfaceId, out: &mut Removal) -> Result<()> {
        let data = self
            .surfaces
            .remove(s)
            .ok_or(TopologyError::InvalidHandle("surface"))?;
        out.objects.push(MeshObj::Surface(s));
        for v in &data.vertices {
            if let Some(vertex) = self.vertices.get_mut(*v) {
                vertex.surfaces.retain(|x| *x != s);
            }
        }
        for b in [data.b1, data.b2].into_iter().flatten() {
            let Some(body) = self.bodies.get_mut(b) else {
                continue;
            };
            body.surfaces.retain(|x| *x != s);
            if body.surfaces.len() < MIN_BODY_SURFACES {
                self.remove_body_into(b, out)?;
            }
        }
        for v in &data.vertices {
            if self.contains_vertex(*v) {
                self.update_neighbor_vertices(*v)?;
            }
        }
        Ok(())
    }

    fn remove_body_into(&mut self, b: BodyId, out: &mut Removal) -> Result<()> {
        let data = self
            .bodies
            .remove(b)
            .ok_or(TopologyError::InvalidHandle("body"))?;
        out.objects.push(MeshObj::Body(b));
        for s in &data.surfaces {
            if let Some(surface) = self.surfaces.get_mut(*s) {
                surface.clear_body(b);
            }
        }
        for st in &data.structures {
            if let Some(structure) = self.structures.get_mut(*st) {
                structure.bodies.retain(|x| *x != b);
            }
        }
        Ok(())
    }

    fn remove_structure_into(&mut self, st: StructureId, out: &mut Removal) -> Result<()> {
        let data = self
            .structures
            .remove(st)
            .ok_or(TopologyError::InvalidHandle("structure"))?;
        out.objects.push(MeshObj::Structure(st));
        for b in &data.bodies {
            if let Some(body) = self.bodies.get_mut(*b) {
                body.structures.retain(|x| *x != st);
            }
        }
        for p in &data.parents {
            if let Some(parent) = self.structures.get_mut(*p) {
                parent.children.retain(|x| *x != st);
            }
        }
        for c in &data.children {
            if let Some(child) = self.structures.get_mut(*c) {
                child.parents.retain(|x| *x != st);
            }
        }
        Ok(())
    }

    // --- Queries ---

    /// First vertex (in slot order) within distance `tol` of `pos`.
    ///
    /// Linear scan over cached vertex positions.
    #[must_use]
    pub fn find_vertex(&self, pos: &Point3, tol: f64) -> Option<VertexId> {
        self.vertices
            .iter()
            .find(|(_, v)| (v.position - pos).norm() <= tol)
            .map(|(id, _)| id)
    }

    /// Connectivity between two objects of the same kind.
    ///
    /// Vertices are connected when each lists the other as a neighbor,
    /// surfaces when they share a vertex, bodies when they share a surface
    /// and structures when they share a body. Objects of different kinds are
    /// never connected.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if either object is not live.
    pub fn connected(&self, a: MeshObj, b: MeshObj) -> Result<bool> {
        Ok(match (a, b) {
            (MeshObj::Vertex(a), MeshObj::Vertex(b)) => {
                let va = self.vertex(a)?;
                let vb = self.vertex(b)?;
                va.neighbors.contains(&b) && vb.neighbors.contains(&a)
            }
            (MeshObj::Surface(a), MeshObj::Surface(b)) => {
                let sb = self.surface(b)?;
                self.surface(a)?
                    .vertices
                    .iter()
                    .any(|v| sb.vertices.contains(v))
            }
            (MeshObj::Body(a), MeshObj::Body(b)) => {
                let bb = self.body(b)?;
                self.body(a)?.surfaces.iter().any(|s| bb.surfaces.contains(s))
            }
            (MeshObj::Structure(a), MeshObj::Structure(b)) => {
                let sb = self.structure(b)?;
                self.structure(a)?
                    .bodies
                    .iter()
                    .any(|x| sb.bodies.contains(x))
            }
            _ => {
                a.ensure_live(self)?;
                b.ensure_live(self)?;
                false
            }
        })
    }

    /// Checks every structural invariant and relation symmetry.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidTopology`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        for (id, v) in &self.vertices {
            for s in &v.surfaces {
                let surface = self
                    .surfaces
                    .get(*s)
                    .ok_or_else(|| TopologyError::invalid("vertex lists a dead surface"))?;
                if !surface.vertices.contains(&id) {
                    return Err(TopologyError::invalid(
                        "vertex lists a surface it does not define",
                    )
                    .into());
                }
            }
        }
        for (id, s) in &self.surfaces {
            if s.vertices.len() < MIN_SURFACE_VERTICES {
                return Err(TopologyError::invalid(format!(
                    "surface has {} vertices",
                    s.vertices.len()
                ))
                .into());
            }
            for (i, v) in s.vertices.iter().enumerate() {
                if s.vertices[..i].contains(v) {
                    return Err(TopologyError::invalid("surface lists a vertex twice").into());
                }
                let vertex = self
                    .vertices
                    .get(*v)
                    .ok_or_else(|| TopologyError::invalid("surface lists a dead vertex"))?;
                if !vertex.surfaces.contains(&id) {
                    return Err(TopologyError::invalid(
                        "vertex does not list a surface it defines",
                    )
                    .into());
                }
            }
            for b in s.bodies() {
                let body = self
                    .bodies
                    .get(b)
                    .ok_or_else(|| TopologyError::invalid("surface lists a dead body"))?;
                if !body.surfaces.contains(&id) {
                    return Err(TopologyError::invalid(
                        "surface lists a body it does not define",
                    )
                    .into());
                }
            }
        }
        for (id, b) in &self.bodies {
            if b.surfaces.len() < MIN_BODY_SURFACES {
                return Err(TopologyError::invalid(format!(
                    "body has {} surfaces",
                    b.surfaces.len()
                ))
                .into());
            }
            for s in &b.surfaces {
                let surface = self
                    .surfaces
                    .get(*s)
                    .ok_or_else(|| TopologyError::invalid("body lists a dead surface"))?;
                if surface.b1 != Some(id) && surface.b2 != Some(id) {
                    return Err(TopologyError::invalid(
                        "surface does not list a body it defines",
                    )
                    .into());
                }
            }
            for st in &b.structures {
                let structure = self
                    .structures
                    .get(*st)
                    .ok_or_else(|| TopologyError::invalid("body lists a dead structure"))?;
                if !structure.bodies.contains(&id) {
                    return Err(TopologyError::invalid(
                        "body lists a structure that does not contain it",
                    )
                    .into());
                }
            }
        }
        for (id, st) in &self.structures {
            for b in &st.bodies {
                let body = self
                    .bodies
                    .get(*b)
                    .ok_or_else(|| TopologyError::invalid("structure lists a dead body"))?;
                if !body.structures.contains(&id) {
                    return Err(TopologyError::invalid(
                        "body does not list a structure containing it",
                    )
                    .into());
                }
            }
            for p in &st.parents {
                let parent = self.structures.get(*p).ok_or_else(|| {
                    TopologyError::invalid("structure lists a dead parent structure")
                })?;
                if !parent.children.contains(&id) {
                    return Err(TopologyError::invalid(
                        "parent structure does not list its child",
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    // --- Geometry synchronization ---

    /// Full geometry resync against the particle engine.
    ///
    /// Refreshes every vertex snapshot, then surface geometry, then body
    /// geometry, then vertex masses (written back to the engine when
    /// positive). Clears the dirty flag.
    ///
    /// # Errors
    ///
    /// Returns an error if a vertex's particle no longer exists.
    pub fn position_changed<E: ParticleEngine + ?Sized>(&mut self, engine: &mut E) -> Result<()> {
        for vertex in self.vertices.values_mut() {
            vertex.refresh(engine)?;
        }
        for s in self.surface_ids() {
            self.surface_position_changed(s)?;
        }
        for b in self.body_ids() {
            self.body_position_changed(b)?;
        }
        for v in self.vertex_ids() {
            let mass = self.vertex_mass(v)?;
            if mass > 0.0 {
                let vertex = self.vertex_mut(v)?;
                vertex.mass = mass;
                engine.set_mass(vertex.particle, mass)?;
            }
        }
        self.dirty = false;
        Ok(())
    }
}

/// Makes room for `n` more entries, growing by whole multiples of `increment`.
fn ensure_free<K: Key, V>(
    pool: &mut SlotMap<K, V>,
    n: usize,
    increment: usize,
    kind: &str,
) -> Result<()> {
    let free = pool.capacity().saturating_sub(pool.len());
    if free >= n {
        return Ok(());
    }
    let grow = (n - free).div_ceil(increment) * increment;
    let fits = pool
        .capacity()
        .checked_add(grow)
        .is_some_and(|total| total <= MAX_SLOTS);
    if !fits {
        return Err(OperationError::AllocationFailure(format!(
            "{kind} pool cannot grow by {grow} slots"
        ))
        .into());
    }
    pool.reserve(grow + free);
    Ok(())
}

/// Removes repeated entries, keeping the first occurrence.
pub(crate) fn dedup_in_order<T: PartialEq + Copy>(items: &mut Vec<T>) {
    let mut seen = Vec::with_capacity(items.len());
    items.retain(|x| {
        if seen.contains(x) {
            false
        } else {
            seen.push(*x);
            true
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::ParticleStore;
    use crate::testing::{self, p};

    // ── Pools ───────────────────────────────────────────────

    #[test]
    fn pool_grows_by_increment() {
        let mut store = ParticleStore::default();
        let mut mesh = Mesh::new(10);
        let pid = store.create_particle(p(0.0, 0.0, 0.0)).unwrap();
        mesh.create_vertex(pid, p(0.0, 0.0, 0.0)).unwrap();
        assert!(mesh.vertices.capacity() >= 10);

        mesh.ensure_available_vertices(25).unwrap();
        assert!(mesh.vertices.capacity() - mesh.num_vertices() >= 25);
    }

    #[test]
    fn freed_slot_is_reused() {
        let mut store = ParticleStore::default();
        let mut mesh = Mesh::default();
        let a = testing::vertex(&mut mesh, &mut store, p(0.0, 0.0, 0.0));
        let removal = mesh.remove(MeshObj::Vertex(a)).unwrap();
        assert_eq!(removal.objects, vec![MeshObj::Vertex(a)]);

        let b = testing::vertex(&mut mesh, &mut store, p(1.0, 0.0, 0.0));
        assert_ne!(a, b, "stale handle must not alias the new vertex");
        assert_eq!(a.data().as_ffi() & 0xffff_ffff, b.data().as_ffi() & 0xffff_ffff);
        assert!(mesh.vertex(a).is_err());
    }

    // ── Creation ────────────────────────────────────────────

    #[test]
    fn surface_needs_three_distinct_vertices() {
        let mut store = ParticleStore::default();
        let mut mesh = Mesh::default();
        let a = testing::vertex(&mut mesh, &mut store, p(0.0, 0.0, 0.0));
        let b = testing::vertex(&mut mesh, &mut store, p(1.0, 0.0, 0.0));
        let ty = SurfaceTypeId(0);

        assert!(mesh.create_surface(ty, &[a, b]).is_err());
        assert!(mesh.create_surface(ty, &[a, b, a]).is_err());
        assert_eq!(mesh.num_surfaces(), 0);
    }

    #[test]
    fn tetrahedron_is_valid() {
        let fx = testing::tetrahedron();
        fx.mesh.validate().unwrap();
        assert_eq!(fx.mesh.num_vertices(), 4);
        assert_eq!(fx.mesh.num_surfaces(), 4);
        assert_eq!(fx.mesh.num_bodies(), 1);
        for (_, s) in fx.mesh.surfaces() {
            assert_eq!(s.vertices().len(), 3);
        }
    }

    #[test]
    fn body_needs_four_surfaces() {
        let mut fx = testing::tetrahedron();
        let body = fx.body;
        let surfaces = fx.mesh.body(body).unwrap().surfaces().to_vec();
        fx.mesh.remove(MeshObj::Body(body)).unwrap();

        let result = fx.mesh.create_body(BodyTypeId(0), 1.0, &surfaces[..3]);
        assert!(result.is_err());
    }

    // ── Removal ─────────────────────────────────────────────

    #[test]
    fn removing_vertex_cascades_to_triangles_and_body() {
        let mut fx = testing::tetrahedron();
        let v = fx.vertices[0];
        let removal = fx.mesh.remove(MeshObj::Vertex(v)).unwrap();

        // Three triangles touch the vertex, which leaves the body with one surface.
        assert_eq!(fx.mesh.num_surfaces(), 1);
        assert_eq!(fx.mesh.num_bodies(), 0);
        assert_eq!(removal.particles.len(), 1);
        fx.mesh.validate().unwrap();
    }

    #[test]
    fn removing_body_keeps_surfaces() {
        let mut fx = testing::tetrahedron();
        fx.mesh.remove(MeshObj::Body(fx.body)).unwrap();
        assert_eq!(fx.mesh.num_surfaces(), 4);
        for (_, s) in fx.mesh.surfaces() {
            assert!(s.bodies().next().is_none());
        }
        fx.mesh.validate().unwrap();
    }

    #[test]
    fn removing_dead_object_is_invalid_handle() {
        let mut fx = testing::tetrahedron();
        fx.mesh.remove(MeshObj::Body(fx.body)).unwrap();
        let err = fx.mesh.remove(MeshObj::Body(fx.body)).unwrap_err();
        assert!(matches!(
            err,
            crate::MeshError::Topology(TopologyError::InvalidHandle(_))
        ));
    }

    // ── Queries ─────────────────────────────────────────────

    #[test]
    fn find_vertex_tolerance_boundary() {
        let fx = testing::tetrahedron();
        let target = fx.mesh.vertex(fx.vertices[1]).unwrap().position();
        let query = target + crate::math::Vector3::new(0.0, 0.0, 0.001);

        assert_eq!(fx.mesh.find_vertex(&query, 0.0), None);
        assert_eq!(fx.mesh.find_vertex(&query, 0.0011), Some(fx.vertices[1]));
        assert_eq!(fx.mesh.find_vertex(&target, 0.0), Some(fx.vertices[1]));
    }

    #[test]
    fn connectivity_by_kind() {
        let fx = testing::tetrahedron();
        let [a, b, ..] = fx.vertices[..] else {
            panic!("tetrahedron has four vertices");
        };
        assert!(fx.mesh.connected(MeshObj::Vertex(a), MeshObj::Vertex(b)).unwrap());

        let surfaces = fx.mesh.surface_ids();
        assert!(fx
            .mesh
            .connected(MeshObj::Surface(surfaces[0]), MeshObj::Surface(surfaces[1]))
            .unwrap());
        assert!(!fx
            .mesh
            .connected(MeshObj::Vertex(a), MeshObj::Body(fx.body))
            .unwrap());
    }

    #[test]
    fn validate_detects_broken_secondary_index() {
        let mut fx = testing::tetrahedron();
        let v = fx.vertices[0];
        fx.mesh.vertex_mut(v).unwrap().surfaces.clear();
        assert!(fx.mesh.validate().is_err());
    }

    // ── Geometry sync ───────────────────────────────────────

    #[test]
    fn position_changed_is_idempotent() {
        let mut fx = testing::box_grid(2, 1, 1);
        fx.mesh.position_changed(&mut fx.engine).unwrap();
        let first = testing::geometry_fingerprint(&fx.mesh);
        fx.mesh.position_changed(&mut fx.engine).unwrap();
        let second = testing::geometry_fingerprint(&fx.mesh);

        assert_eq!(first, second);
        assert!(!fx.mesh.is_dirty());
    }
}
