use crate::engine::{ParticleEngine, ParticleId};
use crate::error::Result;
use crate::math::{unit_or_zero, Point3, Vector3};

use super::{dedup_in_order, BodyId, Mesh, StructureId, SurfaceId};

slotmap::new_key_type! {
    /// Unique identifier for a vertex in a mesh.
    pub struct VertexId;
}

/// A mesh vertex bound to one particle.
///
/// Position, velocity and mass are snapshots of the particle taken at the
/// last resync.
#[derive(Debug, Clone)]
pub struct VertexData {
    pub(crate) particle: ParticleId,
    pub(crate) surfaces: Vec<SurfaceId>,
    pub(crate) neighbors: Vec<VertexId>,
    pub(crate) position: Point3,
    pub(crate) velocity: Vector3,
    pub(crate) mass: f64,
}

impl VertexData {
    /// Creates an unattached vertex.
    #[must_use]
    pub fn new(particle: ParticleId, position: Point3) -> Self {
        Self {
            particle,
            surfaces: Vec::new(),
            neighbors: Vec::new(),
            position,
            velocity: Vector3::zeros(),
            mass: 0.0,
        }
    }

    #[must_use]
    pub fn particle(&self) -> ParticleId {
        self.particle
    }

    /// Surfaces this vertex defines.
    #[must_use]
    pub fn surfaces(&self) -> &[SurfaceId] {
        &self.surfaces
    }

    /// Cached topological neighbors.
    #[must_use]
    pub fn neighbors(&self) -> &[VertexId] {
        &self.neighbors
    }

    #[must_use]
    pub fn position(&self) -> Point3 {
        self.position
    }

    #[must_use]
    pub fn velocity(&self) -> Vector3 {
        self.velocity
    }

    #[must_use]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Returns `true` if this vertex defines surface `s`.
    #[must_use]
    pub fn defines(&self, s: SurfaceId) -> bool {
        self.surfaces.contains(&s)
    }

    pub(crate) fn refresh<E: ParticleEngine + ?Sized>(&mut self, engine: &E) -> Result<()> {
        self.position = engine.position(self.particle)?;
        self.velocity = engine.velocity(self.particle)?;
        self.mass = engine.mass(self.particle)?;
        Ok(())
    }
}

impl Mesh {
    /// Recomputes the cached neighbor list of `v` from its surfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if `v` or one of its surfaces is not live.
    pub fn update_neighbor_vertices(&mut self, v: VertexId) -> Result<()> {
        let mut neighbors = Vec::new();
        for s in &self.vertex(v)?.surfaces {
            if let Some((next, prev)) = self.surface(*s)?.neighbor_vertices(v) {
                neighbors.push(next);
                neighbors.push(prev);
            }
        }
        dedup_in_order(&mut neighbors);
        self.vertex_mut(v)?.neighbors = neighbors;
        Ok(())
    }

    /// Surfaces defined by both `a` and `b`.
    ///
    /// # Errors
    ///
    /// Returns an error if either vertex is not live.
    pub fn shared_surfaces(&self, a: VertexId, b: VertexId) -> Result<Vec<SurfaceId>> {
        let vb = self.vertex(b)?;
        Ok(self
            .vertex(a)?
            .surfaces
            .iter()
            .copied()
            .filter(|s| vb.surfaces.contains(s))
            .collect())
    }

    /// Bodies adjoining any surface of `v`.
    ///
    /// # Errors
    ///
    /// Returns an error if `v` is not live.
    pub fn vertex_bodies(&self, v: VertexId) -> Result<Vec<BodyId>> {
        let mut bodies = Vec::new();
        for s in &self.vertex(v)?.surfaces {
            bodies.extend(self.surface(*s)?.bodies());
        }
        dedup_in_order(&mut bodies);
        Ok(bodies)
    }

    /// Structures `v` belongs to through its bodies, including nested ones.
    ///
    /// # Errors
    ///
    /// Returns an error if `v` is not live.
    pub fn vertex_structures(&self, v: VertexId) -> Result<Vec<StructureId>> {
        let mut result: Vec<StructureId> = Vec::new();
        for b in self.vertex_bodies(v)? {
            result.extend(self.body(b)?.structures.iter().copied());
        }
        let mut i = 0;
        while i < result.len() {
            let children = self.structure(result[i])?.children.clone();
            for c in children {
                if !result.contains(&c) {
                    result.push(c);
                }
            }
            i += 1;
        }
        dedup_in_order(&mut result);
        Ok(result)
    }

    /// Area attributed to `v` over all of its surfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if `v` is not live.
    pub fn vertex_area(&self, v: VertexId) -> Result<f64> {
        let mut area = 0.0;
        for s in &self.vertex(v)?.surfaces {
            area += self.surface_vertex_area(*s, v)?;
        }
        Ok(area)
    }

    /// Volume attributed to `v` over all of its bodies.
    ///
    /// # Errors
    ///
    /// Returns an error if `v` is not live.
    pub fn vertex_volume(&self, v: VertexId) -> Result<f64> {
        let mut volume = 0.0;
        for b in self.vertex_bodies(v)? {
            volume += self.body_vertex_volume(b, v)?;
        }
        Ok(volume)
    }

    /// Mass attributed to `v` from the densities of its bodies.
    ///
    /// # Errors
    ///
    /// Returns an error if `v` is not live.
    pub fn vertex_mass(&self, v: VertexId) -> Result<f64> {
        let mut mass = 0.0;
        for b in self.vertex_bodies(v)? {
            mass += self.body_vertex_mass(b, v)?;
        }
        Ok(mass)
    }

    /// Surface of `v` whose centroid lies furthest along `direction`.
    ///
    /// # Errors
    ///
    /// Returns an error if `v` is not live.
    pub fn vertex_find_surface(&self, v: VertexId, direction: &Vector3) -> Result<Option<SurfaceId>> {
        let vertex = self.vertex(v)?;
        let dir = unit_or_zero(direction);
        let mut best: Option<(SurfaceId, f64)> = None;
        for s in &vertex.surfaces {
            let score = unit_or_zero(&(self.surface(*s)?.geometry.centroid - vertex.position)).dot(&dir);
            if best.is_none_or(|(_, b)| score > b) {
                best = Some((*s, score));
            }
        }
        Ok(best.map(|(s, _)| s))
    }

    /// Body of `v` whose centroid lies furthest along `direction`.
    ///
    /// # Errors
    ///
    /// Returns an error if `v` is not live.
    pub fn vertex_find_body(&self, v: VertexId, direction: &Vector3) -> Result<Option<BodyId>> {
        let position = self.vertex(v)?.position;
        let dir = unit_or_zero(direction);
        let mut best: Option<(BodyId, f64)> = None;
        for b in self.vertex_bodies(v)? {
            let score = unit_or_zero(&(self.body(b)?.geometry.centroid - position)).dot(&dir);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((b, score));
            }
        }
        Ok(best.map(|(b, _)| b))
    }
}
