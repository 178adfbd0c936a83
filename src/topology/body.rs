use crate::actors::Actor;
use crate::error::Result;
use crate::math::{Point3, Vector3};
use crate::types::BodyTypeId;

use super::{dedup_in_order, Mesh, StructureId, SurfaceId, VertexId};

slotmap::new_key_type! {
    /// Unique identifier for a body in a mesh.
    pub struct BodyId;
}

/// Derived geometry of a body.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyGeometry {
    /// Area-weighted average of surface centroids.
    pub centroid: Point3,
    pub area: f64,
    pub volume: f64,
}

/// A closed volume bounded by surfaces.
#[derive(Debug)]
pub struct BodyData {
    pub(crate) surfaces: Vec<SurfaceId>,
    pub(crate) structures: Vec<StructureId>,
    pub(crate) type_id: BodyTypeId,
    pub(crate) density: f64,
    pub(crate) geometry: BodyGeometry,
    /// Actors that apply to this body only.
    pub actors: Vec<Box<dyn Actor>>,
}

impl BodyData {
    #[must_use]
    pub fn new(type_id: BodyTypeId, density: f64, surfaces: Vec<SurfaceId>) -> Self {
        Self {
            surfaces,
            structures: Vec::new(),
            type_id,
            density,
            geometry: BodyGeometry::default(),
            actors: Vec::new(),
        }
    }

    #[must_use]
    pub fn surfaces(&self) -> &[SurfaceId] {
        &self.surfaces
    }

    #[must_use]
    pub fn structures(&self) -> &[StructureId] {
        &self.structures
    }

    #[must_use]
    pub fn type_id(&self) -> BodyTypeId {
        self.type_id
    }

    #[must_use]
    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn set_density(&mut self, density: f64) {
        self.density = density;
    }

    #[must_use]
    pub fn geometry(&self) -> &BodyGeometry {
        &self.geometry
    }

    #[must_use]
    pub fn centroid(&self) -> Point3 {
        self.geometry.centroid
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.geometry.area
    }

    #[must_use]
    pub fn volume(&self) -> f64 {
        self.geometry.volume
    }

    #[must_use]
    pub fn mass(&self) -> f64 {
        self.geometry.volume * self.density
    }

    #[must_use]
    pub fn defined_by(&self, s: SurfaceId) -> bool {
        self.surfaces.contains(&s)
    }
}

impl Mesh {
    /// Recomputes centroid, area and volume of body `b` from its surfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if `b` or one of its surfaces is not live.
    pub fn body_position_changed(&mut self, b: BodyId) -> Result<()> {
        let data = self.body(b)?;
        let mut weighted = Vector3::zeros();
        let mut area = 0.0;
        let mut volume = 0.0;
        for s in &data.surfaces {
            let surface = self.surface(*s)?;
            weighted += surface.geometry.centroid.coords * surface.geometry.area;
            area += surface.geometry.area;
            volume += surface.volume_contribution(b);
        }
        let centroid = if area > 0.0 {
            Point3::from(weighted / area)
        } else {
            Point3::origin()
        };
        self.body_mut(b)?.geometry = BodyGeometry {
            centroid,
            area,
            volume,
        };
        Ok(())
    }

    /// Recomputes geometry and re-orients the body slots of every surface of `b`.
    ///
    /// # Errors
    ///
    /// Returns an error if `b` or one of its surfaces is not live.
    pub fn body_update_internals(&mut self, b: BodyId) -> Result<()> {
        let surfaces = self.body(b)?.surfaces.clone();
        for s in &surfaces {
            self.surface_position_changed(*s)?;
        }
        self.body_position_changed(b)?;
        for s in &surfaces {
            self.refresh_surface_bodies(*s)?;
        }
        self.body_position_changed(b)
    }

    /// Distinct vertices of every surface of `b`.
    ///
    /// # Errors
    ///
    /// Returns an error if `b` or one of its surfaces is not live.
    pub fn body_vertices(&self, b: BodyId) -> Result<Vec<VertexId>> {
        let mut result = Vec::new();
        for s in &self.body(b)?.surfaces {
            result.extend(self.surface(*s)?.vertices.iter().copied());
        }
        dedup_in_order(&mut result);
        Ok(result)
    }

    /// Bodies sharing a surface with `b`.
    ///
    /// # Errors
    ///
    /// Returns an error if `b` or one of its surfaces is not live.
    pub fn body_neighbor_bodies(&self, b: BodyId) -> Result<Vec<BodyId>> {
        let mut result = Vec::new();
        for s in &self.body(b)?.surfaces {
            if let Some(other) = self.surface(*s)?.other_body(b) {
                result.push(other);
            }
        }
        dedup_in_order(&mut result);
        Ok(result)
    }

    /// Surfaces of `b` other than `s` that share a vertex with `s`.
    ///
    /// # Errors
    ///
    /// Returns an error if `b`, `s` or a surface of `b` is not live.
    pub fn body_neighbor_surfaces(&self, b: BodyId, s: SurfaceId) -> Result<Vec<SurfaceId>> {
        let target = self.surface(s)?;
        let mut result = Vec::new();
        for other in &self.body(b)?.surfaces {
            if *other == s {
                continue;
            }
            if self
                .surface(*other)?
                .vertices
                .iter()
                .any(|v| target.defined_by(*v))
            {
                result.push(*other);
            }
        }
        Ok(result)
    }

    /// Area of the surfaces of `b` attributed to vertex `v`.
    ///
    /// # Errors
    ///
    /// Returns an error if `b` or one of its surfaces is not live.
    pub fn body_vertex_area(&self, b: BodyId, v: VertexId) -> Result<f64> {
        let mut area = 0.0;
        for s in &self.body(b)?.surfaces {
            if self.surface(*s)?.defined_by(v) {
                area += self.surface_vertex_area(*s, v)?;
            }
        }
        Ok(area)
    }

    /// Share of the volume of `b` attributed to `v`, proportional to its area share.
    ///
    /// # Errors
    ///
    /// Returns an error if `b` or one of its surfaces is not live.
    pub fn body_vertex_volume(&self, b: BodyId, v: VertexId) -> Result<f64> {
        let geometry = self.body(b)?.geometry;
        if geometry.area <= 0.0 {
            return Ok(0.0);
        }
        Ok(self.body_vertex_area(b, v)? / geometry.area * geometry.volume)
    }

    /// Share of the mass of `b` attributed to `v`.
    ///
    /// # Errors
    ///
    /// Returns an error if `b` or one of its surfaces is not live.
    pub fn body_vertex_mass(&self, b: BodyId, v: VertexId) -> Result<f64> {
        Ok(self.body_vertex_volume(b, v)? * self.body(b)?.density)
    }

    /// A surface shared by `b` and `other`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if either body is not live.
    pub fn find_interface(&self, b: BodyId, other: BodyId) -> Result<Option<SurfaceId>> {
        let other = self.body(other)?;
        Ok(self
            .body(b)?
            .surfaces
            .iter()
            .copied()
            .find(|s| other.defined_by(*s)))
    }

    /// Total area of the surfaces shared by `b` and `other`.
    ///
    /// # Errors
    ///
    /// Returns an error if either body or a shared surface is not live.
    pub fn contact_area(&self, b: BodyId, other: BodyId) -> Result<f64> {
        let other = self.body(other)?;
        let mut area = 0.0;
        for s in &self.body(b)?.surfaces {
            if other.defined_by(*s) {
                area += self.surface(*s)?.geometry.area;
            }
        }
        Ok(area)
    }

    /// Returns `true` if `pos` lies outside `b`, judged against the surface
    /// whose centroid is nearest to `pos`.
    ///
    /// # Errors
    ///
    /// Returns an error if `b` or one of its surfaces is not live.
    pub fn body_is_outside(&self, b: BodyId, pos: &Point3) -> Result<bool> {
        let mut nearest: Option<(f64, bool)> = None;
        for s in &self.body(b)?.surfaces {
            let surface = self.surface(*s)?;
            let offset = pos - surface.geometry.centroid;
            let distance = offset.norm();
            let outward = surface.geometry.normal * surface.volume_sense(b);
            let outside = offset.dot(&outward) > 0.0;
            if nearest.is_none_or(|(d, _)| distance < d) {
                nearest = Some((distance, outside));
            }
        }
        Ok(nearest.is_some_and(|(_, outside)| outside))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::testing::{self, p};
    use approx::assert_relative_eq;

    #[test]
    fn unit_cube_geometry() {
        let fx = testing::box_grid(1, 1, 1);
        let body = fx.mesh.body(fx.body).unwrap();
        assert_relative_eq!(body.volume(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(body.area(), 6.0, epsilon = 1e-12);
        assert_relative_eq!(body.centroid(), p(0.5, 0.5, 0.5), epsilon = 1e-12);
    }

    #[test]
    fn tetrahedron_volume() {
        let fx = testing::tetrahedron();
        let body = fx.mesh.body(fx.body).unwrap();
        // Corner tetrahedron of the unit cube.
        assert_relative_eq!(body.volume(), 1.0 / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn adjoining_cubes_share_one_interface() {
        let fx = testing::box_grid(2, 1, 1);
        let [a, b] = fx.bodies[..] else {
            panic!("expected two bodies");
        };
        assert_eq!(fx.mesh.body_neighbor_bodies(a).unwrap(), vec![b]);
        assert!(fx.mesh.find_interface(a, b).unwrap().is_some());
        assert_relative_eq!(fx.mesh.contact_area(a, b).unwrap(), 1.0, epsilon = 1e-12);
        for id in [a, b] {
            assert_relative_eq!(fx.mesh.body(id).unwrap().volume(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn vertex_masses_sum_to_body_mass() {
        let mut fx = testing::box_grid(1, 1, 1);
        fx.mesh.body_mut(fx.body).unwrap().set_density(2.5);
        let total: f64 = fx
            .mesh
            .body_vertices(fx.body)
            .unwrap()
            .into_iter()
            .map(|v| fx.mesh.body_vertex_mass(fx.body, v).unwrap())
            .sum();
        assert_relative_eq!(total, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn inside_and_outside() {
        let fx = testing::box_grid(1, 1, 1);
        assert!(!fx.mesh.body_is_outside(fx.body, &p(0.5, 0.5, 0.5)).unwrap());
        assert!(fx.mesh.body_is_outside(fx.body, &p(0.5, 0.5, 1.5)).unwrap());
    }

    #[test]
    fn neighbor_surfaces_of_cube_face() {
        let fx = testing::box_grid(1, 1, 1);
        let s = fx.mesh.body(fx.body).unwrap().surfaces()[0];
        // Four faces share an edge with any face; the opposite face does not.
        assert_eq!(fx.mesh.body_neighbor_surfaces(fx.body, s).unwrap().len(), 4);
    }
}
