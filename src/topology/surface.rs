use crate::actors::Actor;
use crate::error::Result;
use crate::math::{centroid, triangle_normal, unit_or_zero, Point3, Vector3};
use crate::types::SurfaceTypeId;

use super::{dedup_in_order, BodyId, Mesh, VertexId};

slotmap::new_key_type! {
    /// Unique identifier for a surface in a mesh.
    pub struct SurfaceId;
}

/// Derived geometry of a surface, recomputed on every resync.
///
/// The polygon is fanned into triangles `(v_i, centroid, v_{i+1})`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SurfaceGeometry {
    pub centroid: Point3,
    pub velocity: Vector3,
    /// Unit normal, oriented by the vertex winding.
    pub normal: Vector3,
    pub area: f64,
    pub perimeter: f64,
    /// Signed volume of the cone from the origin to the polygon.
    pub volume_contribution: f64,
}

impl SurfaceGeometry {
    /// Computes geometry from ordered vertex positions and velocities.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(positions: &[Point3], velocities: &[Vector3]) -> Self {
        let n = positions.len();
        if n == 0 {
            return Self::default();
        }
        let c = centroid(positions);
        let velocity = velocities.iter().sum::<Vector3>() / velocities.len().max(1) as f64;

        let mut normal = Vector3::zeros();
        let mut area = 0.0;
        let mut perimeter = 0.0;
        let mut volume = 0.0;
        for i in 0..n {
            let vc = &positions[i];
            let vn = &positions[(i + 1) % n];
            let tri = triangle_normal(vc, &c, vn);
            volume += tri.dot(&c.coords);
            area += tri.norm();
            normal += tri;
            perimeter += (vn - vc).norm();
        }

        Self {
            centroid: c,
            velocity,
            normal: unit_or_zero(&normal),
            area: area / 2.0,
            perimeter,
            volume_contribution: volume / 6.0,
        }
    }
}

/// A polygonal surface: an ordered, closed loop of vertices.
///
/// `b1` is the body the normal points away from (outward), `b2` the body
/// the normal points into (inward).
#[derive(Debug)]
pub struct SurfaceData {
    pub(crate) vertices: Vec<VertexId>,
    pub(crate) b1: Option<BodyId>,
    pub(crate) b2: Option<BodyId>,
    pub(crate) type_id: SurfaceTypeId,
    pub(crate) geometry: SurfaceGeometry,
    /// Actors that apply to this surface only.
    pub actors: Vec<Box<dyn Actor>>,
}

impl SurfaceData {
    /// Creates a surface with no adjoining bodies.
    #[must_use]
    pub fn new(type_id: SurfaceTypeId, vertices: Vec<VertexId>) -> Self {
        Self {
            vertices,
            b1: None,
            b2: None,
            type_id,
            geometry: SurfaceGeometry::default(),
            actors: Vec::new(),
        }
    }

    /// Ordered boundary vertices.
    #[must_use]
    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    /// Body on the outward side of the normal.
    #[must_use]
    pub fn b1(&self) -> Option<BodyId> {
        self.b1
    }

    /// Body on the inward side of the normal.
    #[must_use]
    pub fn b2(&self) -> Option<BodyId> {
        self.b2
    }

    /// Adjoining bodies (zero, one or two).
    pub fn bodies(&self) -> impl Iterator<Item = BodyId> + '_ {
        [self.b1, self.b2].into_iter().flatten()
    }

    #[must_use]
    pub fn type_id(&self) -> SurfaceTypeId {
        self.type_id
    }

    #[must_use]
    pub fn geometry(&self) -> &SurfaceGeometry {
        &self.geometry
    }

    #[must_use]
    pub fn centroid(&self) -> Point3 {
        self.geometry.centroid
    }

    #[must_use]
    pub fn normal(&self) -> Vector3 {
        self.geometry.normal
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.geometry.area
    }

    #[must_use]
    pub fn perimeter(&self) -> f64 {
        self.geometry.perimeter
    }

    /// Returns `true` if `v` is one of this surface's vertices.
    #[must_use]
    pub fn defined_by(&self, v: VertexId) -> bool {
        self.vertices.contains(&v)
    }

    /// `+1` if `b` is the outward body, `-1` if inward, `0` otherwise.
    #[must_use]
    pub fn volume_sense(&self, b: BodyId) -> f64 {
        if self.b1 == Some(b) {
            1.0
        } else if self.b2 == Some(b) {
            -1.0
        } else {
            0.0
        }
    }

    /// Volume contributed to body `b`.
    #[must_use]
    pub fn volume_contribution(&self, b: BodyId) -> f64 {
        self.geometry.volume_contribution * self.volume_sense(b)
    }

    /// The body across this surface from `b`.
    #[must_use]
    pub fn other_body(&self, b: BodyId) -> Option<BodyId> {
        if self.b1 == Some(b) {
            self.b2
        } else if self.b2 == Some(b) {
            self.b1
        } else {
            None
        }
    }

    /// Next and previous vertices of `v` around the loop.
    #[must_use]
    pub fn neighbor_vertices(&self, v: VertexId) -> Option<(VertexId, VertexId)> {
        let n = self.vertices.len();
        let i = self.vertices.iter().position(|x| *x == v)?;
        Some((self.vertices[(i + 1) % n], self.vertices[(i + n - 1) % n]))
    }

    /// Returns `true` if `a` and `b` are consecutive around the loop.
    #[must_use]
    pub fn are_adjacent(&self, a: VertexId, b: VertexId) -> bool {
        self.neighbor_vertices(a)
            .is_some_and(|(next, prev)| next == b || prev == b)
    }

    /// Labels each vertex by the contiguous run of `shared` vertices it belongs to.
    ///
    /// Unshared vertices get label 0, shared runs get 1, 2, ... in loop
    /// order, and a run wrapping past the end of the list keeps the label of
    /// its start at index 0.
    #[must_use]
    pub fn contiguous_labels(&self, shared: impl Fn(VertexId) -> bool) -> Vec<u32> {
        let flags: Vec<bool> = self.vertices.iter().map(|v| shared(*v)).collect();
        let n = flags.len();
        let mut labels = vec![0u32; n];
        let mut label = 0;
        for i in 0..n {
            if flags[i] {
                if i == 0 || !flags[i - 1] {
                    label += 1;
                }
                labels[i] = label;
            }
        }
        if n > 1 && flags[0] && flags[n - 1] && labels[n - 1] != labels[0] {
            let first = labels[0];
            let last = labels[n - 1];
            for l in &mut labels {
                if *l == last {
                    *l = first;
                }
            }
        }
        labels
    }

    /// Contiguous-run labels of the vertices this surface shares with `other`.
    #[must_use]
    pub fn contiguous_edge_labels(&self, other: &SurfaceData) -> Vec<u32> {
        self.contiguous_labels(|v| other.defined_by(v))
    }

    /// Number of contiguous runs of vertices shared with `other`.
    #[must_use]
    pub fn shared_contiguous_edges(&self, other: &SurfaceData) -> u32 {
        self.contiguous_edge_labels(other)
            .into_iter()
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn clear_body(&mut self, b: BodyId) {
        if self.b1 == Some(b) {
            self.b1 = None;
        }
        if self.b2 == Some(b) {
            self.b2 = None;
        }
    }
}

impl Mesh {
    /// Recomputes the geometry of surface `s` from cached vertex positions.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` or one of its vertices is not live.
    pub fn surface_position_changed(&mut self, s: SurfaceId) -> Result<()> {
        let data = self.surface(s)?;
        let mut positions = Vec::with_capacity(data.vertices.len());
        let mut velocities = Vec::with_capacity(data.vertices.len());
        for v in &data.vertices {
            let vertex = self.vertex(*v)?;
            positions.push(vertex.position);
            velocities.push(vertex.velocity);
        }
        self.surface_mut(s)?.geometry = SurfaceGeometry::compute(&positions, &velocities);
        Ok(())
    }

    /// Position of the `i`-th vertex of `s`, wrapping around the loop.
    fn surface_point(&self, s: &SurfaceData, i: usize) -> Result<Point3> {
        let n = s.vertices.len();
        Ok(self.vertex(s.vertices[i % n])?.position)
    }

    /// Triangle normal of the fan triangle starting at vertex `i`.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` or one of its vertices is not live.
    pub fn surface_triangle_normal(&self, s: SurfaceId, i: usize) -> Result<Vector3> {
        let data = self.surface(s)?;
        let a = self.surface_point(data, i)?;
        let b = self.surface_point(data, i + 1)?;
        Ok(triangle_normal(&a, &data.geometry.centroid, &b))
    }

    /// Area of `s` attributed to vertex `v`.
    ///
    /// Each fan triangle gives a quarter of its doubled area to each of its
    /// two boundary vertices, so the attributions over all vertices sum to
    /// the surface area.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` or one of its vertices is not live.
    pub fn surface_vertex_area(&self, s: SurfaceId, v: VertexId) -> Result<f64> {
        let data = self.surface(s)?;
        let n = data.vertices.len();
        let mut area = 0.0;
        for i in 0..n {
            let vc = data.vertices[i];
            let vn = data.vertices[(i + 1) % n];
            if vc == v || vn == v {
                let a = self.vertex(vc)?.position;
                let b = self.vertex(vn)?.position;
                area += triangle_normal(&a, &data.geometry.centroid, &b).norm();
            }
        }
        Ok(area / 4.0)
    }

    /// Surfaces other than `s` that share at least one vertex with it.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` or one of its vertices is not live.
    pub fn connected_surfaces(&self, s: SurfaceId) -> Result<Vec<SurfaceId>> {
        let mut result = Vec::new();
        for v in &self.surface(s)?.vertices {
            result.extend(self.vertex(*v)?.surfaces.iter().filter(|x| **x != s));
        }
        dedup_in_order(&mut result);
        Ok(result)
    }

    /// Surfaces of the bodies adjoining `s` that share a vertex with it.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` or an adjoining body is not live.
    pub fn surface_neighbor_surfaces(&self, s: SurfaceId) -> Result<Vec<SurfaceId>> {
        let mut result = Vec::new();
        for b in self.surface(s)?.bodies() {
            result.extend(self.body_neighbor_surfaces(b, s)?);
        }
        dedup_in_order(&mut result);
        Ok(result)
    }

    /// Reassigns the body slots of `s` so that `b1` is the body its normal
    /// points away from.
    ///
    /// # Errors
    ///
    /// Returns an error if `s` or an adjoining body is not live.
    pub fn refresh_surface_bodies(&mut self, s: SurfaceId) -> Result<()> {
        let data = self.surface(s)?;
        let geometry = data.geometry;
        let outward = |b: BodyId| -> Result<bool> {
            let bc = self.body(b)?.geometry.centroid;
            Ok((geometry.centroid - bc).dot(&geometry.normal) > 0.0)
        };
        let (b1, b2) = match (data.b1, data.b2) {
            (Some(a), Some(b)) if !outward(a)? => (Some(b), Some(a)),
            (Some(a), None) if !outward(a)? => (None, Some(a)),
            (None, Some(b)) if outward(b)? => (Some(b), None),
            other => other,
        };
        let data = self.surface_mut(s)?;
        data.b1 = b1;
        data.b2 = b2;
        Ok(())
    }
}
