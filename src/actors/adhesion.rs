use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{encode, ring, surface_area_gradient, Actor, ActorContext};
use crate::error::Result;
use crate::io::{IoElement, TypeMaps};
use crate::math::{unit_or_zero, Vector3};
use crate::topology::{BodyId, Mesh, MeshObj, SurfaceId, VertexId};
use crate::types::{BodyTypeId, SurfaceTypeId};

/// Symmetric set of type pairs an interaction applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypePairs<T: Ord> {
    pairs: BTreeSet<(T, T)>,
}

impl<T: Ord> Default for TypePairs<T> {
    fn default() -> Self {
        Self {
            pairs: BTreeSet::new(),
        }
    }
}

impl<T: Ord + Copy> TypePairs<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the unordered pair `(a, b)`.
    pub fn register(&mut self, a: T, b: T) {
        self.pairs.insert(Self::key(a, b));
    }

    #[must_use]
    pub fn has_pair(&self, a: T, b: T) -> bool {
        self.pairs.contains(&Self::key(a, b))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Applies `f` to both members of every pair.
    pub fn remap(&mut self, f: impl Fn(T) -> T) {
        self.pairs = std::mem::take(&mut self.pairs)
            .into_iter()
            .map(|(a, b)| Self::key(f(a), f(b)))
            .collect();
    }

    fn key(a: T, b: T) -> (T, T) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

/// Adhesion between objects of paired types.
///
/// Surface-sourced: every boundary edge of the source that is also an edge
/// of a paired-type surface pulls its endpoints together with tension
/// `lam`, shared evenly between the two surfaces.
///
/// Body-sourced: every surface of the source whose other body has a paired
/// type contributes energy `0.5 * lam * |next - v|` per vertex and pulls the
/// vertex along the negative gradient of the contact area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adhesion {
    pub lam: f64,
    pub surface_pairs: TypePairs<SurfaceTypeId>,
    pub body_pairs: TypePairs<BodyTypeId>,
}

struct EdgeContacts {
    prev: Vector3,
    next: Vector3,
    prev_count: f64,
    next_count: f64,
}

impl Adhesion {
    #[must_use]
    pub fn new(lam: f64) -> Self {
        Self {
            lam,
            surface_pairs: TypePairs::new(),
            body_pairs: TypePairs::new(),
        }
    }

    /// Enables adhesion between two surface types.
    pub fn register_surface_pair(&mut self, a: SurfaceTypeId, b: SurfaceTypeId) {
        self.surface_pairs.register(a, b);
    }

    /// Enables adhesion between two body types.
    pub fn register_body_pair(&mut self, a: BodyTypeId, b: BodyTypeId) {
        self.body_pairs.register(a, b);
    }

    fn edge_contacts(&self, mesh: &Mesh, s: SurfaceId, v: VertexId) -> Result<Option<EdgeContacts>> {
        let Some(ring) = ring(mesh, s, v)? else {
            return Ok(None);
        };
        let source_type = mesh.surface(s)?.type_id();
        let mut prev_count = 0.0;
        let mut next_count = 0.0;
        for other in mesh.vertex(v)?.surfaces() {
            if *other == s {
                continue;
            }
            let data = mesh.surface(*other)?;
            if !self.surface_pairs.has_pair(source_type, data.type_id()) {
                continue;
            }
            if data.are_adjacent(v, ring.prev_id) {
                prev_count += 1.0;
            }
            if data.are_adjacent(v, ring.next_id) {
                next_count += 1.0;
            }
        }
        Ok(Some(EdgeContacts {
            prev: ring.prev - ring.pos,
            next: ring.next - ring.pos,
            prev_count,
            next_count,
        }))
    }

    /// Surfaces of `b` at `v` whose other body has a paired type.
    fn contact_surfaces(&self, mesh: &Mesh, b: BodyId, v: VertexId) -> Result<Vec<SurfaceId>> {
        let body = mesh.body(b)?;
        let mut result = Vec::new();
        for s in mesh.vertex(v)?.surfaces() {
            if !body.defined_by(*s) {
                continue;
            }
            let Some(other) = mesh.surface(*s)?.other_body(b) else {
                continue;
            };
            if self
                .body_pairs
                .has_pair(body.type_id(), mesh.body(other)?.type_id())
            {
                result.push(*s);
            }
        }
        Ok(result)
    }
}

impl Actor for Adhesion {
    fn name(&self) -> &'static str {
        "Adhesion"
    }

    fn energy(&self, ctx: &ActorContext<'_>, source: MeshObj, target: VertexId) -> Result<f64> {
        match source {
            MeshObj::Surface(s) => Ok(self
                .edge_contacts(ctx.mesh, s, target)?
                .map_or(0.0, |c| {
                    0.25 * self.lam
                        * (c.prev.norm() * c.prev_count + c.next.norm() * c.next_count)
                })),
            MeshObj::Body(b) => {
                let mut length = 0.0;
                for s in self.contact_surfaces(ctx.mesh, b, target)? {
                    if let Some(r) = ring(ctx.mesh, s, target)? {
                        length += (r.next - r.pos).norm();
                    }
                }
                Ok(0.5 * self.lam * length)
            }
            _ => Ok(0.0),
        }
    }

    fn force(
        &self,
        ctx: &ActorContext<'_>,
        source: MeshObj,
        target: VertexId,
    ) -> Result<Vector3> {
        match source {
            MeshObj::Surface(s) => Ok(self
                .edge_contacts(ctx.mesh, s, target)?
                .map_or_else(Vector3::zeros, |c| {
                    (unit_or_zero(&c.prev) * c.prev_count + unit_or_zero(&c.next) * c.next_count)
                        * (0.5 * self.lam)
                })),
            MeshObj::Body(b) => {
                let mut grad = Vector3::zeros();
                for s in self.contact_surfaces(ctx.mesh, b, target)? {
                    grad += surface_area_gradient(ctx.mesh, s, target)?;
                }
                Ok(-grad * (0.5 * self.lam))
            }
            _ => Ok(Vector3::zeros()),
        }
    }

    fn to_element(&self) -> Result<IoElement> {
        encode(self)
    }

    fn remap_types(&mut self, maps: &TypeMaps) {
        self.surface_pairs.remap(|t| maps.surface(t));
        self.body_pairs.remap(|t| maps.body(t));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing;
    use crate::types::TypeRegistry;
    use approx::assert_relative_eq;

    #[test]
    fn type_pairs_are_symmetric() {
        let mut pairs = TypePairs::new();
        pairs.register(BodyTypeId(2), BodyTypeId(1));
        assert!(pairs.has_pair(BodyTypeId(1), BodyTypeId(2)));
        assert!(pairs.has_pair(BodyTypeId(2), BodyTypeId(1)));
        assert!(!pairs.has_pair(BodyTypeId(1), BodyTypeId(1)));
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn remap_rewrites_both_pair_members() {
        let mut adhesion = Adhesion::new(1.0);
        adhesion.register_body_pair(BodyTypeId(0), BodyTypeId(1));
        adhesion.register_surface_pair(SurfaceTypeId(0), SurfaceTypeId(0));
        let mut maps = TypeMaps::default();
        maps.body_types.insert(0, BodyTypeId(3));
        maps.surface_types.insert(0, SurfaceTypeId(2));

        adhesion.remap_types(&maps);
        assert!(adhesion.body_pairs.has_pair(BodyTypeId(1), BodyTypeId(3)));
        assert!(!adhesion.body_pairs.has_pair(BodyTypeId(0), BodyTypeId(1)));
        assert!(adhesion.surface_pairs.has_pair(SurfaceTypeId(2), SurfaceTypeId(2)));
        assert_eq!(adhesion.surface_pairs.len(), 1);
    }

    #[test]
    fn body_energy_over_shared_surface_is_half_lam_perimeter() {
        let fx = testing::box_grid(2, 1, 1);
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let mut adhesion = Adhesion::new(1.0);
        adhesion.register_body_pair(BodyTypeId(0), BodyTypeId(0));

        let a = fx.bodies[0];
        let shared = fx.mesh.find_interface(a, fx.bodies[1]).unwrap().unwrap();
        let surface = fx.mesh.surface(shared).unwrap();
        let total: f64 = surface
            .vertices()
            .iter()
            .map(|v| adhesion.energy(&ctx, MeshObj::Body(a), *v).unwrap())
            .sum();

        let direct: f64 = surface
            .vertices()
            .iter()
            .map(|v| {
                let (next, _) = surface.neighbor_vertices(*v).unwrap();
                let pv = fx.mesh.vertex(*v).unwrap().position();
                let pn = fx.mesh.vertex(next).unwrap().position();
                (pn - pv).norm()
            })
            .sum();
        assert_relative_eq!(total, 0.5 * 1.0 * direct, epsilon = 1e-12);
        assert_relative_eq!(total, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn body_adhesion_ignores_unpaired_types() {
        let fx = testing::box_grid(2, 1, 1);
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let mut adhesion = Adhesion::new(1.0);
        adhesion.register_body_pair(BodyTypeId(0), BodyTypeId(5));
        for v in fx.mesh.vertex_ids() {
            assert_relative_eq!(adhesion.energy(&ctx, MeshObj::Body(fx.bodies[0]), v).unwrap(), 0.0);
            assert_relative_eq!(
                adhesion.force(&ctx, MeshObj::Body(fx.bodies[0]), v).unwrap(),
                Vector3::zeros()
            );
        }
    }

    #[test]
    fn body_force_shrinks_contact_area() {
        let fx = testing::box_grid(2, 1, 1);
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let mut adhesion = Adhesion::new(1.0);
        adhesion.register_body_pair(BodyTypeId(0), BodyTypeId(0));
        let a = fx.bodies[0];
        let shared = fx.mesh.find_interface(a, fx.bodies[1]).unwrap().unwrap();
        let surface = fx.mesh.surface(shared).unwrap();
        let centroid = surface.centroid();
        for v in surface.vertices() {
            let f = adhesion.force(&ctx, MeshObj::Body(a), *v).unwrap();
            let outward = fx.mesh.vertex(*v).unwrap().position() - centroid;
            assert!(f.dot(&outward) < 0.0, "force {f:?} should point toward the centroid");
        }
    }

    #[test]
    fn surface_adhesion_pulls_along_shared_edges() {
        let fx = testing::quad_grid(2, 1);
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let mut adhesion = Adhesion::new(2.0);
        adhesion.register_surface_pair(SurfaceTypeId(0), SurfaceTypeId(0));
        // The two quads share the edge x = 1 from (1, 0) to (1, 1).
        let bottom = fx.mesh.find_vertex(&testing::p(1.0, 0.0, 0.0), 1e-9).unwrap();
        let left = fx.surfaces[0];

        let f = adhesion.force(&ctx, MeshObj::Surface(left), bottom).unwrap();
        assert_relative_eq!(f, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
        let e = adhesion.energy(&ctx, MeshObj::Surface(left), bottom).unwrap();
        assert_relative_eq!(e, 0.5, epsilon = 1e-12);
    }
}
