use serde::{Deserialize, Serialize};

use super::{encode, ring, Actor, ActorContext};
use crate::error::Result;
use crate::io::IoElement;
use crate::math::{unit_or_zero, Vector3};
use crate::topology::{MeshObj, VertexId};

/// Line tension along the boundary edges of a surface.
///
/// Each edge carries energy `lam * length`, split evenly between its two
/// endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeTension {
    pub lam: f64,
}

impl EdgeTension {
    #[must_use]
    pub fn new(lam: f64) -> Self {
        Self { lam }
    }
}

impl Actor for EdgeTension {
    fn name(&self) -> &'static str {
        "EdgeTension"
    }

    fn energy(&self, ctx: &ActorContext<'_>, source: MeshObj, target: VertexId) -> Result<f64> {
        let MeshObj::Surface(s) = source else {
            return Ok(0.0);
        };
        Ok(ring(ctx.mesh, s, target)?.map_or(0.0, |r| {
            0.5 * self.lam * ((r.prev - r.pos).norm() + (r.next - r.pos).norm())
        }))
    }

    fn force(
        &self,
        ctx: &ActorContext<'_>,
        source: MeshObj,
        target: VertexId,
    ) -> Result<Vector3> {
        let MeshObj::Surface(s) = source else {
            return Ok(Vector3::zeros());
        };
        Ok(ring(ctx.mesh, s, target)?.map_or_else(Vector3::zeros, |r| {
            (unit_or_zero(&(r.prev - r.pos)) + unit_or_zero(&(r.next - r.pos))) * self.lam
        }))
    }

    fn to_element(&self) -> Result<IoElement> {
        encode(self)
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
    fn energies_sum_to_lam_times_perimeter() {
        let fx = testing::tetrahedron();
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let actor = EdgeTension::new(3.0);
        let s = fx.mesh.surface_ids()[0];
        let data = fx.mesh.surface(s).unwrap();
        let total: f64 = data
            .vertices()
            .iter()
            .map(|v| actor.energy(&ctx, MeshObj::Surface(s), *v).unwrap())
            .sum();
        assert_relative_eq!(total, 3.0 * data.perimeter(), epsilon = 1e-12);
    }

    #[test]
    fn force_on_square_corner_points_inward() {
        let fx = testing::quad_grid(1, 1);
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let v = fx.mesh.find_vertex(&testing::p(0.0, 0.0, 0.0), 1e-9).unwrap();
        let f = EdgeTension::new(1.0)
            .force(&ctx, MeshObj::Surface(fx.surfaces[0]), v)
            .unwrap();
        assert_relative_eq!(f, Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn ignores_non_surface_sources() {
        let fx = testing::tetrahedron();
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let f = EdgeTension::new(1.0)
            .force(&ctx, MeshObj::Body(fx.body), fx.vertices[0])
            .unwrap();
        assert_relative_eq!(f, Vector3::zeros());
    }
}
