use serde::{Deserialize, Serialize};

use super::{encode, Actor, ActorContext};
use crate::error::Result;
use crate::io::IoElement;
use crate::math::Vector3;
use crate::topology::{MeshObj, VertexId};

/// Uniform traction per unit area applied over a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceTraction {
    pub comps: Vector3,
}

impl SurfaceTraction {
    #[must_use]
    pub fn new(comps: Vector3) -> Self {
        Self { comps }
    }
}

impl Actor for SurfaceTraction {
    fn name(&self) -> &'static str {
        "SurfaceTraction"
    }

    fn energy(&self, ctx: &ActorContext<'_>, source: MeshObj, target: VertexId) -> Result<f64> {
        let force = self.force(ctx, source, target)?;
        Ok(force.dot(&ctx.mesh.vertex(target)?.velocity()) * ctx.dt)
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
        Ok(self.comps * ctx.mesh.surface_vertex_area(s, target)?)
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
    fn forces_sum_to_traction_times_area() {
        let fx = testing::quad_grid(2, 2);
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let actor = SurfaceTraction::new(Vector3::new(0.0, 0.0, 2.0));
        let s = fx.surfaces[3];
        let total: Vector3 = fx
            .mesh
            .surface(s)
            .unwrap()
            .vertices()
            .iter()
            .map(|v| actor.force(&ctx, MeshObj::Surface(s), *v).unwrap())
            .sum();
        assert_relative_eq!(total, Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-12);
    }

    #[test]
    fn energy_vanishes_at_rest() {
        let fx = testing::quad_grid(1, 1);
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let actor = SurfaceTraction::new(Vector3::new(1.0, 0.0, 0.0));
        let v = fx.vertices[0];
        assert_relative_eq!(actor.energy(&ctx, MeshObj::Surface(fx.surfaces[0]), v).unwrap(), 0.0);
    }
}
