use serde::{Deserialize, Serialize};

use super::{encode, Actor, ActorContext};
use crate::error::Result;
use crate::io::IoElement;
use crate::math::Vector3;
use crate::topology::{MeshObj, VertexId};

/// Total force `comps` applied to a body, distributed over its vertices by
/// their share of the body's surface area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyForce {
    pub comps: Vector3,
}

impl BodyForce {
    #[must_use]
    pub fn new(comps: Vector3) -> Self {
        Self { comps }
    }
}

impl Actor for BodyForce {
    fn name(&self) -> &'static str {
        "BodyForce"
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
        let MeshObj::Body(b) = source else {
            return Ok(Vector3::zeros());
        };
        let area = ctx.mesh.body(b)?.area();
        if area <= 0.0 {
            return Ok(Vector3::zeros());
        }
        Ok(self.comps * (ctx.mesh.body_vertex_area(b, target)? / area))
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
    fn forces_sum_to_total() {
        let mut fx = testing::box_grid(1, 1, 1);
        testing::jitter(&mut fx, 0.1);
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let actor = BodyForce::new(Vector3::new(1.0, -2.0, 0.5));
        let total: Vector3 = fx
            .mesh
            .body_vertices(fx.body)
            .unwrap()
            .into_iter()
            .map(|v| actor.force(&ctx, MeshObj::Body(fx.body), v).unwrap())
            .sum();
        assert_relative_eq!(total, Vector3::new(1.0, -2.0, 0.5), epsilon = 1e-12);
    }
}
