use serde::{Deserialize, Serialize};

use super::{encode, Actor, ActorContext};
use crate::error::Result;
use crate::io::IoElement;
use crate::math::Vector3;
use crate::topology::{MeshObj, VertexId};

/// Pulls the vertices of a surface onto the plane through its centroid.
///
/// The stiffness scales with vertex mass over the time step, so `lam = 1`
/// removes the out-of-plane offset in about one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatSurfaceConstraint {
    pub lam: f64,
}

impl FlatSurfaceConstraint {
    #[must_use]
    pub fn new(lam: f64) -> Self {
        Self { lam }
    }

    /// Stiffness, signed plane offset and plane normal for `v` on `source`.
    fn terms(ctx: &ActorContext<'_>, source: MeshObj, v: VertexId) -> Result<Option<(f64, f64, Vector3)>> {
        let MeshObj::Surface(s) = source else {
            return Ok(None);
        };
        let data = ctx.mesh.surface(s)?;
        if !data.defined_by(v) || ctx.dt <= 0.0 {
            return Ok(None);
        }
        let vertex = ctx.mesh.vertex(v)?;
        let normal = data.normal();
        let offset = (vertex.position() - data.centroid()).dot(&normal);
        Ok(Some((vertex.mass() / ctx.dt, offset, normal)))
    }
}

impl Actor for FlatSurfaceConstraint {
    fn name(&self) -> &'static str {
        "FlatSurfaceConstraint"
    }

    fn energy(&self, ctx: &ActorContext<'_>, source: MeshObj, target: VertexId) -> Result<f64> {
        Ok(Self::terms(ctx, source, target)?
            .map_or(0.0, |(k, d, _)| 0.5 * self.lam * k * d * d))
    }

    fn force(
        &self,
        ctx: &ActorContext<'_>,
        source: MeshObj,
        target: VertexId,
    ) -> Result<Vector3> {
        Ok(Self::terms(ctx, source, target)?
            .map_or_else(Vector3::zeros, |(k, d, n)| n * (-self.lam * k * d)))
    }

    fn to_element(&self) -> Result<IoElement> {
        encode(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::engine::ParticleEngine;
    use crate::testing;
    use crate::types::TypeRegistry;
    use approx::assert_relative_eq;

    #[test]
    fn flat_surface_feels_nothing() {
        let fx = testing::box_grid(1, 1, 1);
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.1,
        };
        let actor = FlatSurfaceConstraint::new(1.0);
        for (s, data) in fx.mesh.surfaces() {
            for v in data.vertices() {
                assert_relative_eq!(
                    actor.force(&ctx, MeshObj::Surface(s), *v).unwrap(),
                    Vector3::zeros(),
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn lifted_vertex_is_pulled_back() {
        let mut fx = testing::quad_grid(1, 1);
        let v = fx.vertices[2];
        let pid = fx.mesh.vertex(v).unwrap().particle();
        let pos = fx.engine.position(pid).unwrap();
        fx.engine
            .set_position(pid, pos + Vector3::new(0.0, 0.0, 0.4))
            .unwrap();
        fx.engine.set_mass(pid, 2.0).unwrap();
        fx.mesh.position_changed(&mut fx.engine).unwrap();

        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.5,
        };
        let s = fx.surfaces[0];
        let f = FlatSurfaceConstraint::new(1.0)
            .force(&ctx, MeshObj::Surface(s), v)
            .unwrap();
        let normal = fx.mesh.surface(s).unwrap().normal();
        let offset = (fx.mesh.vertex(v).unwrap().position() - fx.mesh.surface(s).unwrap().centroid())
            .dot(&normal);
        assert!(offset.abs() > 0.0);
        // Stiffness is mass / dt = 4.
        assert_relative_eq!(f, normal * (-4.0 * offset), epsilon = 1e-12);
    }
}
