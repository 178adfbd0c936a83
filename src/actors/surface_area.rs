use serde::{Deserialize, Serialize};

use super::{encode, surface_area_gradient, Actor, ActorContext};
use crate::error::Result;
use crate::io::IoElement;
use crate::math::Vector3;
use crate::topology::{BodyId, Mesh, MeshObj, SurfaceId, VertexId};

/// Penalizes deviation of a surface's area, or a body's total surface area,
/// from a target.
///
/// Energy `lam * (A - constr)^2`, shared evenly among the object's vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceAreaConstraint {
    pub lam: f64,
    pub constr: f64,
}

impl SurfaceAreaConstraint {
    #[must_use]
    pub fn new(lam: f64, constr: f64) -> Self {
        Self { lam, constr }
    }

    /// Area of the source, its vertex count and its area gradient at `v`.
    fn terms(mesh: &Mesh, source: MeshObj, v: VertexId) -> Result<Option<(f64, usize, Vector3)>> {
        match source {
            MeshObj::Surface(s) => surface_terms(mesh, s, v),
            MeshObj::Body(b) => body_terms(mesh, b, v),
            _ => Ok(None),
        }
    }
}

fn surface_terms(mesh: &Mesh, s: SurfaceId, v: VertexId) -> Result<Option<(f64, usize, Vector3)>> {
    let data = mesh.surface(s)?;
    if !data.defined_by(v) {
        return Ok(None);
    }
    Ok(Some((
        data.area(),
        data.vertices().len(),
        surface_area_gradient(mesh, s, v)?,
    )))
}

fn body_terms(mesh: &Mesh, b: BodyId, v: VertexId) -> Result<Option<(f64, usize, Vector3)>> {
    let body = mesh.body(b)?;
    let mut grad = Vector3::zeros();
    let mut touches = false;
    for s in body.surfaces() {
        if mesh.surface(*s)?.defined_by(v) {
            touches = true;
            grad += surface_area_gradient(mesh, *s, v)?;
        }
    }
    if !touches {
        return Ok(None);
    }
    Ok(Some((body.area(), mesh.body_vertices(b)?.len(), grad)))
}

impl Actor for SurfaceAreaConstraint {
    fn name(&self) -> &'static str {
        "SurfaceAreaConstraint"
    }

    #[allow(clippy::cast_precision_loss)]
    fn energy(&self, ctx: &ActorContext<'_>, source: MeshObj, target: VertexId) -> Result<f64> {
        Ok(Self::terms(ctx.mesh, source, target)?.map_or(0.0, |(area, n, _)| {
            let da = area - self.constr;
            self.lam * da * da / n as f64
        }))
    }

    fn force(
        &self,
        ctx: &ActorContext<'_>,
        source: MeshObj,
        target: VertexId,
    ) -> Result<Vector3> {
        Ok(Self::terms(ctx.mesh, source, target)?
            .map_or_else(Vector3::zeros, |(area, _, grad)| {
                grad * (-2.0 * self.lam * (area - self.constr))
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
    use crate::testing::{self, numeric_gradient};
    use crate::types::TypeRegistry;
    use approx::assert_relative_eq;

    #[test]
    fn body_force_is_negative_gradient_of_energy() {
        let mut fx = testing::box_grid(1, 1, 1);
        testing::jitter(&mut fx, 0.05);
        let b = fx.body;
        let v = fx.vertices[3];
        let actor = SurfaceAreaConstraint::new(0.7, 5.0);

        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let force = actor.force(&ctx, MeshObj::Body(b), v).unwrap();
        let grad = numeric_gradient(&mut fx, v, |m| {
            let da = m.body(b).unwrap().area() - 5.0;
            0.7 * da * da
        });
        assert_relative_eq!(force, -grad, epsilon = 1e-5);
    }

    #[test]
    fn stretched_surface_contracts() {
        let fx = testing::quad_grid(1, 1);
        let types = TypeRegistry::new();
        let ctx = ActorContext {
            mesh: &fx.mesh,
            types: &types,
            dt: 0.01,
        };
        let actor = SurfaceAreaConstraint::new(1.0, 0.5);
        let s = fx.surfaces[0];
        let centroid = fx.mesh.surface(s).unwrap().centroid();
        for v in fx.mesh.vertex_ids() {
            let f = actor.force(&ctx, MeshObj::Surface(s), v).unwrap();
            let outward = fx.mesh.vertex(v).unwrap().position() - centroid;
            assert!(f.dot(&outward) < 0.0);
        }
        let total: f64 = fx
            .mesh
            .vertex_ids()
            .into_iter()
            .map(|v| actor.energy(&ctx, MeshObj::Surface(s), v).unwrap())
            .sum();
        assert_relative_eq!(total, 0.25, epsilon = 1e-12);
    }
}
