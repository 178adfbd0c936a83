use serde::{Deserialize, Serialize};

use super::{encode, surface_volume_gradient, Actor, ActorContext};
use crate::error::Result;
use crate::io::IoElement;
use crate::math::Vector3;
use crate::topology::{BodyId, Mesh, MeshObj, VertexId};

/// Penalizes deviation of a body's volume from a target.
///
/// Energy `lam * (V - constr)^2`, shared evenly among the body's vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConstraint {
    pub lam: f64,
    pub constr: f64,
}

impl VolumeConstraint {
    #[must_use]
    pub fn new(lam: f64, constr: f64) -> Self {
        Self { lam, constr }
    }
}

/// Gradient of the volume of `b` with respect to `v`, or `None` if `v` is
/// not on `b`.
fn volume_gradient(mesh: &Mesh, b: BodyId, v: VertexId) -> Result<Option<Vector3>> {
    let mut grad = Vector3::zeros();
    let mut touches = false;
    for s in mesh.body(b)?.surfaces() {
        let data = mesh.surface(*s)?;
        if data.defined_by(v) {
            touches = true;
            grad += surface_volume_gradient(mesh, *s, v)? * data.volume_sense(b);
        }
    }
    Ok(touches.then_some(grad))
}

impl Actor for VolumeConstraint {
    fn name(&self) -> &'static str {
        "VolumeConstraint"
    }

    #[allow(clippy::cast_precision_loss)]
    fn energy(&self, ctx: &ActorContext<'_>, source: MeshObj, target: VertexId) -> Result<f64> {
        let MeshObj::Body(b) = source else {
            return Ok(0.0);
        };
        if volume_gradient(ctx.mesh, b, target)?.is_none() {
            return Ok(0.0);
        }
        let dv = ctx.mesh.body(b)?.volume() - self.constr;
        let n = ctx.mesh.body_vertices(b)?.len();
        Ok(self.lam * dv * dv / n as f64)
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
        let dv = ctx.mesh.body(b)?.volume() - self.constr;
        Ok(volume_gradient(ctx.mesh, b, target)?
            .map_or_else(Vector3::zeros, |grad| grad * (-2.0 * self.lam * dv)))
    }

    fn to_element(&self) -> Result<IoElement> {
        encode(self)
    }
}
