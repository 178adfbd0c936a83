use serde::{Deserialize, Serialize};

use super::{encode, ring, Actor, ActorContext};
use crate::error::Result;
use crate::io::IoElement;
use crate::math::{unit_or_zero, Vector3};
use crate::topology::{MeshObj, VertexId};

/// Penalizes deviation of a surface's perimeter from a target.
///
/// Energy `lam * (P - constr)^2`, shared evenly among the surface's vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerimeterConstraint {
    pub lam: f64,
    pub constr: f64,
}

impl PerimeterConstraint {
    #[must_use]
    pub fn new(lam: f64, constr: f64) -> Self {
        Self { lam, constr }
    }
}

impl Actor for PerimeterConstraint {
    fn name(&self) -> &'static str {
        "PerimeterConstraint"
    }

    #[allow(clippy::cast_precision_loss)]
    fn energy(&self, ctx: &ActorContext<'_>, source: MeshObj, target: VertexId) -> Result<f64> {
        let MeshObj::Surface(s) = source else {
            return Ok(0.0);
        };
        let data = ctx.mesh.surface(s)?;
        if !data.defined_by(target) {
            return Ok(0.0);
        }
        let dp = data.perimeter() - self.constr;
        Ok(self.lam * dp * dp / data.vertices().len() as f64)
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
        let dp = ctx.mesh.surface(s)?.perimeter() - self.constr;
        Ok(ring(ctx.mesh, s, target)?.map_or_else(Vector3::zeros, |r| {
            (unit_or_zero(&(r.prev - r.pos)) + unit_or_zero(&(r.next - r.pos)))
                * (2.0 * self.lam * dp)
        }))
    }

    fn to_element(&self) -> Result<IoElement> {
        encode(self)
    }
}
