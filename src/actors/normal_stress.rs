use serde::{Deserialize, Serialize};

use super::{encode, Actor, ActorContext};
use crate::error::Result;
use crate::io::IoElement;
use crate::math::Vector3;
use crate::topology::{MeshObj, VertexId};

/// Pressure `mag` acting along the outward normal of a boundary surface.
///
/// Interfaces between two bodies feel no stress. The direction points away
/// from the surface's only body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalStress {
    pub mag: f64,
}

impl NormalStress {
    #[must_use]
    pub fn new(mag: f64) -> Self {
        Self { mag }
    }
}

impl Actor for NormalStress {
    fn name(&self) -> &'static str {
        "NormalStress"
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
        let data = ctx.mesh.surface(s)?;
        let sense = match (data.b1(), data.b2()) {
            (Some(_), Some(_)) => return Ok(Vector3::zeros()),
            (None, Some(_)) => -1.0,
            _ => 1.0,
        };
        let area = ctx.mesh.surface_vertex_area(s, target)?;
        Ok(data.normal() * (sense * self.mag * area))
    }

    fn to_element(&self) -> Result<IoElement> {
        encode(self)
    }
}
