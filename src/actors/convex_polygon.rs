use serde::{Deserialize, Serialize};

use super::{encode, ring, Actor, ActorContext};
use crate::error::Result;
use crate::io::IoElement;
use crate::math::{Vector3, TOLERANCE};
use crate::topology::{MeshObj, VertexId};

/// Pushes concave vertices of a surface back onto the chord between their
/// neighbors.
///
/// Convex vertices feel nothing. Stiffness scales with vertex mass over the
/// time step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvexPolygonConstraint {
    pub lam: f64,
}

impl ConvexPolygonConstraint {
    #[must_use]
    pub fn new(lam: f64) -> Self {
        Self { lam }
    }

    /// Stiffness and displacement to the chord, if `v` is concave on `source`.
    fn correction(
        ctx: &ActorContext<'_>,
        source: MeshObj,
        v: VertexId,
    ) -> Result<Option<(f64, Vector3)>> {
        let MeshObj::Surface(s) = source else {
            return Ok(None);
        };
        if ctx.dt <= 0.0 {
            return Ok(None);
        }
        let Some(r) = ring(ctx.mesh, s, v)? else {
            return Ok(None);
        };
        let normal = ctx.mesh.surface(s)?.normal();
        let turn = (r.pos - r.prev).cross(&(r.next - r.pos)).dot(&normal);
        if turn >= 0.0 {
            return Ok(None);
        }
        let chord = r.next - r.prev;
        let len2 = chord.norm_squared();
        if len2 < TOLERANCE {
            return Ok(None);
        }
        let t = (r.pos - r.prev).dot(&chord) / len2;
        let foot = r.prev + chord * t;
        let k = ctx.mesh.vertex(v)?.mass() / ctx.dt;
        Ok(Some((k, foot - r.pos)))
    }
}

impl Actor for ConvexPolygonConstraint {
    fn name(&self) -> &'static str {
        "ConvexPolygonConstraint"
    }

    fn energy(&self, ctx: &ActorContext<'_>, source: MeshObj, target: VertexId) -> Result<f64> {
        Ok(Self::correction(ctx, source, target)?
            .map_or(0.0, |(k, d)| 0.5 * self.lam * k * d.norm_squared()))
    }

    fn force(
        &self,
        ctx: &ActorContext<'_>,
        source: MeshObj,
        target: VertexId,
    ) -> Result<Vector3> {
        Ok(Self::correction(ctx, source, target)?
            .map_or_else(Vector3::zeros, |(k, d)| d * (self.lam * k)))
    }

    fn to_element(&self) -> Result<IoElement> {
        encode(self)
    }
}
