mod adhesion;
mod body_force;
mod convex_polygon;
mod edge_tension;
mod flat_surface;
mod normal_stress;
mod perimeter;
mod surface_area;
mod surface_traction;
mod volume;

pub use adhesion::{Adhesion, TypePairs};
pub use body_force::BodyForce;
pub use convex_polygon::ConvexPolygonConstraint;
pub use edge_tension::EdgeTension;
pub use flat_surface::FlatSurfaceConstraint;
pub use normal_stress::NormalStress;
pub use perimeter::PerimeterConstraint;
pub use surface_area::SurfaceAreaConstraint;
pub use surface_traction::SurfaceTraction;
pub use volume::VolumeConstraint;

use std::collections::HashMap;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{IoError, Result};
use crate::io::{IoElement, TypeMaps};
use crate::math::{Point3, Vector3};
use crate::topology::{Mesh, MeshObj, SurfaceId, VertexId};
use crate::types::TypeRegistry;

/// Read-only state an actor evaluates against.
#[derive(Debug, Clone, Copy)]
pub struct ActorContext<'a> {
    pub mesh: &'a Mesh,
    pub types: &'a TypeRegistry,
    /// Particle engine time step.
    pub dt: f64,
}

/// A force/energy law acting on vertices.
pub trait Actor: Debug + Send + Sync {
    /// Discriminator written to exported documents.
    fn name(&self) -> &'static str;

    /// Energy contributed by `source` acting on `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced object is not live.
    fn energy(&self, ctx: &ActorContext<'_>, source: MeshObj, target: VertexId) -> Result<f64>;

    /// Force exerted by `source` on `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced object is not live.
    fn force(&self, ctx: &ActorContext<'_>, source: MeshObj, target: VertexId)
        -> Result<Vector3>;

    /// Structured export of the actor's parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters cannot be encoded.
    fn to_element(&self) -> Result<IoElement>;

    /// Rewrites type ids stored in the actor after an import.
    fn remap_types(&mut self, _maps: &TypeMaps) {}
}

/// Encodes a serde-serializable actor under its name.
pub(crate) fn encode<A: Actor + Serialize>(actor: &A) -> Result<IoElement> {
    IoElement::encode(actor.name(), actor)
}

type Decoder = fn(&IoElement) -> Result<Box<dyn Actor>>;

fn decode<A: Actor + DeserializeOwned + 'static>(element: &IoElement) -> Result<Box<dyn Actor>> {
    Ok(Box::new(element.decode::<A>()?))
}

/// Maps actor names to import decoders.
#[derive(Debug, Clone)]
pub struct ActorRegistry {
    decoders: HashMap<String, Decoder>,
}

impl Default for ActorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ActorRegistry {
    /// Registry with no decoders.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry that decodes every built-in actor.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("Adhesion", decode::<Adhesion>);
        registry.register("BodyForce", decode::<BodyForce>);
        registry.register("ConvexPolygonConstraint", decode::<ConvexPolygonConstraint>);
        registry.register("EdgeTension", decode::<EdgeTension>);
        registry.register("FlatSurfaceConstraint", decode::<FlatSurfaceConstraint>);
        registry.register("NormalStress", decode::<NormalStress>);
        registry.register("PerimeterConstraint", decode::<PerimeterConstraint>);
        registry.register("SurfaceAreaConstraint", decode::<SurfaceAreaConstraint>);
        registry.register("SurfaceTraction", decode::<SurfaceTraction>);
        registry.register("VolumeConstraint", decode::<VolumeConstraint>);
        registry
    }

    /// Adds or replaces the decoder for `name`.
    pub fn register(&mut self, name: impl Into<String>, decoder: Decoder) {
        self.decoders.insert(name.into(), decoder);
    }

    /// Rebuilds an actor from its exported element.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnknownKind`] if no decoder is registered for the
    /// element kind, or a decoding error.
    pub fn decode(&self, element: &IoElement) -> Result<Box<dyn Actor>> {
        let decoder = self
            .decoders
            .get(&element.kind)
            .ok_or_else(|| IoError::UnknownKind(element.kind.clone()))?;
        decoder(element)
    }
}

/// Position of a vertex and of its neighbors on one surface.
pub(crate) struct Ring {
    pub pos: Point3,
    pub next: Point3,
    pub prev: Point3,
    pub next_id: VertexId,
    pub prev_id: VertexId,
}

/// Neighborhood of `v` on `s`, or `None` if `v` does not define `s`.
pub(crate) fn ring(mesh: &Mesh, s: SurfaceId, v: VertexId) -> Result<Option<Ring>> {
    let Some((next_id, prev_id)) = mesh.surface(s)?.neighbor_vertices(v) else {
        return Ok(None);
    };
    Ok(Some(Ring {
        pos: mesh.vertex(v)?.position(),
        next: mesh.vertex(next_id)?.position(),
        prev: mesh.vertex(prev_id)?.position(),
        next_id,
        prev_id,
    }))
}

/// Gradient of the area of surface `s` with respect to the position of `v`.
///
/// Accounts for the centroid moving with `v`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn surface_area_gradient(mesh: &Mesh, s: SurfaceId, v: VertexId) -> Result<Vector3> {
    let data = mesh.surface(s)?;
    let n = data.vertices().len();
    if !data.defined_by(v) {
        return Ok(Vector3::zeros());
    }
    let c = data.centroid();
    let inv_n = 1.0 / n as f64;
    let mut grad = Vector3::zeros();
    for i in 0..n {
        let vc = data.vertices()[i];
        let vn = data.vertices()[(i + 1) % n];
        let pc = mesh.vertex(vc)?.position();
        let pn = mesh.vertex(vn)?.position();
        let tri = crate::math::triangle_normal(&pc, &c, &pn);
        let len = tri.norm();
        if len < crate::math::TOLERANCE {
            continue;
        }
        let u = tri / len;
        let mut g = (pc - pn) * inv_n;
        if vc == v {
            g += pn - c;
        }
        if vn == v {
            g -= pc - c;
        }
        grad -= u.cross(&g);
    }
    Ok(grad / 2.0)
}

/// Gradient of the cone volume of surface `s` with respect to the position of `v`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn surface_volume_gradient(mesh: &Mesh, s: SurfaceId, v: VertexId) -> Result<Vector3> {
    let data = mesh.surface(s)?;
    let n = data.vertices().len();
    let Some(ring) = ring(mesh, s, v)? else {
        return Ok(Vector3::zeros());
    };
    let c = data.centroid().coords;
    let mut sum = Vector3::zeros();
    for i in 0..n {
        let a = mesh.vertex(data.vertices()[i])?.position().coords;
        let b = mesh.vertex(data.vertices()[(i + 1) % n])?.position().coords;
        sum += a.cross(&b);
    }
    Ok((sum / n as f64 + c.cross(&(ring.prev - ring.next))) / 6.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{self, numeric_gradient};
    use approx::assert_relative_eq;

    #[test]
    fn area_gradient_matches_finite_difference() {
        let mut fx = testing::box_grid(1, 1, 1);
        testing::jitter(&mut fx, 0.05);
        let s = fx.mesh.surface_ids()[0];
        let v = fx.mesh.surface(s).unwrap().vertices()[1];

        let analytic = surface_area_gradient(&fx.mesh, s, v).unwrap();
        let numeric = numeric_gradient(&mut fx, v, |m| m.surface(s).unwrap().area());
        assert_relative_eq!(analytic, numeric, epsilon = 1e-6);
    }

    #[test]
    fn volume_gradient_matches_finite_difference() {
        let mut fx = testing::box_grid(1, 1, 1);
        testing::jitter(&mut fx, 0.05);
        let s = fx.mesh.surface_ids()[2];
        let v = fx.mesh.surface(s).unwrap().vertices()[0];

        let analytic = surface_volume_gradient(&fx.mesh, s, v).unwrap();
        let numeric = numeric_gradient(&mut fx, v, |m| {
            m.surface(s).unwrap().geometry().volume_contribution
        });
        assert_relative_eq!(analytic, numeric, epsilon = 1e-6);
    }

    #[test]
    fn registry_rejects_unknown_actor() {
        let registry = ActorRegistry::with_builtins();
        let element = IoElement::new("NoSuchActor");
        assert!(registry.decode(&element).is_err());
    }

    #[test]
    fn builtin_round_trip_through_registry() {
        let registry = ActorRegistry::with_builtins();
        let actor = PerimeterConstraint::new(2.0, 3.5);
        let element = actor.to_element().unwrap();
        assert_eq!(element.kind, "PerimeterConstraint");
        let decoded = registry.decode(&element).unwrap();
        assert_eq!(decoded.name(), "PerimeterConstraint");
        assert_eq!(decoded.to_element().unwrap(), element);
    }
}
