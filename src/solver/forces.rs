use crate::actors::{Actor, ActorContext};
use crate::error::Result;
use crate::math::Vector3;
use crate::topology::{MeshObj, VertexId};

/// Calls `visit` for every actor acting on `v`, with the object it is
/// attached through.
///
/// Surfaces of `v` come first, then bodies, then structures. For each object
/// the actors of its type precede its own. Type ids with no registered type
/// contribute no actors.
fn for_each_actor<F>(ctx: &ActorContext<'_>, v: VertexId, mut visit: F) -> Result<()>
where
    F: FnMut(&dyn Actor, MeshObj) -> Result<()>,
{
    let mesh = ctx.mesh;

    for s in mesh.vertex(v)?.surfaces() {
        let data = mesh.surface(*s)?;
        let source = MeshObj::from(*s);
        if let Ok(ty) = ctx.types.surface_type(data.type_id()) {
            for actor in &ty.actors {
                visit(actor.as_ref(), source)?;
            }
        }
        for actor in &data.actors {
            visit(actor.as_ref(), source)?;
        }
    }

    for b in mesh.vertex_bodies(v)? {
        let data = mesh.body(b)?;
        let source = MeshObj::from(b);
        if let Ok(ty) = ctx.types.body_type(data.type_id()) {
            for actor in &ty.actors {
                visit(actor.as_ref(), source)?;
            }
        }
        for actor in &data.actors {
            visit(actor.as_ref(), source)?;
        }
    }

    for st in mesh.vertex_structures(v)? {
        let data = mesh.structure(st)?;
        let source = MeshObj::from(st);
        if let Ok(ty) = ctx.types.structure_type(data.type_id()) {
            for actor in &ty.actors {
                visit(actor.as_ref(), source)?;
            }
        }
        for actor in &data.actors {
            visit(actor.as_ref(), source)?;
        }
    }

    Ok(())
}

/// Total force on `v`.
///
/// # Errors
///
/// Returns an error if `v` or an object it belongs to is not live.
pub fn vertex_force(ctx: &ActorContext<'_>, v: VertexId) -> Result<Vector3> {
    let mut total = Vector3::zeros();
    for_each_actor(ctx, v, |actor, source| {
        total += actor.force(ctx, source, v)?;
        Ok(())
    })?;
    Ok(total)
}

/// Total energy acting on `v`.
///
/// # Errors
///
/// Returns an error if `v` or an object it belongs to is not live.
pub fn vertex_energy(ctx: &ActorContext<'_>, v: VertexId) -> Result<f64> {
    let mut total = 0.0;
    for_each_actor(ctx, v, |actor, source| {
        total += actor.energy(ctx, source, v)?;
        Ok(())
    })?;
    Ok(total)
}
