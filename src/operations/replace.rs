use std::collections::HashSet;

use tracing::{debug, warn};

use super::MeshEditor;
use crate::error::{Result, TopologyError};
use crate::math::Point3;
use crate::topology::{
    BodyId, Mesh, MeshObj, SurfaceId, VertexId, MIN_BODY_SURFACES, MIN_SURFACE_VERTICES,
};

/// A surface whose run of shared vertices collapses onto the new vertex.
struct Reconnect {
    surface: SurfaceId,
    /// Position of the first run vertex, where the new vertex goes.
    index: usize,
    run: Vec<VertexId>,
}

fn plan_reconnect(
    mesh: &Mesh,
    surface: SurfaceId,
    shared: impl Fn(VertexId) -> bool,
) -> Result<Option<Reconnect>> {
    let data = mesh.surface(surface)?;
    let labels = data.contiguous_labels(shared);
    if labels.iter().any(|l| *l > 1) {
        warn!(?surface, "surface shares more than one contiguous run");
        return Err(TopologyError::invalid("non-contiguous shared boundary is not supported").into());
    }
    let Some(index) = labels.iter().position(|l| *l == 1) else {
        return Ok(None);
    };
    let run: Vec<VertexId> = data
        .vertices()
        .iter()
        .zip(&labels)
        .filter(|(_, l)| **l == 1)
        .map(|(v, _)| *v)
        .collect();
    if data.vertices().len() - run.len() + 1 < MIN_SURFACE_VERTICES {
        warn!(?surface, "replacement would leave a surface with too few vertices");
        return Err(TopologyError::invalid(
            "replacement would leave a surface with fewer than three vertices",
        )
        .into());
    }
    Ok(Some(Reconnect {
        surface,
        index,
        run,
    }))
}

/// Splices `u` into each planned surface and drops the collapsed runs.
/// Returns every vertex whose neighborhood changed.
fn apply_reconnect(
    editor: &mut MeshEditor<'_>,
    plans: &[Reconnect],
    u: VertexId,
) -> Result<Vec<VertexId>> {
    let mesh = editor.mesh_mut();
    let mut affected = vec![u];
    for plan in plans {
        mesh.insert_surface_vertex(plan.surface, plan.index, u)?;
        for v in &plan.run {
            mesh.remove_surface_vertex(plan.surface, *v)?;
        }
        affected.extend_from_slice(mesh.surface(plan.surface)?.vertices());
    }
    Ok(affected)
}

/// Removes every vertex in `candidates` that no longer defines a surface.
fn remove_orphans(editor: &mut MeshEditor<'_>, candidates: &[VertexId]) -> Result<()> {
    for v in candidates {
        let orphan = editor
            .mesh()
            .vertex(*v)
            .is_ok_and(|data| data.surfaces().is_empty());
        if orphan {
            editor.remove(MeshObj::Vertex(*v))?;
        }
    }
    Ok(())
}

/// Replaces a surface by a single vertex.
///
/// Every surface sharing vertices with the target has its shared run
/// replaced by the new vertex; the target surface and its vertices are then
/// destroyed.
pub struct ReplaceSurface {
    surface: SurfaceId,
    position: Point3,
}

impl ReplaceSurface {
    /// Creates a new `ReplaceSurface` operation.
    #[must_use]
    pub fn new(surface: SurfaceId, position: Point3) -> Self {
        Self { surface, position }
    }

    /// Executes the replacement and returns the new vertex.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidTopology`] if an adjoining body has
    /// fewer than five surfaces, a connected surface shares more than one
    /// contiguous run or would drop below three vertices. Nothing is changed
    /// on error.
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<VertexId> {
        let s = self.surface;
        let mesh = editor.mesh();
        let target = mesh.surface(s)?;
        let bodies: Vec<BodyId> = target.bodies().collect();
        for b in &bodies {
            if mesh.body(*b)?.surfaces().len() <= MIN_BODY_SURFACES {
                warn!(surface = ?s, body = ?b, "replacement would leave a body with too few surfaces");
                return Err(TopologyError::invalid(
                    "replacement would leave a body with fewer than four surfaces",
                )
                .into());
            }
        }
        let vertices = target.vertices().to_vec();
        let mut plans = Vec::new();
        for c in mesh.connected_surfaces(s)? {
            if let Some(plan) = plan_reconnect(mesh, c, |v| target.defined_by(v))? {
                plans.push(plan);
            }
        }

        let u = editor.create_vertex(self.position)?;
        let affected = apply_reconnect(editor, &plans, u)?;
        for b in &bodies {
            editor.mesh_mut().detach_body_surface(*b, s)?;
        }
        editor.log_operation("replace", &[MeshObj::Surface(s), MeshObj::Vertex(u)]);
        editor.remove(MeshObj::Surface(s))?;
        remove_orphans(editor, &vertices)?;
        editor.update_neighbors(&affected)?;

        debug!(surface = ?s, ?u, "replaced surface by vertex");
        editor.commit()?;
        Ok(u)
    }
}

/// Replaces a body by a single vertex.
///
/// Surfaces outside the body that touch it have their shared runs replaced
/// by the new vertex; the body, its surfaces and its vertices are then
/// destroyed.
pub struct ReplaceBody {
    body: BodyId,
    position: Point3,
}

impl ReplaceBody {
    /// Creates a new `ReplaceBody` operation.
    #[must_use]
    pub fn new(body: BodyId, position: Point3) -> Self {
        Self { body, position }
    }

    /// Executes the replacement and returns the new vertex.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidTopology`] if a neighboring body would
    /// keep fewer than four surfaces or a touching surface cannot be
    /// reconnected. Nothing is changed on error.
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<VertexId> {
        let b = self.body;
        let mesh = editor.mesh();
        let surfaces = mesh.body(b)?.surfaces().to_vec();
        let vertices = mesh.body_vertices(b)?;
        let vertex_set: HashSet<VertexId> = vertices.iter().copied().collect();

        for nb in mesh.body_neighbor_bodies(b)? {
            let own = mesh.body(nb)?.surfaces();
            let shared = own.iter().filter(|s| surfaces.contains(s)).count();
            if own.len() - shared < MIN_BODY_SURFACES {
                warn!(body = ?b, neighbor = ?nb, "replacement would leave a neighbor with too few surfaces");
                return Err(TopologyError::invalid(
                    "replacement would leave a neighboring body with fewer than four surfaces",
                )
                .into());
            }
        }

        let mut touching = Vec::new();
        for v in &vertices {
            for s in mesh.vertex(*v)?.surfaces() {
                if !surfaces.contains(s) && !touching.contains(s) {
                    touching.push(*s);
                }
            }
        }
        let mut plans = Vec::new();
        for c in touching {
            if let Some(plan) = plan_reconnect(mesh, c, |v| vertex_set.contains(&v))? {
                plans.push(plan);
            }
        }
        let mut detach = Vec::new();
        for s in &surfaces {
            if let Some(other) = mesh.surface(*s)?.other_body(b) {
                detach.push((other, *s));
            }
        }

        let u = editor.create_vertex(self.position)?;
        let affected = apply_reconnect(editor, &plans, u)?;
        for (other, s) in detach {
            editor.mesh_mut().detach_body_surface(other, s)?;
        }
        editor.log_operation("replace", &[MeshObj::Body(b), MeshObj::Vertex(u)]);
        editor.remove(MeshObj::Body(b))?;
        for s in &surfaces {
            if editor.mesh().contains_surface(*s) {
                editor.remove(MeshObj::Surface(*s))?;
            }
        }
        remove_orphans(editor, &vertices)?;
        editor.update_neighbors(&affected)?;

        debug!(body = ?b, ?u, "replaced body by vertex");
        editor.commit()?;
        Ok(u)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::MeshError;
    use crate::testing::{self, p};
    use crate::types::{BodyTypeId, SurfaceTypeId};
    use approx::assert_relative_eq;

    fn top_face(fx: &testing::Fixture) -> SurfaceId {
        *fx.surfaces
            .iter()
            .find(|s| fx.mesh.surface(**s).unwrap().centroid().z > 0.99)
            .unwrap()
    }

    #[test]
    fn cube_top_becomes_pyramid_apex() {
        let mut fx = testing::box_grid(1, 1, 1);
        let s = top_face(&fx);
        let u = ReplaceSurface::new(s, p(0.5, 0.5, 1.0))
            .execute(&mut fx.editor())
            .unwrap();

        fx.mesh.validate().unwrap();
        assert_eq!(fx.mesh.num_surfaces(), 5);
        assert_eq!(fx.mesh.num_vertices(), 5);
        assert_eq!(fx.mesh.vertex(u).unwrap().surfaces().len(), 4);
        assert_eq!(fx.mesh.vertex(u).unwrap().neighbors().len(), 4);
        assert_relative_eq!(fx.mesh.body(fx.body).unwrap().volume(), 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(fx.log.events().last().unwrap().name, "replace");
    }

    #[test]
    fn tetrahedron_surface_cannot_be_replaced() {
        let mut fx = testing::tetrahedron();
        let before = testing::geometry_fingerprint(&fx.mesh);
        let particles = fx.engine.len();
        let result = ReplaceSurface::new(fx.surfaces[0], p(0.3, 0.3, 0.0)).execute(&mut fx.editor());

        assert!(matches!(
            result,
            Err(MeshError::Topology(TopologyError::InvalidTopology(_)))
        ));
        assert_eq!(fx.mesh.num_surfaces(), 4);
        assert_eq!(fx.engine.len(), particles);
        assert_eq!(testing::geometry_fingerprint(&fx.mesh), before);
    }

    #[test]
    fn body_replacement_leaves_neighbor_pyramid() {
        let mut fx = testing::box_grid(2, 1, 1);
        let [a, b] = fx.bodies[..] else {
            panic!("expected two bodies");
        };
        let u = ReplaceBody::new(a, p(0.5, 0.5, 0.5))
            .execute(&mut fx.editor())
            .unwrap();

        fx.mesh.validate().unwrap();
        assert!(!fx.mesh.contains_body(a));
        assert_eq!(fx.mesh.num_bodies(), 1);
        assert_eq!(fx.mesh.body(b).unwrap().surfaces().len(), 5);
        assert_eq!(fx.mesh.num_surfaces(), 5);
        assert_eq!(fx.mesh.num_vertices(), 5);
        assert_eq!(fx.mesh.vertex(u).unwrap().surfaces().len(), 4);
        // Unit base at x = 2, apex 1.5 away.
        assert_relative_eq!(fx.mesh.body(b).unwrap().volume(), 0.5, epsilon = 1e-12);
        assert_eq!(fx.engine.len(), 5);
    }

    #[test]
    fn body_replacement_guards_small_neighbors() {
        let mut fx = testing::tetrahedron();
        // Second tetrahedron glued onto the face opposite the origin.
        let apex = testing::vertex(&mut fx.mesh, &mut fx.engine, p(1.0, 1.0, 1.0));
        let shared = *fx
            .surfaces
            .iter()
            .find(|s| !fx.mesh.surface(**s).unwrap().defined_by(fx.vertices[0]))
            .unwrap();
        let [_, v1, v2, v3] = fx.vertices[..] else {
            panic!("expected four vertices");
        };
        let mut faces = vec![shared];
        for (x, y) in [(v1, v2), (v2, v3), (v3, v1)] {
            faces.push(fx.mesh.create_surface(SurfaceTypeId(0), &[x, y, apex]).unwrap());
        }
        let other = fx.mesh.create_body(BodyTypeId(0), 1.0, &faces).unwrap();
        fx.mesh.position_changed(&mut fx.engine).unwrap();

        let result = ReplaceBody::new(fx.body, p(0.2, 0.2, 0.2)).execute(&mut fx.editor());
        assert!(result.is_err());
        assert!(fx.mesh.contains_body(fx.body));
        assert!(fx.mesh.contains_body(other));
        fx.mesh.validate().unwrap();
    }
}
