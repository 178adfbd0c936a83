use tracing::debug;

use super::MeshEditor;
use crate::error::{Result, TopologyError};
use crate::math::{CutPlane, Vector3};
use crate::topology::{Mesh, MeshObj, SurfaceId, VertexId};

/// Partition of a vertex's neighbors by the split cut plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPlan {
    /// Neighbors that stay connected to the original vertex.
    pub old_side: Vec<VertexId>,
    /// Neighbors that connect to the new vertex.
    pub new_side: Vec<VertexId>,
}

/// Splits a vertex in two along a separation vector.
///
/// The cut plane passes through the vertex and is orthogonal to the
/// separation. Neighbors on its positive side (or on it) move to the new
/// vertex, which is placed half a separation ahead of the old position;
/// the original vertex moves half a separation back.
pub struct SplitVertex {
    vertex: VertexId,
    separation: Vector3,
}

/// How a surface of the split vertex is rewired.
enum Rewire {
    /// Only new-side neighbors: the new vertex takes the old one's place.
    Replace(SurfaceId),
    /// Both sides: the new vertex is spliced in at `index`.
    Insert(SurfaceId, usize),
}

impl SplitVertex {
    /// Creates a new `SplitVertex` operation.
    #[must_use]
    pub fn new(vertex: VertexId, separation: Vector3) -> Self {
        Self { vertex, separation }
    }

    /// Partitions the neighbors of the vertex without mutating anything.
    ///
    /// Returns `Ok(None)` when every neighbor falls on one side of the plane.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GeometryError::ZeroVector`] for a zero
    /// separation, and [`TopologyError::InvalidTopology`] if the vertex
    /// defines no surface.
    pub fn plan(&self, mesh: &Mesh) -> Result<Option<SplitPlan>> {
        let data = mesh.vertex(self.vertex)?;
        let plane = CutPlane::from_point_normal(&data.position(), &self.separation)?;
        if data.surfaces().is_empty() || data.neighbors().is_empty() {
            return Err(TopologyError::invalid("split vertex must define a surface").into());
        }

        let mut plan = SplitPlan {
            old_side: Vec::new(),
            new_side: Vec::new(),
        };
        for n in data.neighbors() {
            if plane.is_positive_side(&mesh.vertex(*n)?.position()) {
                plan.new_side.push(*n);
            } else {
                plan.old_side.push(*n);
            }
        }
        if plan.old_side.is_empty() || plan.new_side.is_empty() {
            debug!(vertex = ?self.vertex, "no neighbors on one side of the cut plane");
            return Ok(None);
        }
        Ok(Some(plan))
    }

    fn rewiring(&self, mesh: &Mesh, plan: &SplitPlan) -> Result<Vec<Rewire>> {
        let v = self.vertex;
        let mut result = Vec::new();
        for s in mesh.vertex(v)?.surfaces() {
            let data = mesh.surface(*s)?;
            let (next, prev) = data
                .neighbor_vertices(v)
                .ok_or_else(|| TopologyError::invalid("vertex lists a surface it does not define"))?;
            let next_new = plan.new_side.contains(&next);
            let prev_new = plan.new_side.contains(&prev);
            let index = data
                .vertices()
                .iter()
                .position(|x| *x == v)
                .unwrap_or_default();
            match (next_new, prev_new) {
                (true, true) => result.push(Rewire::Replace(*s)),
                (true, false) => result.push(Rewire::Insert(*s, index + 1)),
                (false, true) => result.push(Rewire::Insert(*s, index)),
                (false, false) => {}
            }
        }
        Ok(result)
    }

    /// Executes the split.
    ///
    /// Returns the new vertex, or `None` if the plane does not separate the
    /// neighbors (nothing is changed).
    ///
    /// # Errors
    ///
    /// See [`SplitVertex::plan`]. Allocation failures are reported before
    /// any mutation.
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<Option<VertexId>> {
        let Some(plan) = self.plan(editor.mesh())? else {
            return Ok(None);
        };
        let rewiring = self.rewiring(editor.mesh(), &plan)?;
        let v = self.vertex;
        let position = editor.mesh().vertex(v)?.position();
        let half = self.separation * 0.5;

        let u = editor.create_vertex(position + half)?;
        editor.set_position(v, position - half)?;

        let mesh = editor.mesh_mut();
        for rewire in rewiring {
            match rewire {
                Rewire::Replace(s) => mesh.replace_surface_vertex(s, v, u)?,
                Rewire::Insert(s, index) => mesh.insert_surface_vertex(s, index, u)?,
            }
        }

        let mut affected = vec![v, u];
        affected.extend(plan.old_side.iter().chain(&plan.new_side));
        editor.update_neighbors(&affected)?;

        debug!(?v, ?u, "split vertex");
        editor.log_operation("split", &[MeshObj::Vertex(v), MeshObj::Vertex(u)]);
        editor.commit()?;
        Ok(Some(u))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{GeometryError, MeshError};
    use crate::operations::MergeVertices;
    use crate::testing::{self, p};
    use approx::assert_relative_eq;

    fn center(fx: &testing::Fixture) -> VertexId {
        fx.mesh.find_vertex(&p(1.0, 1.0, 0.0), 1e-9).unwrap()
    }

    #[test]
    fn plan_partitions_neighbors() {
        let fx = testing::quad_grid(2, 2);
        let v = center(&fx);
        let plan = SplitVertex::new(v, Vector3::new(0.2, 0.1, 0.0))
            .plan(&fx.mesh)
            .unwrap()
            .unwrap();

        let at = |x, y| fx.mesh.find_vertex(&p(x, y, 0.0), 1e-9).unwrap();
        assert_eq!(plan.new_side.len(), 2);
        assert!(plan.new_side.contains(&at(2.0, 1.0)));
        assert!(plan.new_side.contains(&at(1.0, 2.0)));
        assert!(plan.old_side.contains(&at(0.0, 1.0)));
        assert!(plan.old_side.contains(&at(1.0, 0.0)));
    }

    #[test]
    fn split_creates_edge_between_vertices() {
        let mut fx = testing::quad_grid(2, 2);
        let v = center(&fx);
        let u = SplitVertex::new(v, Vector3::new(0.2, 0.1, 0.0))
            .execute(&mut fx.editor())
            .unwrap()
            .unwrap();

        fx.mesh.validate().unwrap();
        assert_eq!(fx.mesh.num_vertices(), 10);
        assert_relative_eq!(fx.mesh.vertex(u).unwrap().position(), p(1.1, 1.05, 0.0));
        assert_relative_eq!(fx.mesh.vertex(v).unwrap().position(), p(0.9, 0.95, 0.0));
        assert!(fx.mesh.connected(MeshObj::Vertex(u), MeshObj::Vertex(v)).unwrap());
        assert_eq!(fx.mesh.vertex(u).unwrap().surfaces().len(), 3);
        assert_eq!(fx.mesh.vertex(v).unwrap().surfaces().len(), 3);
        assert_eq!(fx.mesh.shared_surfaces(u, v).unwrap().len(), 2);
        // Total sheet area is unchanged by an in-plane split.
        let area: f64 = fx.surfaces.iter().map(|s| fx.mesh.surface(*s).unwrap().area()).sum();
        assert_relative_eq!(area, 4.0, epsilon = 1e-12);
        assert_eq!(fx.log.events().last().unwrap().name, "split");
    }

    #[test]
    fn one_sided_split_is_a_no_op() {
        let mut fx = testing::quad_grid(2, 2);
        let corner = fx.vertices[0];
        let before = testing::geometry_fingerprint(&fx.mesh);
        // Every neighbor of the origin corner lies ahead of this plane.
        let result = SplitVertex::new(corner, Vector3::new(1.0, 1.0, 0.0))
            .execute(&mut fx.editor())
            .unwrap();
        assert!(result.is_none());
        assert_eq!(testing::geometry_fingerprint(&fx.mesh), before);
        assert_eq!(fx.mesh.num_vertices(), 9);
    }

    #[test]
    fn zero_separation_is_rejected() {
        let mut fx = testing::quad_grid(2, 2);
        let v = center(&fx);
        let result = SplitVertex::new(v, Vector3::zeros()).execute(&mut fx.editor());
        assert!(matches!(
            result,
            Err(MeshError::Geometry(GeometryError::ZeroVector))
        ));
    }

    #[test]
    fn lone_vertex_cannot_split() {
        let mut fx = testing::quad_grid(1, 1);
        let lone = testing::vertex(&mut fx.mesh, &mut fx.engine, p(5.0, 5.0, 0.0));
        let result = SplitVertex::new(lone, Vector3::x()).plan(&fx.mesh);
        assert!(matches!(
            result,
            Err(MeshError::Topology(TopologyError::InvalidTopology(_)))
        ));
    }

    #[test]
    fn split_then_merge_restores_vertex() {
        let mut fx = testing::quad_grid(2, 2);
        let v = center(&fx);
        let before = testing::geometry_fingerprint(&fx.mesh);
        let surfaces_before: Vec<Vec<VertexId>> = fx
            .surfaces
            .iter()
            .map(|s| fx.mesh.surface(*s).unwrap().vertices().to_vec())
            .collect();

        let u = SplitVertex::new(v, Vector3::new(0.2, 0.1, 0.0))
            .execute(&mut fx.editor())
            .unwrap()
            .unwrap();
        MergeVertices::new(v, u, 0.5).execute(&mut fx.editor()).unwrap();

        fx.mesh.validate().unwrap();
        assert!(!fx.mesh.contains_vertex(u));
        assert_eq!(fx.mesh.num_vertices(), 9);
        let after = testing::geometry_fingerprint(&fx.mesh);
        for (a, b) in before.iter().zip(&after) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        for (s, vertices) in fx.surfaces.iter().zip(&surfaces_before) {
            assert_eq!(fx.mesh.surface(*s).unwrap().vertices(), &vertices[..]);
        }
    }
}
