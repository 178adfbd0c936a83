use tracing::{debug, warn};

use super::MeshEditor;
use crate::error::{OperationError, Result, TopologyError};
use crate::math::Point3;
use crate::topology::{Mesh, MeshObj, VertexId};

/// Vertex spliced in by [`InsertVertex`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InsertTarget {
    /// An existing vertex, typically unattached.
    Existing(VertexId),
    /// A vertex created at this position once validation passes.
    New(Point3),
}

/// Splices a vertex into every surface where given vertex pairs are adjacent.
pub struct InsertVertex {
    target: InsertTarget,
    pairs: Vec<(VertexId, VertexId)>,
}

impl InsertVertex {
    /// Inserts `v` between `v1` and `v2`.
    #[must_use]
    pub fn between(v: VertexId, v1: VertexId, v2: VertexId) -> Self {
        Self {
            target: InsertTarget::Existing(v),
            pairs: vec![(v1, v2)],
        }
    }

    /// Creates a vertex at `position` and inserts it between `v1` and `v2`.
    #[must_use]
    pub fn new_between(position: Point3, v1: VertexId, v2: VertexId) -> Self {
        Self {
            target: InsertTarget::New(position),
            pairs: vec![(v1, v2)],
        }
    }

    /// Inserts `v` between `vf` and each vertex of `neighbors`.
    #[must_use]
    pub fn fan(v: VertexId, vf: VertexId, neighbors: &[VertexId]) -> Self {
        Self {
            target: InsertTarget::Existing(v),
            pairs: neighbors.iter().map(|n| (vf, *n)).collect(),
        }
    }

    /// Creates a vertex at `position` and inserts it between `vf` and each
    /// vertex of `neighbors`.
    #[must_use]
    pub fn new_fan(position: Point3, vf: VertexId, neighbors: &[VertexId]) -> Self {
        Self {
            target: InsertTarget::New(position),
            pairs: neighbors.iter().map(|n| (vf, *n)).collect(),
        }
    }

    fn validate(&self, mesh: &Mesh) -> Result<()> {
        if self.pairs.is_empty() {
            return Err(OperationError::InvalidInput("no vertex pairs to insert between".into()).into());
        }
        let existing = match self.target {
            InsertTarget::Existing(v) => {
                mesh.vertex(v)?;
                Some(v)
            }
            InsertTarget::New(_) => None,
        };
        for (v1, v2) in &self.pairs {
            if v1 == v2 || existing.is_some_and(|v| v == *v1 || v == *v2) {
                return Err(OperationError::InvalidInput("degenerate insertion pair".into()).into());
            }
            mesh.vertex(*v2)?;
            let mut found = false;
            for s in mesh.vertex(*v1)?.surfaces() {
                let data = mesh.surface(*s)?;
                if data.are_adjacent(*v1, *v2) && existing.is_none_or(|v| !data.defined_by(v)) {
                    found = true;
                    break;
                }
            }
            if !found {
                warn!(?v1, ?v2, "insertion pair is not an edge of any surface");
                return Err(TopologyError::invalid("vertices are not adjacent in any surface").into());
            }
        }
        Ok(())
    }

    /// Executes the insertion.
    ///
    /// Returns the inserted vertex and the number of surfaces it was
    /// spliced into.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidTopology`] if a pair is not an edge
    /// of some surface. Nothing is created or changed on error.
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<(VertexId, usize)> {
        self.validate(editor.mesh())?;
        let v = match self.target {
            InsertTarget::Existing(v) => v,
            InsertTarget::New(position) => editor.create_vertex(position)?,
        };

        let mut inserted = 0;
        let mut affected = vec![v];
        for (v1, v2) in &self.pairs {
            let surfaces = editor.mesh().vertex(*v1)?.surfaces().to_vec();
            for s in surfaces {
                let data = editor.mesh().surface(s)?;
                if data.defined_by(v) {
                    continue;
                }
                let vertices = data.vertices();
                let n = vertices.len();
                let slot = (0..n).find(|i| {
                    let (a, b) = (vertices[*i], vertices[(i + 1) % n]);
                    (a == *v1 && b == *v2) || (a == *v2 && b == *v1)
                });
                if let Some(i) = slot {
                    editor.mesh_mut().insert_surface_vertex(s, i + 1, v)?;
                    inserted += 1;
                }
            }
            affected.extend([*v1, *v2]);
        }
        editor.update_neighbors(&affected)?;

        debug!(?v, inserted, "inserted vertex");
        let objs: Vec<MeshObj> = affected.iter().map(|x| MeshObj::Vertex(*x)).collect();
        editor.log_operation("insert", &objs);
        editor.commit()?;
        Ok((v, inserted))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::MeshError;
    use crate::testing::{self, p};
    use approx::assert_relative_eq;

    #[test]
    fn fan_insert_on_tetrahedron_edge() {
        let mut fx = testing::tetrahedron();
        let (v0, v1) = (fx.vertices[0], fx.vertices[1]);
        let (v, count) = InsertVertex::new_fan(p(0.5, 0.0, 0.0), v0, &[v1])
            .execute(&mut fx.editor())
            .unwrap();

        assert_eq!(count, 2);
        fx.mesh.validate().unwrap();
        for s in &fx.surfaces {
            let data = fx.mesh.surface(*s).unwrap();
            let on_edge = data.defined_by(v0) && data.defined_by(v1);
            assert_eq!(data.vertices().len(), if on_edge { 4 } else { 3 });
            if on_edge {
                assert!(data.are_adjacent(v0, v) && data.are_adjacent(v, v1));
                assert!(!data.are_adjacent(v0, v1));
            }
        }
        let neighbors = fx.mesh.vertex(v).unwrap().neighbors();
        assert_eq!(neighbors.len(), 2);
        assert_relative_eq!(
            fx.mesh.body(fx.body).unwrap().volume(),
            1.0 / 6.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn existing_vertex_between_pair() {
        let mut fx = testing::quad_grid(2, 1);
        let a = fx.mesh.find_vertex(&p(1.0, 0.0, 0.0), 1e-9).unwrap();
        let b = fx.mesh.find_vertex(&p(1.0, 1.0, 0.0), 1e-9).unwrap();
        let v = fx.editor().create_vertex(p(1.0, 0.5, 0.0)).unwrap();

        let (_, count) = InsertVertex::between(v, a, b).execute(&mut fx.editor()).unwrap();

        assert_eq!(count, 2);
        assert!(fx.mesh.connected(MeshObj::Vertex(v), MeshObj::Vertex(a)).unwrap());
        assert!(!fx.mesh.connected(MeshObj::Vertex(a), MeshObj::Vertex(b)).unwrap());
        fx.mesh.validate().unwrap();
    }

    #[test]
    fn non_adjacent_pair_creates_nothing() {
        let mut fx = testing::quad_grid(1, 1);
        let (a, c) = (fx.vertices[0], fx.vertices[3]);
        let particles = fx.engine.len();
        let result = InsertVertex::new_between(p(0.5, 0.5, 0.0), a, c).execute(&mut fx.editor());

        assert!(matches!(
            result,
            Err(MeshError::Topology(TopologyError::InvalidTopology(_)))
        ));
        assert_eq!(fx.mesh.num_vertices(), 4);
        assert_eq!(fx.engine.len(), particles);
    }
}
