use crate::error::{Result, TopologyError};
use crate::math::Point3;
use crate::operations::MeshEditor;
use crate::topology::{SurfaceId, VertexId, MIN_SURFACE_VERTICES};
use crate::types::SurfaceTypeId;

/// Default distance within which [`MakeSurface::from_positions`] reuses an
/// existing vertex.
pub const DEFAULT_REUSE_TOLERANCE: f64 = 1e-4;

enum Corners {
    Vertices(Vec<VertexId>),
    Positions(Vec<Point3>),
}

/// Creates a surface from an ordered loop of vertices or positions.
pub struct MakeSurface {
    type_id: SurfaceTypeId,
    corners: Corners,
    tolerance: f64,
}

impl MakeSurface {
    /// Surface over existing vertices.
    #[must_use]
    pub fn from_vertices(type_id: SurfaceTypeId, vertices: Vec<VertexId>) -> Self {
        Self {
            type_id,
            corners: Corners::Vertices(vertices),
            tolerance: DEFAULT_REUSE_TOLERANCE,
        }
    }

    /// Surface over positions. A vertex already within the reuse tolerance of
    /// a position is used instead of creating a new one.
    #[must_use]
    pub fn from_positions(type_id: SurfaceTypeId, positions: Vec<Point3>) -> Self {
        Self {
            type_id,
            corners: Corners::Positions(positions),
            tolerance: DEFAULT_REUSE_TOLERANCE,
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Executes the operation, creating the surface in the editor's mesh.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidTopology`] for fewer than three
    /// corners or repeated corners, and allocation failures.
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<SurfaceId> {
        let vertices = match &self.corners {
            Corners::Vertices(vertices) => vertices.clone(),
            Corners::Positions(positions) => {
                if positions.len() < MIN_SURFACE_VERTICES {
                    return Err(TopologyError::invalid("surface requires at least three positions").into());
                }
                for (i, a) in positions.iter().enumerate() {
                    if positions[..i].iter().any(|b| (a - b).norm() <= self.tolerance) {
                        return Err(TopologyError::invalid("surface positions coincide").into());
                    }
                }
                editor.mesh_mut().ensure_available_vertices(positions.len())?;
                let mut vertices = Vec::with_capacity(positions.len());
                for pos in positions {
                    let v = match editor.mesh().find_vertex(pos, self.tolerance) {
                        Some(v) => v,
                        None => editor.create_vertex(*pos)?,
                    };
                    vertices.push(v);
                }
                vertices
            }
        };
        editor.create_surface(self.type_id, &vertices)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{self, p};
    use approx::assert_relative_eq;

    #[test]
    fn positions_reuse_nearby_vertices() {
        let mut fx = testing::quad_grid(1, 1);
        let s = MakeSurface::from_positions(
            SurfaceTypeId(0),
            vec![p(1.0, 0.0, 0.0), p(2.0, 0.0, 0.0), p(1.0, 1.0, 0.0)],
        )
        .execute(&mut fx.editor())
        .unwrap();

        assert_eq!(fx.mesh.num_vertices(), 5);
        assert_relative_eq!(fx.mesh.surface(s).unwrap().area(), 0.5, epsilon = 1e-12);
        assert_eq!(fx.mesh.shared_surfaces(fx.vertices[1], fx.vertices[3]).unwrap().len(), 2);
    }

    #[test]
    fn coincident_positions_are_rejected() {
        let mut fx = testing::quad_grid(1, 1);
        let result = MakeSurface::from_positions(
            SurfaceTypeId(0),
            vec![p(3.0, 0.0, 0.0), p(3.0, 0.0, 0.0), p(4.0, 1.0, 0.0)],
        )
        .execute(&mut fx.editor());
        assert!(result.is_err());
        assert_eq!(fx.mesh.num_vertices(), 4);
    }
}
