use crate::error::{OperationError, Result};
use crate::math::{Point3, Vector3};
use crate::operations::MeshEditor;
use crate::types::SurfaceTypeId;

use super::MeshBuild;

/// Creates a flat sheet of `nx` by `ny` square surfaces in the xy plane.
///
/// Vertex `(i, j)` is at index `i + j * (nx + 1)`; surface `(i, j)` is at
/// index `i + j * nx` and runs counter-clockwise seen from +z.
pub struct MakeQuadGrid {
    surface_type: SurfaceTypeId,
    nx: usize,
    ny: usize,
    origin: Point3,
    spacing: f64,
}

impl MakeQuadGrid {
    /// Creates a new `MakeQuadGrid` operation with unit spacing at the origin.
    #[must_use]
    pub fn new(surface_type: SurfaceTypeId, nx: usize, ny: usize) -> Self {
        Self {
            surface_type,
            nx,
            ny,
            origin: Point3::origin(),
            spacing: 1.0,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: Point3) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }

    /// Executes the operation.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] for an empty grid and
    /// allocation failures.
    #[allow(clippy::cast_precision_loss)]
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<MeshBuild> {
        let (nx, ny) = (self.nx, self.ny);
        if nx == 0 || ny == 0 {
            return Err(OperationError::InvalidInput("grid needs at least one cell per axis".into()).into());
        }
        let mesh = editor.mesh_mut();
        mesh.ensure_available_vertices((nx + 1) * (ny + 1))?;
        mesh.ensure_available_surfaces(nx * ny)?;

        let mut build = MeshBuild::default();
        for j in 0..=ny {
            for i in 0..=nx {
                let offset = Vector3::new(i as f64, j as f64, 0.0) * self.spacing;
                build.vertices.push(editor.create_vertex(self.origin + offset)?);
            }
        }
        let at = |i: usize, j: usize| build.vertices[i + j * (nx + 1)];
        let mut surfaces = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                let loop_ = [at(i, j), at(i + 1, j), at(i + 1, j + 1), at(i, j + 1)];
                surfaces.push(editor.create_surface(self.surface_type, &loop_)?);
            }
        }
        build.surfaces = surfaces;
        editor.commit()?;
        Ok(build)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing;
    use approx::assert_relative_eq;

    #[test]
    fn sheet_counts_and_orientation() {
        let fx = testing::quad_grid(3, 2);
        assert_eq!(fx.vertices.len(), 12);
        assert_eq!(fx.surfaces.len(), 6);
        for s in &fx.surfaces {
            let data = fx.mesh.surface(*s).unwrap();
            assert_relative_eq!(data.area(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(data.normal(), Vector3::z(), epsilon = 1e-12);
        }
        // Interior vertex of a 3x2 sheet touches four quads.
        let v = fx.vertices[1 + 4];
        assert_eq!(fx.mesh.vertex(v).unwrap().surfaces().len(), 4);
    }

    #[test]
    fn empty_grid_is_rejected() {
        let mut fx = testing::quad_grid(1, 1);
        let result = MakeQuadGrid::new(SurfaceTypeId(0), 0, 3).execute(&mut fx.editor());
        assert!(result.is_err());
    }
}
