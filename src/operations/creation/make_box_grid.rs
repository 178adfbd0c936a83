use std::collections::HashMap;

use crate::error::{OperationError, Result};
use crate::math::{Point3, Vector3};
use crate::operations::MeshEditor;
use crate::topology::{SurfaceId, VertexId};
use crate::types::{BodyTypeId, SurfaceTypeId};

use super::MeshBuild;

/// Creates an `nx` by `ny` by `nz` block of unit-cube bodies.
///
/// Neighboring cubes share their interface surface. Vertex `(i, j, k)` is at
/// index `i + (nx + 1) * (j + (ny + 1) * k)`; bodies are ordered with `i`
/// varying fastest. Each body lists its faces as `-x, +x, -y, +y, -z, +z`.
pub struct MakeBoxGrid {
    surface_type: SurfaceTypeId,
    body_type: BodyTypeId,
    cells: [usize; 3],
    origin: Point3,
    spacing: f64,
    density: f64,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Axis {
    X,
    Y,
    Z,
}

/// Grid faces keyed by normal axis and lower corner, created on first use.
struct FaceCache {
    surface_type: SurfaceTypeId,
    vertices: Vec<VertexId>,
    nx: usize,
    ny: usize,
    created: HashMap<(Axis, usize, usize, usize), SurfaceId>,
}

impl FaceCache {
    fn at(&self, i: usize, j: usize, k: usize) -> VertexId {
        self.vertices[i + (self.nx + 1) * (j + (self.ny + 1) * k)]
    }

    fn get(
        &mut self,
        editor: &mut MeshEditor<'_>,
        build: &mut MeshBuild,
        axis: Axis,
        (i, j, k): (usize, usize, usize),
    ) -> Result<SurfaceId> {
        if let Some(s) = self.created.get(&(axis, i, j, k)) {
            return Ok(*s);
        }
        let corners = match axis {
            Axis::X => [
                self.at(i, j, k),
                self.at(i, j + 1, k),
                self.at(i, j + 1, k + 1),
                self.at(i, j, k + 1),
            ],
            Axis::Y => [
                self.at(i, j, k),
                self.at(i, j, k + 1),
                self.at(i + 1, j, k + 1),
                self.at(i + 1, j, k),
            ],
            Axis::Z => [
                self.at(i, j, k),
                self.at(i + 1, j, k),
                self.at(i + 1, j + 1, k),
                self.at(i, j + 1, k),
            ],
        };
        let s = editor.create_surface(self.surface_type, &corners)?;
        self.created.insert((axis, i, j, k), s);
        build.surfaces.push(s);
        Ok(s)
    }
}

impl MakeBoxGrid {
    /// Creates a new `MakeBoxGrid` operation with unit spacing at the origin.
    #[must_use]
    pub fn new(
        surface_type: SurfaceTypeId,
        body_type: BodyTypeId,
        nx: usize,
        ny: usize,
        nz: usize,
    ) -> Self {
        Self {
            surface_type,
            body_type,
            cells: [nx, ny, nz],
            origin: Point3::origin(),
            spacing: 1.0,
            density: 1.0,
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

    #[must_use]
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
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
        let [nx, ny, nz] = self.cells;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(OperationError::InvalidInput("grid needs at least one cell per axis".into()).into());
        }
        let face_count = (nx + 1) * ny * nz + nx * (ny + 1) * nz + nx * ny * (nz + 1);
        let mesh = editor.mesh_mut();
        mesh.ensure_available_vertices((nx + 1) * (ny + 1) * (nz + 1))?;
        mesh.ensure_available_surfaces(face_count)?;
        mesh.ensure_available_bodies(nx * ny * nz)?;

        let mut build = MeshBuild::default();
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    let offset = Vector3::new(i as f64, j as f64, k as f64) * self.spacing;
                    build.vertices.push(editor.create_vertex(self.origin + offset)?);
                }
            }
        }
        let mut faces = FaceCache {
            surface_type: self.surface_type,
            vertices: build.vertices.clone(),
            nx,
            ny,
            created: HashMap::new(),
        };
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let cell = [
                        faces.get(editor, &mut build, Axis::X, (i, j, k))?,
                        faces.get(editor, &mut build, Axis::X, (i + 1, j, k))?,
                        faces.get(editor, &mut build, Axis::Y, (i, j, k))?,
                        faces.get(editor, &mut build, Axis::Y, (i, j + 1, k))?,
                        faces.get(editor, &mut build, Axis::Z, (i, j, k))?,
                        faces.get(editor, &mut build, Axis::Z, (i, j, k + 1))?,
                    ];
                    let b = editor.create_body(self.body_type, self.density, &cell)?;
                    build.bodies.push(b);
                }
            }
        }
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
    fn block_shares_interfaces() {
        let fx = testing::box_grid(2, 2, 1);
        assert_eq!(fx.vertices.len(), 18);
        assert_eq!(fx.bodies.len(), 4);
        assert_eq!(fx.surfaces.len(), 3 * 2 + 2 * 3 + 2 * 2 * 2);
        for b in &fx.bodies {
            let body = fx.mesh.body(*b).unwrap();
            assert_relative_eq!(body.volume(), 1.0, epsilon = 1e-12);
            assert_eq!(fx.mesh.body_neighbor_bodies(*b).unwrap().len(), 2);
        }
        fx.mesh.validate().unwrap();
    }

    #[test]
    fn spacing_and_density_scale_mass() {
        let mut fx = testing::tetrahedron();
        let build = MakeBoxGrid::new(SurfaceTypeId(0), BodyTypeId(0), 1, 1, 1)
            .with_origin(Point3::new(5.0, 0.0, 0.0))
            .with_spacing(2.0)
            .with_density(0.5)
            .execute(&mut fx.editor())
            .unwrap();
        let body = fx.mesh.body(build.bodies[0]).unwrap();
        assert_relative_eq!(body.volume(), 8.0, epsilon = 1e-12);
        assert_relative_eq!(body.mass(), 4.0, epsilon = 1e-12);
        assert_relative_eq!(body.centroid(), Point3::new(6.0, 1.0, 1.0), epsilon = 1e-12);
    }
}
