use crate::error::Result;
use crate::math::{Point3, Vector3};
use crate::operations::MeshEditor;
use crate::types::{BodyTypeId, SurfaceTypeId};

use super::MeshBuild;

/// Creates a corner tetrahedron: the origin plus one point along each axis.
pub struct MakeTetrahedron {
    surface_type: SurfaceTypeId,
    body_type: BodyTypeId,
    origin: Point3,
    size: f64,
}

impl MakeTetrahedron {
    /// Unit tetrahedron at the origin.
    #[must_use]
    pub fn new(surface_type: SurfaceTypeId, body_type: BodyTypeId) -> Self {
        Self {
            surface_type,
            body_type,
            origin: Point3::origin(),
            size: 1.0,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: Point3) -> Self {
        self.origin = origin;
        self
    }

    /// Edge length along each axis.
    #[must_use]
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    /// Executes the operation.
    ///
    /// # Errors
    ///
    /// Returns an error on allocation failure or a degenerate size.
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<MeshBuild> {
        let mesh = editor.mesh_mut();
        mesh.ensure_available_vertices(4)?;
        mesh.ensure_available_surfaces(4)?;
        mesh.ensure_available_bodies(1)?;

        let corners = [
            Vector3::zeros(),
            Vector3::x(),
            Vector3::y(),
            Vector3::z(),
        ];
        let mut build = MeshBuild::default();
        for c in corners {
            build
                .vertices
                .push(editor.create_vertex(self.origin + c * self.size)?);
        }
        for face in [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]] {
            let vertices = face.map(|i| build.vertices[i]);
            build
                .surfaces
                .push(editor.create_surface(self.surface_type, &vertices)?);
        }
        build
            .bodies
            .push(editor.create_body(self.body_type, 1.0, &build.surfaces)?);
        editor.commit()?;
        Ok(build)
    }
}
