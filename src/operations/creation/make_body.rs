use crate::error::Result;
use crate::operations::MeshEditor;
use crate::topology::{BodyId, SurfaceId};
use crate::types::BodyTypeId;

/// Creates a body enclosed by existing surfaces.
pub struct MakeBody {
    type_id: BodyTypeId,
    density: f64,
    surfaces: Vec<SurfaceId>,
}

impl MakeBody {
    /// Creates a new `MakeBody` operation with unit density.
    #[must_use]
    pub fn new(type_id: BodyTypeId, surfaces: Vec<SurfaceId>) -> Self {
        Self {
            type_id,
            density: 1.0,
            surfaces,
        }
    }

    #[must_use]
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Executes the operation, creating the body in the editor's mesh.
    ///
    /// # Errors
    ///
    /// See [`crate::topology::Mesh::create_body`].
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<BodyId> {
        editor.create_body(self.type_id, self.density, &self.surfaces)
    }
}
