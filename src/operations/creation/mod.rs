mod make_body;
mod make_box_grid;
mod make_quad_grid;
mod make_structure;
mod make_surface;
mod make_tetrahedron;

pub use make_body::MakeBody;
pub use make_box_grid::MakeBoxGrid;
pub use make_quad_grid::MakeQuadGrid;
pub use make_structure::MakeStructure;
pub use make_surface::MakeSurface;
pub use make_tetrahedron::MakeTetrahedron;

use crate::topology::{BodyId, SurfaceId, VertexId};

/// Objects created by a multi-object creation helper, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshBuild {
    pub vertices: Vec<VertexId>,
    pub surfaces: Vec<SurfaceId>,
    pub bodies: Vec<BodyId>,
}
