use tracing::{debug, warn};

use super::MeshEditor;
use crate::engine::transfer_bonded;
use crate::error::{OperationError, Result, TopologyError};
use crate::topology::{MeshObj, VertexId, MIN_SURFACE_VERTICES};

/// Merges one vertex into another.
///
/// Surfaces defined by both vertices drop the removed vertex; surfaces
/// defined only by the removed vertex take the kept vertex in its place.
/// The kept vertex moves to `kept + (removed - kept) * length_coefficient`,
/// bonded records of the removed particle are transferred to the kept
/// particle, and the removed vertex is destroyed with its particle.
pub struct MergeVertices {
    keep: VertexId,
    remove: VertexId,
    length_coefficient: f64,
}

impl MergeVertices {
    /// Creates a new `MergeVertices` operation.
    #[must_use]
    pub fn new(keep: VertexId, remove: VertexId, length_coefficient: f64) -> Self {
        Self {
            keep,
            remove,
            length_coefficient,
        }
    }

    /// Executes the merge.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidInput`] when merging a vertex into
    /// itself and [`TopologyError::InvalidTopology`] if a shared surface has
    /// fewer than four vertices. Nothing is changed on error.
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<()> {
        let (keep, remove) = (self.keep, self.remove);
        if keep == remove {
            return Err(OperationError::InvalidInput("cannot merge a vertex into itself".into()).into());
        }
        let mesh = editor.mesh();
        let kept = mesh.vertex(keep)?;
        let removed = mesh.vertex(remove)?;

        let mut common = Vec::new();
        let mut different = Vec::new();
        for s in removed.surfaces() {
            if kept.defines(*s) {
                if mesh.surface(*s)?.vertices().len() <= MIN_SURFACE_VERTICES {
                    warn!(?keep, ?remove, surface = ?s, "merge would leave a surface with too few vertices");
                    return Err(TopologyError::invalid(
                        "merge would leave a surface with fewer than three vertices",
                    )
                    .into());
                }
                common.push(*s);
            } else {
                different.push(*s);
            }
        }
        let mut affected: Vec<VertexId> = kept.neighbors().to_vec();
        affected.extend_from_slice(removed.neighbors());
        let (kept_particle, removed_particle) = (kept.particle(), removed.particle());
        let position =
            kept.position() + (removed.position() - kept.position()) * self.length_coefficient;

        let mesh = editor.mesh_mut();
        for s in &common {
            mesh.remove_surface_vertex(*s, remove)?;
        }
        for s in &different {
            mesh.replace_surface_vertex(*s, remove, keep)?;
        }
        editor.set_position(keep, position)?;
        transfer_bonded(editor.engine_mut(), removed_particle, kept_particle)?;

        editor.log_operation("merge", &[MeshObj::Vertex(keep), MeshObj::Vertex(remove)]);
        editor.remove(MeshObj::Vertex(remove))?;
        affected.push(keep);
        editor.update_neighbors(&affected)?;

        debug!(?keep, ?remove, "merged vertices");
        editor.commit()
    }
}
