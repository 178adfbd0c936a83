use crate::error::Result;
use crate::operations::MeshEditor;
use crate::topology::{BodyId, StructureId};
use crate::types::StructureTypeId;

/// Creates a structure over bodies, optionally nested in parent structures.
pub struct MakeStructure {
    type_id: StructureTypeId,
    bodies: Vec<BodyId>,
    parents: Vec<StructureId>,
}

impl MakeStructure {
    /// Creates a new `MakeStructure` operation.
    #[must_use]
    pub fn new(type_id: StructureTypeId, bodies: Vec<BodyId>) -> Self {
        Self {
            type_id,
            bodies,
            parents: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parents(mut self, parents: Vec<StructureId>) -> Self {
        self.parents = parents;
        self
    }

    /// Executes the operation, creating the structure in the editor's mesh.
    ///
    /// # Errors
    ///
    /// Returns an error if a body or parent is not live.
    pub fn execute(&self, editor: &mut MeshEditor<'_>) -> Result<StructureId> {
        editor.create_structure(self.type_id, &self.bodies, &self.parents)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn child_structure_sees_parent_bodies() {
        let mut fx = testing::box_grid(2, 1, 1);
        let parent = MakeStructure::new(StructureTypeId(0), vec![fx.bodies[0]])
            .execute(&mut fx.editor())
            .unwrap();
        let child = MakeStructure::new(StructureTypeId(0), vec![fx.bodies[1]])
            .with_parents(vec![parent])
            .execute(&mut fx.editor())
            .unwrap();

        assert_eq!(fx.mesh.structure(parent).unwrap().children(), &[child]);
        assert_eq!(fx.mesh.structure_bodies(child).unwrap().len(), 2);
        fx.mesh.validate().unwrap();
    }
}
