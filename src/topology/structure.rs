use crate::actors::Actor;
use crate::error::Result;
use crate::types::StructureTypeId;

use super::{dedup_in_order, BodyId, Mesh, SurfaceId, VertexId};

slotmap::new_key_type! {
    /// Unique identifier for a structure in a mesh.
    pub struct StructureId;
}

/// A group of bodies, optionally nested inside other structures.
///
/// A structure contains its own bodies plus every body of its parent
/// structures.
#[derive(Debug)]
pub struct StructureData {
    pub(crate) bodies: Vec<BodyId>,
    pub(crate) parents: Vec<StructureId>,
    pub(crate) children: Vec<StructureId>,
    pub(crate) type_id: StructureTypeId,
    /// Actors that apply to this structure only.
    pub actors: Vec<Box<dyn Actor>>,
}

impl StructureData {
    #[must_use]
    pub fn new(type_id: StructureTypeId, bodies: Vec<BodyId>, parents: Vec<StructureId>) -> Self {
        Self {
            bodies,
            parents,
            children: Vec::new(),
            type_id,
            actors: Vec::new(),
        }
    }

    /// Bodies listed directly on this structure.
    #[must_use]
    pub fn own_bodies(&self) -> &[BodyId] {
        &self.bodies
    }

    /// Structures nested inside this one.
    #[must_use]
    pub fn parents(&self) -> &[StructureId] {
        &self.parents
    }

    /// Structures this one is nested inside.
    #[must_use]
    pub fn children(&self) -> &[StructureId] {
        &self.children
    }

    #[must_use]
    pub fn type_id(&self) -> StructureTypeId {
        self.type_id
    }
}

impl Mesh {
    /// Every body of `st`, including the bodies of nested parent structures.
    ///
    /// # Errors
    ///
    /// Returns an error if `st` or a nested structure is not live.
    pub fn structure_bodies(&self, st: StructureId) -> Result<Vec<BodyId>> {
        let mut visited = vec![st];
        let mut result = Vec::new();
        let mut i = 0;
        while i < visited.len() {
            let data = self.structure(visited[i])?;
            result.extend(data.bodies.iter().copied());
            for p in &data.parents {
                if !visited.contains(p) {
                    visited.push(*p);
                }
            }
            i += 1;
        }
        dedup_in_order(&mut result);
        Ok(result)
    }

    /// Every surface of every body of `st`.
    ///
    /// # Errors
    ///
    /// Returns an error if `st` or one of its bodies is not live.
    pub fn structure_surfaces(&self, st: StructureId) -> Result<Vec<SurfaceId>> {
        let mut result = Vec::new();
        for b in self.structure_bodies(st)? {
            result.extend(self.body(b)?.surfaces.iter().copied());
        }
        dedup_in_order(&mut result);
        Ok(result)
    }

    /// Every vertex of every body of `st`.
    ///
    /// # Errors
    ///
    /// Returns an error if `st` or one of its bodies is not live.
    pub fn structure_vertices(&self, st: StructureId) -> Result<Vec<VertexId>> {
        let mut result = Vec::new();
        for b in self.structure_bodies(st)? {
            result.extend(self.body_vertices(b)?);
        }
        dedup_in_order(&mut result);
        Ok(result)
    }
}
