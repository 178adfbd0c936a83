use serde::{Deserialize, Serialize};

use crate::error::{Result, TopologyError};

use super::{raw_id, BodyId, Mesh, StructureId, SurfaceId, VertexId};

/// Kind discriminator of a mesh object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeshObjKind {
    None,
    Vertex,
    Surface,
    Body,
    Structure,
}

impl MeshObjKind {
    /// Name used in logs and exported documents.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Vertex => "vertex",
            Self::Surface => "surface",
            Self::Body => "body",
            Self::Structure => "structure",
        }
    }
}

impl std::fmt::Display for MeshObjKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle to any mesh object.
///
/// Parent/child relations by kind:
///
/// | kind      | parents                              | children          |
/// |-----------|--------------------------------------|-------------------|
/// | vertex    | none                                 | surfaces          |
/// | surface   | vertices (ordered)                   | bodies (≤ 2)      |
/// | body      | surfaces                             | structures        |
/// | structure | bodies, then nested structures       | structures        |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshObj {
    Vertex(VertexId),
    Surface(SurfaceId),
    Body(BodyId),
    Structure(StructureId),
}

impl From<VertexId> for MeshObj {
    fn from(id: VertexId) -> Self {
        Self::Vertex(id)
    }
}

impl From<SurfaceId> for MeshObj {
    fn from(id: SurfaceId) -> Self {
        Self::Surface(id)
    }
}

impl From<BodyId> for MeshObj {
    fn from(id: BodyId) -> Self {
        Self::Body(id)
    }
}

impl From<StructureId> for MeshObj {
    fn from(id: StructureId) -> Self {
        Self::Structure(id)
    }
}

impl MeshObj {
    #[must_use]
    pub fn kind(self) -> MeshObjKind {
        match self {
            Self::Vertex(_) => MeshObjKind::Vertex,
            Self::Surface(_) => MeshObjKind::Surface,
            Self::Body(_) => MeshObjKind::Body,
            Self::Structure(_) => MeshObjKind::Structure,
        }
    }

    /// Raw integer id of the underlying handle.
    #[must_use]
    pub fn raw_id(self) -> u64 {
        match self {
            Self::Vertex(id) => raw_id(id),
            Self::Surface(id) => raw_id(id),
            Self::Body(id) => raw_id(id),
            Self::Structure(id) => raw_id(id),
        }
    }

    #[must_use]
    pub fn is_live(self, mesh: &Mesh) -> bool {
        match self {
            Self::Vertex(id) => mesh.contains_vertex(id),
            Self::Surface(id) => mesh.contains_surface(id),
            Self::Body(id) => mesh.contains_body(id),
            Self::Structure(id) => mesh.contains_structure(id),
        }
    }

    pub(crate) fn ensure_live(self, mesh: &Mesh) -> Result<()> {
        if self.is_live(mesh) {
            Ok(())
        } else {
            Err(TopologyError::InvalidHandle(self.kind().name()).into())
        }
    }

    /// Objects this object is built from.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if the object is not live.
    pub fn parents(self, mesh: &Mesh) -> Result<Vec<MeshObj>> {
        Ok(match self {
            Self::Vertex(id) => {
                mesh.vertex(id)?;
                Vec::new()
            }
            Self::Surface(id) => mesh.surface(id)?.vertices.iter().map(|v| Self::Vertex(*v)).collect(),
            Self::Body(id) => mesh.body(id)?.surfaces.iter().map(|s| Self::Surface(*s)).collect(),
            Self::Structure(id) => {
                let data = mesh.structure(id)?;
                data.bodies
                    .iter()
                    .map(|b| Self::Body(*b))
                    .chain(data.parents.iter().map(|p| Self::Structure(*p)))
                    .collect()
            }
        })
    }

    /// Objects built from this object.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if the object is not live.
    pub fn children(self, mesh: &Mesh) -> Result<Vec<MeshObj>> {
        Ok(match self {
            Self::Vertex(id) => mesh.vertex(id)?.surfaces.iter().map(|s| Self::Surface(*s)).collect(),
            Self::Surface(id) => mesh.surface(id)?.bodies().map(Self::Body).collect(),
            Self::Body(id) => mesh.body(id)?.structures.iter().map(|s| Self::Structure(*s)).collect(),
            Self::Structure(id) => mesh
                .structure(id)?
                .children
                .iter()
                .map(|s| Self::Structure(*s))
                .collect(),
        })
    }

    /// Returns `true` if this object is reachable from `container` by
    /// following parent relations.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if either object is not live.
    pub fn is_in(self, mesh: &Mesh, container: MeshObj) -> Result<bool> {
        self.ensure_live(mesh)?;
        let mut stack = container.parents(mesh)?;
        let mut visited = Vec::new();
        while let Some(obj) = stack.pop() {
            if obj == self {
                return Ok(true);
            }
            if visited.contains(&obj) {
                continue;
            }
            visited.push(obj);
            stack.extend(obj.parents(mesh)?);
        }
        Ok(false)
    }

    /// Returns `true` if `part` is reachable from this object by following
    /// parent relations.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvalidHandle`] if either object is not live.
    pub fn has(self, mesh: &Mesh, part: MeshObj) -> Result<bool> {
        part.is_in(mesh, self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn vertex_is_in_its_body() {
        let fx = testing::tetrahedron();
        let v = MeshObj::Vertex(fx.vertices[0]);
        let b = MeshObj::Body(fx.body);
        assert!(v.is_in(&fx.mesh, b).unwrap());
        assert!(b.has(&fx.mesh, v).unwrap());
        assert!(!b.is_in(&fx.mesh, v).unwrap());
    }

    #[test]
    fn parents_and_children_are_mirrored() {
        let fx = testing::box_grid(2, 1, 1);
        for (s, _) in fx.mesh.surfaces() {
            let obj = MeshObj::Surface(s);
            for parent in obj.parents(&fx.mesh).unwrap() {
                assert!(parent.children(&fx.mesh).unwrap().contains(&obj));
            }
            for child in obj.children(&fx.mesh).unwrap() {
                assert!(child.parents(&fx.mesh).unwrap().contains(&obj));
            }
        }
    }

    #[test]
    fn kinds_and_liveness() {
        let mut fx = testing::tetrahedron();
        let b = MeshObj::from(fx.body);
        assert_eq!(b.kind(), MeshObjKind::Body);
        assert!(b.is_live(&fx.mesh));
        fx.mesh.remove(b).unwrap();
        assert!(!b.is_live(&fx.mesh));
        assert!(b.parents(&fx.mesh).is_err());
    }
}
