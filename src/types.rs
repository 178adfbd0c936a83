use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actors::Actor;
use crate::error::{OperationError, Result, TopologyError};

macro_rules! type_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

type_id!(
    /// Dense id of a registered [`SurfaceType`].
    SurfaceTypeId
);
type_id!(
    /// Dense id of a registered [`BodyType`].
    BodyTypeId
);
type_id!(
    /// Dense id of a registered [`StructureType`].
    StructureTypeId
);

/// Colors handed out to surface types registered without a style.
pub const STYLE_PALETTE: [&str; 8] = [
    "lightgray",
    "red",
    "green",
    "blue",
    "yellow",
    "cyan",
    "magenta",
    "orange",
];

/// Display style of a surface type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub color: String,
    pub visible: bool,
}

impl Style {
    #[must_use]
    pub fn new(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            visible: true,
        }
    }
}

/// Type shared by a family of surfaces.
#[derive(Debug, Default)]
pub struct SurfaceType {
    pub name: String,
    pub style: Option<Style>,
    pub actors: Vec<Box<dyn Actor>>,
    id: Option<SurfaceTypeId>,
}

impl SurfaceType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl Actor + 'static) -> Self {
        self.actors.push(Box::new(actor));
        self
    }

    /// Id assigned at registration, `None` before.
    #[must_use]
    pub fn id(&self) -> Option<SurfaceTypeId> {
        self.id
    }
}

/// Type shared by a family of bodies.
#[derive(Debug)]
pub struct BodyType {
    pub name: String,
    /// Density copied onto bodies created with this type.
    pub density: f64,
    pub actors: Vec<Box<dyn Actor>>,
    id: Option<BodyTypeId>,
}

impl Default for BodyType {
    fn default() -> Self {
        Self {
            name: String::new(),
            density: 1.0,
            actors: Vec::new(),
            id: None,
        }
    }
}

impl BodyType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl Actor + 'static) -> Self {
        self.actors.push(Box::new(actor));
        self
    }

    #[must_use]
    pub fn id(&self) -> Option<BodyTypeId> {
        self.id
    }
}

/// Type shared by a family of structures.
#[derive(Debug, Default)]
pub struct StructureType {
    pub name: String,
    pub actors: Vec<Box<dyn Actor>>,
    id: Option<StructureTypeId>,
}

impl StructureType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl Actor + 'static) -> Self {
        self.actors.push(Box::new(actor));
        self
    }

    #[must_use]
    pub fn id(&self) -> Option<StructureTypeId> {
        self.id
    }
}

/// Registries of surface, body and structure types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    surface_types: Vec<SurfaceType>,
    body_types: Vec<BodyType>,
    structure_types: Vec<StructureType>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a surface type and assigns it the next id.
    ///
    /// A type without a style receives the next palette color.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AlreadyRegistered`] if the type already has an id.
    pub fn register_surface_type(&mut self, mut ty: SurfaceType) -> Result<SurfaceTypeId> {
        if let Some(id) = ty.id {
            return Err(OperationError::AlreadyRegistered(format!("surface type {id}")).into());
        }
        let id = SurfaceTypeId(self.surface_types.len());
        if ty.style.is_none() {
            ty.style = Some(Style::new(STYLE_PALETTE[id.0 % STYLE_PALETTE.len()]));
        }
        ty.id = Some(id);
        debug!(%id, name = %ty.name, "registered surface type");
        self.surface_types.push(ty);
        Ok(id)
    }

    /// Registers a body type and assigns it the next id.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AlreadyRegistered`] if the type already has an id.
    pub fn register_body_type(&mut self, mut ty: BodyType) -> Result<BodyTypeId> {
        if let Some(id) = ty.id {
            return Err(OperationError::AlreadyRegistered(format!("body type {id}")).into());
        }
        let id = BodyTypeId(self.body_types.len());
        ty.id = Some(id);
        debug!(%id, name = %ty.name, "registered body type");
        self.body_types.push(ty);
        Ok(id)
    }

    /// Registers a structure type and assigns it the next id.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::AlreadyRegistered`] if the type already has an id.
    pub fn register_structure_type(&mut self, mut ty: StructureType) -> Result<StructureTypeId> {
        if let Some(id) = ty.id {
            return Err(
                OperationError::AlreadyRegistered(format!("structure type {id}")).into(),
            );
        }
        let id = StructureTypeId(self.structure_types.len());
        ty.id = Some(id);
        debug!(%id, name = %ty.name, "registered structure type");
        self.structure_types.push(ty);
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns [`TopologyError::NotFound`] if no type has this id.
    pub fn surface_type(&self, id: SurfaceTypeId) -> Result<&SurfaceType> {
        self.surface_types
            .get(id.0)
            .ok_or_else(|| TopologyError::NotFound(format!("surface type {id}")).into())
    }

    /// # Errors
    ///
    /// Returns [`TopologyError::NotFound`] if no type has this id.
    pub fn surface_type_mut(&mut self, id: SurfaceTypeId) -> Result<&mut SurfaceType> {
        self.surface_types
            .get_mut(id.0)
            .ok_or_else(|| TopologyError::NotFound(format!("surface type {id}")).into())
    }

    /// # Errors
    ///
    /// Returns [`TopologyError::NotFound`] if no type has this id.
    pub fn body_type(&self, id: BodyTypeId) -> Result<&BodyType> {
        self.body_types
            .get(id.0)
            .ok_or_else(|| TopologyError::NotFound(format!("body type {id}")).into())
    }

    /// # Errors
    ///
    /// Returns [`TopologyError::NotFound`] if no type has this id.
    pub fn body_type_mut(&mut self, id: BodyTypeId) -> Result<&mut BodyType> {
        self.body_types
            .get_mut(id.0)
            .ok_or_else(|| TopologyError::NotFound(format!("body type {id}")).into())
    }

    /// # Errors
    ///
    /// Returns [`TopologyError::NotFound`] if no type has this id.
    pub fn structure_type(&self, id: StructureTypeId) -> Result<&StructureType> {
        self.structure_types
            .get(id.0)
            .ok_or_else(|| TopologyError::NotFound(format!("structure type {id}")).into())
    }

    /// # Errors
    ///
    /// Returns [`TopologyError::NotFound`] if no type has this id.
    pub fn structure_type_mut(&mut self, id: StructureTypeId) -> Result<&mut StructureType> {
        self.structure_types
            .get_mut(id.0)
            .ok_or_else(|| TopologyError::NotFound(format!("structure type {id}")).into())
    }

    pub fn surface_types(&self) -> impl Iterator<Item = &SurfaceType> {
        self.surface_types.iter()
    }

    pub fn body_types(&self) -> impl Iterator<Item = &BodyType> {
        self.body_types.iter()
    }

    pub fn structure_types(&self) -> impl Iterator<Item = &StructureType> {
        self.structure_types.iter()
    }

    /// First surface type with the given name.
    #[must_use]
    pub fn find_surface_type(&self, name: &str) -> Option<SurfaceTypeId> {
        self.surface_types
            .iter()
            .position(|t| t.name == name)
            .map(SurfaceTypeId)
    }

    /// First body type with the given name.
    #[must_use]
    pub fn find_body_type(&self, name: &str) -> Option<BodyTypeId> {
        self.body_types
            .iter()
            .position(|t| t.name == name)
            .map(BodyTypeId)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::actors::EdgeTension;

    #[test]
    fn ids_are_dense_per_registry() {
        let mut registry = TypeRegistry::new();
        let s0 = registry.register_surface_type(SurfaceType::new("a")).unwrap();
        let s1 = registry.register_surface_type(SurfaceType::new("b")).unwrap();
        let b0 = registry.register_body_type(BodyType::new("cell")).unwrap();

        assert_eq!((s0, s1, b0), (SurfaceTypeId(0), SurfaceTypeId(1), BodyTypeId(0)));
        assert_eq!(registry.find_surface_type("b"), Some(s1));
        assert_eq!(registry.surface_type(s1).unwrap().id(), Some(s1));
    }

    #[test]
    fn palette_assigned_round_robin() {
        let mut registry = TypeRegistry::new();
        for i in 0..=STYLE_PALETTE.len() {
            registry
                .register_surface_type(SurfaceType::new(format!("t{i}")))
                .unwrap();
        }
        let colors: Vec<_> = registry
            .surface_types()
            .map(|t| t.style.as_ref().unwrap().color.clone())
            .collect();
        assert_eq!(colors[0], STYLE_PALETTE[0]);
        assert_eq!(colors[STYLE_PALETTE.len()], STYLE_PALETTE[0]);
    }

    #[test]
    fn explicit_style_is_kept() {
        let mut registry = TypeRegistry::new();
        let id = registry
            .register_surface_type(SurfaceType::new("x").with_style(Style::new("black")))
            .unwrap();
        assert_eq!(registry.surface_type(id).unwrap().style.as_ref().unwrap().color, "black");
    }

    #[test]
    fn registering_twice_fails() {
        let mut registry = TypeRegistry::new();
        let mut ty = SurfaceType::new("x").with_actor(EdgeTension::new(1.0));
        ty.id = Some(SurfaceTypeId(7));
        assert!(registry.register_surface_type(ty).is_err());
        assert!(registry.surface_type(SurfaceTypeId(0)).is_err());
    }

    #[test]
    fn body_type_density_default() {
        let ty = BodyType::new("cell");
        assert!((ty.density - 1.0).abs() < f64::EPSILON);
        assert!((ty.with_density(3.0).density - 3.0).abs() < f64::EPSILON);
    }
}
