use serde::{Deserialize, Serialize};

use super::IoElement;
use crate::actors::Actor;
use crate::error::Result;
use crate::math::{Point3, Vector3};
use crate::topology::{raw_id, BodyId, Mesh, StructureId, SurfaceId, VertexId};
use crate::types::{BodyTypeId, StructureTypeId, Style, SurfaceTypeId, TypeRegistry};

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct VertexRecord {
    pub id: u64,
    pub position: Point3,
    pub velocity: Vector3,
    pub mass: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct SurfaceRecord {
    pub id: u64,
    pub type_id: SurfaceTypeId,
    pub vertices: Vec<u64>,
    pub b1: Option<u64>,
    pub b2: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct BodyRecord {
    pub id: u64,
    pub type_id: BodyTypeId,
    pub density: f64,
    pub surfaces: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct StructureRecord {
    pub id: u64,
    pub type_id: StructureTypeId,
    pub bodies: Vec<u64>,
    pub parents: Vec<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct MeshRecord {
    pub pool_increment: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct SurfaceTypeRecord {
    pub id: Option<SurfaceTypeId>,
    pub name: String,
    pub style: Option<Style>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct BodyTypeRecord {
    pub id: Option<BodyTypeId>,
    pub name: String,
    pub density: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct StructureTypeRecord {
    pub id: Option<StructureTypeId>,
    pub name: String,
}

fn with_actors(mut element: IoElement, actors: &[Box<dyn Actor>]) -> Result<IoElement> {
    let items = actors
        .iter()
        .map(|a| a.to_element())
        .collect::<Result<Vec<_>>>()?;
    element.insert("actors", IoElement::list("Actors", items));
    Ok(element)
}

/// # Errors
///
/// Returns an error if `v` is not live.
pub fn export_vertex(mesh: &Mesh, v: VertexId) -> Result<IoElement> {
    let data = mesh.vertex(v)?;
    IoElement::encode(
        "Vertex",
        &VertexRecord {
            id: raw_id(v),
            position: data.position(),
            velocity: data.velocity(),
            mass: data.mass(),
        },
    )
}

/// # Errors
///
/// Returns an error if `s` is not live or one of its actors cannot be encoded.
pub fn export_surface(mesh: &Mesh, s: SurfaceId) -> Result<IoElement> {
    let data = mesh.surface(s)?;
    let element = IoElement::encode(
        "Surface",
        &SurfaceRecord {
            id: raw_id(s),
            type_id: data.type_id(),
            vertices: data.vertices().iter().map(|v| raw_id(*v)).collect(),
            b1: data.b1().map(raw_id),
            b2: data.b2().map(raw_id),
        },
    )?;
    with_actors(element, &data.actors)
}

/// # Errors
///
/// Returns an error if `b` is not live or one of its actors cannot be encoded.
pub fn export_body(mesh: &Mesh, b: BodyId) -> Result<IoElement> {
    let data = mesh.body(b)?;
    let element = IoElement::encode(
        "Body",
        &BodyRecord {
            id: raw_id(b),
            type_id: data.type_id(),
            density: data.density(),
            surfaces: data.surfaces().iter().map(|s| raw_id(*s)).collect(),
        },
    )?;
    with_actors(element, &data.actors)
}

/// # Errors
///
/// Returns an error if `st` is not live or one of its actors cannot be encoded.
pub fn export_structure(mesh: &Mesh, st: StructureId) -> Result<IoElement> {
    let data = mesh.structure(st)?;
    let element = IoElement::encode(
        "Structure",
        &StructureRecord {
            id: raw_id(st),
            type_id: data.type_id(),
            bodies: data.own_bodies().iter().map(|b| raw_id(*b)).collect(),
            parents: data.parents().iter().map(|p| raw_id(*p)).collect(),
        },
    )?;
    with_actors(element, &data.actors)
}

/// Exports every object of a mesh.
///
/// # Errors
///
/// Returns an error if an actor cannot be encoded.
pub fn export_mesh(mesh: &Mesh) -> Result<IoElement> {
    let mut root = IoElement::encode(
        "Mesh",
        &MeshRecord {
            pool_increment: mesh.pool_increment(),
        },
    )?;
    let vertices = mesh
        .vertex_ids()
        .into_iter()
        .map(|v| export_vertex(mesh, v))
        .collect::<Result<Vec<_>>>()?;
    let surfaces = mesh
        .surface_ids()
        .into_iter()
        .map(|s| export_surface(mesh, s))
        .collect::<Result<Vec<_>>>()?;
    let bodies = mesh
        .body_ids()
        .into_iter()
        .map(|b| export_body(mesh, b))
        .collect::<Result<Vec<_>>>()?;
    let structures = mesh
        .structure_ids()
        .into_iter()
        .map(|st| export_structure(mesh, st))
        .collect::<Result<Vec<_>>>()?;
    root.insert("vertices", IoElement::list("Vertices", vertices));
    root.insert("surfaces", IoElement::list("Surfaces", surfaces));
    root.insert("bodies", IoElement::list("Bodies", bodies));
    root.insert("structures", IoElement::list("Structures", structures));
    Ok(root)
}

/// Exports every registered type with its actors.
///
/// # Errors
///
/// Returns an error if an actor cannot be encoded.
pub fn export_types(types: &TypeRegistry) -> Result<IoElement> {
    let mut root = IoElement::new("Types");

    let mut surface_types = Vec::new();
    for ty in types.surface_types() {
        let element = IoElement::encode(
            "SurfaceType",
            &SurfaceTypeRecord {
                id: ty.id(),
                name: ty.name.clone(),
                style: ty.style.clone(),
            },
        )?;
        surface_types.push(with_actors(element, &ty.actors)?);
    }

    let mut body_types = Vec::new();
    for ty in types.body_types() {
        let element = IoElement::encode(
            "BodyType",
            &BodyTypeRecord {
                id: ty.id(),
                name: ty.name.clone(),
                density: ty.density,
            },
        )?;
        body_types.push(with_actors(element, &ty.actors)?);
    }

    let mut structure_types = Vec::new();
    for ty in types.structure_types() {
        let element = IoElement::encode(
            "StructureType",
            &StructureTypeRecord {
                id: ty.id(),
                name: ty.name.clone(),
            },
        )?;
        structure_types.push(with_actors(element, &ty.actors)?);
    }

    root.insert("surface_types", IoElement::list("SurfaceTypes", surface_types));
    root.insert("body_types", IoElement::list("BodyTypes", body_types));
    root.insert("structure_types", IoElement::list("StructureTypes", structure_types));
    Ok(root)
}
