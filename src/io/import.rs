use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use super::export::{
    BodyRecord, BodyTypeRecord, MeshRecord, StructureRecord, StructureTypeRecord, SurfaceRecord,
    SurfaceTypeRecord, VertexRecord,
};
use super::IoElement;
use crate::actors::{Actor, ActorRegistry};
use crate::engine::{ParticleEngine, ParticleId};
use crate::error::{IoError, Result};
use crate::topology::{
    BodyId, Mesh, MeshObj, StructureId, SurfaceId, VertexId, MIN_BODY_SURFACES,
    MIN_SURFACE_VERTICES,
};
use crate::types::{
    BodyType, BodyTypeId, StructureType, StructureTypeId, SurfaceType, SurfaceTypeId,
    TypeRegistry,
};

/// Old-to-new type id maps produced by [`import_types`].
///
/// Ids missing from a map are used unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeMaps {
    pub surface_types: HashMap<usize, SurfaceTypeId>,
    pub body_types: HashMap<usize, BodyTypeId>,
    pub structure_types: HashMap<usize, StructureTypeId>,
}

impl TypeMaps {
    #[must_use]
    pub fn surface(&self, id: SurfaceTypeId) -> SurfaceTypeId {
        self.surface_types.get(&id.0).copied().unwrap_or(id)
    }

    #[must_use]
    pub fn body(&self, id: BodyTypeId) -> BodyTypeId {
        self.body_types.get(&id.0).copied().unwrap_or(id)
    }

    #[must_use]
    pub fn structure(&self, id: StructureTypeId) -> StructureTypeId {
        self.structure_types.get(&id.0).copied().unwrap_or(id)
    }
}

/// Old-to-new handle maps produced by [`import_mesh`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportSummary {
    pub vertices: HashMap<u64, VertexId>,
    pub surfaces: HashMap<u64, SurfaceId>,
    pub bodies: HashMap<u64, BodyId>,
    pub structures: HashMap<u64, StructureId>,
    /// Type maps the mesh was imported against.
    pub types: TypeMaps,
}

fn decode_actors(element: &IoElement, registry: &ActorRegistry) -> Result<Vec<Box<dyn Actor>>> {
    let Some(actors) = element.children.get("actors") else {
        return Ok(Vec::new());
    };
    actors.items.iter().map(|a| registry.decode(a)).collect()
}

fn lookup<T: Copy>(map: &HashMap<u64, T>, id: u64, what: &str) -> Result<T> {
    map.get(&id)
        .copied()
        .ok_or_else(|| IoError::malformed(format!("unknown {what} id {id}")).into())
}

/// Registers every type in a `"Types"` element.
///
/// # Errors
///
/// Returns an error if the element is malformed or an actor cannot be decoded.
pub fn import_types(
    element: &IoElement,
    types: &mut TypeRegistry,
    registry: &ActorRegistry,
) -> Result<TypeMaps> {
    element.expect_kind("Types")?;
    let mut maps = TypeMaps::default();

    for item in &element.child("surface_types")?.items {
        item.expect_kind("SurfaceType")?;
        let record: SurfaceTypeRecord = item.decode()?;
        let mut ty = SurfaceType::new(record.name);
        ty.style = record.style;
        ty.actors = decode_actors(item, registry)?;
        let id = types.register_surface_type(ty)?;
        if let Some(old) = record.id {
            maps.surface_types.insert(old.0, id);
        }
    }

    for item in &element.child("body_types")?.items {
        item.expect_kind("BodyType")?;
        let record: BodyTypeRecord = item.decode()?;
        let mut ty = BodyType::new(record.name).with_density(record.density);
        ty.actors = decode_actors(item, registry)?;
        let id = types.register_body_type(ty)?;
        if let Some(old) = record.id {
            maps.body_types.insert(old.0, id);
        }
    }

    for item in &element.child("structure_types")?.items {
        item.expect_kind("StructureType")?;
        let record: StructureTypeRecord = item.decode()?;
        let mut ty = StructureType::new(record.name);
        ty.actors = decode_actors(item, registry)?;
        let id = types.register_structure_type(ty)?;
        if let Some(old) = record.id {
            maps.structure_types.insert(old.0, id);
        }
    }

    // Actors may name types registered later in the document.
    for id in maps.surface_types.values() {
        remap_actors(&mut types.surface_type_mut(*id)?.actors, &maps);
    }
    for id in maps.body_types.values() {
        remap_actors(&mut types.body_type_mut(*id)?.actors, &maps);
    }
    for id in maps.structure_types.values() {
        remap_actors(&mut types.structure_type_mut(*id)?.actors, &maps);
    }

    Ok(maps)
}

fn remap_actors(actors: &mut [Box<dyn Actor>], maps: &TypeMaps) {
    for actor in actors {
        actor.remap_types(maps);
    }
}

struct Decoded<R> {
    record: R,
    actors: Vec<Box<dyn Actor>>,
}

fn decode_list<R: serde::de::DeserializeOwned>(
    root: &IoElement,
    key: &str,
    kind: &str,
    registry: &ActorRegistry,
) -> Result<Vec<Decoded<R>>> {
    root.child(key)?
        .items
        .iter()
        .map(|item| {
            item.expect_kind(kind)?;
            Ok(Decoded {
                record: item.decode()?,
                actors: decode_actors(item, registry)?,
            })
        })
        .collect()
}

/// Checks that every id referenced by `refs` is listed in `known`.
fn check_refs<'a>(
    known: &[u64],
    refs: impl IntoIterator<Item = &'a u64>,
    what: &str,
) -> Result<()> {
    for id in refs {
        if !known.contains(id) {
            return Err(IoError::malformed(format!("reference to unknown {what} {id}")).into());
        }
    }
    Ok(())
}

/// Rejects surfaces and bodies that `Mesh::create_*` would refuse.
fn check_shapes(
    surfaces: &[Decoded<SurfaceRecord>],
    bodies: &[Decoded<BodyRecord>],
) -> Result<()> {
    for d in surfaces {
        let vertices = &d.record.vertices;
        if vertices.len() < MIN_SURFACE_VERTICES {
            return Err(IoError::malformed(format!(
                "surface {} has {} vertices",
                d.record.id,
                vertices.len()
            ))
            .into());
        }
        if has_repeats(vertices) {
            return Err(IoError::malformed(format!(
                "surface {} lists a vertex twice",
                d.record.id
            ))
            .into());
        }
    }
    let mut adjoining: HashMap<u64, usize> = HashMap::new();
    for d in bodies {
        let surfaces = &d.record.surfaces;
        if surfaces.len() < MIN_BODY_SURFACES {
            return Err(IoError::malformed(format!(
                "body {} has {} surfaces",
                d.record.id,
                surfaces.len()
            ))
            .into());
        }
        if has_repeats(surfaces) {
            return Err(IoError::malformed(format!(
                "body {} lists a surface twice",
                d.record.id
            ))
            .into());
        }
        for s in surfaces {
            let count = adjoining.entry(*s).or_default();
            *count += 1;
            if *count > 2 {
                return Err(
                    IoError::malformed(format!("surface {s} adjoins more than two bodies")).into(),
                );
            }
        }
    }
    Ok(())
}

fn has_repeats(ids: &[u64]) -> bool {
    let mut seen = HashSet::new();
    !ids.iter().all(|id| seen.insert(*id))
}

struct Records {
    vertices: Vec<VertexRecord>,
    surfaces: Vec<Decoded<SurfaceRecord>>,
    bodies: Vec<Decoded<BodyRecord>>,
    structures: Vec<Decoded<StructureRecord>>,
}

fn create_objects<E: ParticleEngine + ?Sized>(
    mesh: &mut Mesh,
    engine: &mut E,
    type_maps: &TypeMaps,
    records: Records,
    summary: &mut ImportSummary,
    particles: &mut Vec<ParticleId>,
) -> Result<()> {
    for record in &records.vertices {
        let particle = engine.create_particle(record.position)?;
        particles.push(particle);
        if record.mass > 0.0 {
            engine.set_mass(particle, record.mass)?;
        }
        let v = mesh.create_vertex(particle, record.position)?;
        summary.vertices.insert(record.id, v);
    }

    for mut d in records.surfaces {
        let ids = d
            .record
            .vertices
            .iter()
            .map(|id| lookup(&summary.vertices, *id, "vertex"))
            .collect::<Result<Vec<_>>>()?;
        let s = mesh.create_surface(type_maps.surface(d.record.type_id), &ids)?;
        remap_actors(&mut d.actors, type_maps);
        mesh.surface_mut(s)?.actors = d.actors;
        summary.surfaces.insert(d.record.id, s);
    }

    for mut d in records.bodies {
        let ids = d
            .record
            .surfaces
            .iter()
            .map(|id| lookup(&summary.surfaces, *id, "surface"))
            .collect::<Result<Vec<_>>>()?;
        let b = mesh.create_body(type_maps.body(d.record.type_id), d.record.density, &ids)?;
        remap_actors(&mut d.actors, type_maps);
        mesh.body_mut(b)?.actors = d.actors;
        summary.bodies.insert(d.record.id, b);
    }

    // Parents are created before the structures nested under them.
    let mut pending = records.structures;
    while !pending.is_empty() {
        let Some(i) = pending.iter().position(|d| {
            d.record
                .parents
                .iter()
                .all(|p| summary.structures.contains_key(p))
        }) else {
            return Err(IoError::malformed("structure parents form a cycle").into());
        };
        let mut d = pending.swap_remove(i);
        let bodies = d
            .record
            .bodies
            .iter()
            .map(|id| lookup(&summary.bodies, *id, "body"))
            .collect::<Result<Vec<_>>>()?;
        let parents = d
            .record
            .parents
            .iter()
            .map(|id| lookup(&summary.structures, *id, "structure"))
            .collect::<Result<Vec<_>>>()?;
        let st = mesh.create_structure(type_maps.structure(d.record.type_id), &bodies, &parents)?;
        remap_actors(&mut d.actors, type_maps);
        mesh.structure_mut(st)?.actors = d.actors;
        summary.structures.insert(d.record.id, st);
    }
    Ok(())
}

/// Removes everything a failed import created, particles included.
fn rollback<E: ParticleEngine + ?Sized>(
    mesh: &mut Mesh,
    engine: &mut E,
    summary: &ImportSummary,
    particles: &[ParticleId],
) {
    let objects = summary
        .structures
        .values()
        .map(|st| MeshObj::Structure(*st))
        .chain(summary.bodies.values().map(|b| MeshObj::Body(*b)))
        .chain(summary.surfaces.values().map(|s| MeshObj::Surface(*s)))
        .chain(summary.vertices.values().map(|v| MeshObj::Vertex(*v)));
    for obj in objects {
        if obj.is_live(mesh) {
            if let Err(err) = mesh.remove(obj) {
                warn!(?obj, %err, "import rollback could not remove object");
            }
        }
    }
    for particle in particles {
        if engine.contains(*particle) {
            if let Err(err) = engine.destroy_particle(*particle) {
                warn!(?particle, %err, "import rollback could not destroy particle");
            }
        }
    }
}

/// Recreates the objects of a `"Mesh"` element inside `mesh`.
///
/// The whole document is decoded, and every cross reference and object shape
/// checked, before the first object is created. New particles are created in
/// `engine`; a failure after that point removes them again along with any
/// objects already created. Surface body slots are re-derived from geometry.
///
/// # Errors
///
/// Returns an error if the element is malformed, references an unknown id,
/// or describes invalid topology.
pub fn import_mesh<E: ParticleEngine + ?Sized>(
    element: &IoElement,
    mesh: &mut Mesh,
    engine: &mut E,
    registry: &ActorRegistry,
    type_maps: &TypeMaps,
) -> Result<ImportSummary> {
    element.expect_kind("Mesh")?;
    let _: MeshRecord = element.decode()?;
    let vertices: Vec<VertexRecord> = element
        .child("vertices")?
        .items
        .iter()
        .map(|item| {
            item.expect_kind("Vertex")?;
            item.decode()
        })
        .collect::<Result<_>>()?;
    let surfaces: Vec<Decoded<SurfaceRecord>> =
        decode_list(element, "surfaces", "Surface", registry)?;
    let bodies: Vec<Decoded<BodyRecord>> = decode_list(element, "bodies", "Body", registry)?;
    let structures: Vec<Decoded<StructureRecord>> =
        decode_list(element, "structures", "Structure", registry)?;

    let vertex_ids: Vec<u64> = vertices.iter().map(|r| r.id).collect();
    let surface_ids: Vec<u64> = surfaces.iter().map(|d| d.record.id).collect();
    let body_ids: Vec<u64> = bodies.iter().map(|d| d.record.id).collect();
    let structure_ids: Vec<u64> = structures.iter().map(|d| d.record.id).collect();
    for d in &surfaces {
        check_refs(&vertex_ids, &d.record.vertices, "vertex")?;
    }
    for d in &bodies {
        check_refs(&surface_ids, &d.record.surfaces, "surface")?;
    }
    for d in &structures {
        check_refs(&body_ids, &d.record.bodies, "body")?;
        check_refs(&structure_ids, &d.record.parents, "structure")?;
    }
    check_shapes(&surfaces, &bodies)?;

    mesh.ensure_available_vertices(vertices.len())?;
    mesh.ensure_available_surfaces(surfaces.len())?;
    mesh.ensure_available_bodies(bodies.len())?;
    mesh.ensure_available_structures(structures.len())?;

    let mut summary = ImportSummary {
        types: type_maps.clone(),
        ..ImportSummary::default()
    };
    let mut particles = Vec::with_capacity(vertices.len());
    let created = create_objects(
        mesh,
        engine,
        type_maps,
        Records {
            vertices,
            surfaces,
            bodies,
            structures,
        },
        &mut summary,
        &mut particles,
    );
    if let Err(err) = created {
        rollback(mesh, engine, &summary, &particles);
        return Err(err);
    }

    mesh.position_changed(engine)?;
    debug!(
        vertices = summary.vertices.len(),
        surfaces = summary.surfaces.len(),
        bodies = summary.bodies.len(),
        structures = summary.structures.len(),
        "imported mesh"
    );
    Ok(summary)
}
