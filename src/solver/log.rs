use std::fmt;

use tracing::debug;

use super::MeshId;
use crate::topology::{raw_id, MeshObj, MeshObjKind};

/// What a [`MeshLogEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshLogEventKind {
    Create,
    Destroy,
    Operation,
}

impl fmt::Display for MeshLogEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "Create",
            Self::Destroy => "Destroy",
            Self::Operation => "Operation",
        })
    }
}

/// One entry of the mesh edit log.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshLogEvent {
    pub mesh_id: MeshId,
    pub kind: MeshLogEventKind,
    pub obj_ids: Vec<u64>,
    pub obj_kinds: Vec<MeshObjKind>,
    /// Operation name, empty for create and destroy events.
    pub name: String,
}

impl MeshLogEvent {
    fn new(mesh_id: MeshId, kind: MeshLogEventKind, objs: &[MeshObj], name: &str) -> Self {
        Self {
            mesh_id,
            kind,
            obj_ids: objs.iter().map(|o| o.raw_id()).collect(),
            obj_kinds: objs.iter().map(|o| o.kind()).collect(),
            name: name.to_owned(),
        }
    }
}

impl fmt::Display for MeshLogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}", self.kind)?;
        if !self.name.is_empty() {
            write!(f, " ({})", self.name)?;
        }
        let ids: Vec<String> = self.obj_ids.iter().map(u64::to_string).collect();
        let kinds: Vec<&str> = self.obj_kinds.iter().map(|k| k.name()).collect();
        write!(f, ": [{}], [{}]}}", ids.join(", "), kinds.join(", "))
    }
}

/// Append-only record of mesh edits.
#[derive(Debug, Default, Clone)]
pub struct MeshLogger {
    events: Vec<MeshLogEvent>,
    forward: bool,
}

impl MeshLogger {
    /// Creates an empty log. With `forward`, every event is also emitted as
    /// a `tracing` debug event.
    #[must_use]
    pub fn new(forward: bool) -> Self {
        Self {
            events: Vec::new(),
            forward,
        }
    }

    pub fn create(&mut self, mesh_id: MeshId, obj: MeshObj) {
        self.push(MeshLogEvent::new(mesh_id, MeshLogEventKind::Create, &[obj], ""));
    }

    pub fn destroy(&mut self, mesh_id: MeshId, obj: MeshObj) {
        self.push(MeshLogEvent::new(mesh_id, MeshLogEventKind::Destroy, &[obj], ""));
    }

    pub fn operation(&mut self, mesh_id: MeshId, name: &str, objs: &[MeshObj]) {
        self.push(MeshLogEvent::new(
            mesh_id,
            MeshLogEventKind::Operation,
            objs,
            name,
        ));
    }

    fn push(&mut self, event: MeshLogEvent) {
        if self.forward {
            debug!(mesh = raw_id(event.mesh_id), "{event}");
        }
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[MeshLogEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
