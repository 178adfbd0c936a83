mod export;
mod import;

pub use export::{
    export_body, export_mesh, export_structure, export_surface, export_types, export_vertex,
};
pub use import::{import_mesh, import_types, ImportSummary, TypeMaps};

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

/// Node of an exported document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoElement {
    /// Discriminator, e.g. `"Vertex"` or `"Adhesion"`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, IoElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<IoElement>,
}

impl IoElement {
    /// Creates an empty element of the given kind.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: None,
            children: BTreeMap::new(),
            items: Vec::new(),
        }
    }

    /// Creates an element whose value is `value` serialized with serde.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] if `value` cannot be serialized.
    pub fn encode<T: Serialize + ?Sized>(kind: impl Into<String>, value: &T) -> Result<Self> {
        let mut element = Self::new(kind);
        element.value = Some(serde_json::to_value(value).map_err(IoError::from)?);
        Ok(element)
    }

    /// Deserializes the element's value.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::MissingKey`] if the element has no value, or
    /// [`IoError::Json`] if it does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self
            .value
            .clone()
            .ok_or_else(|| IoError::MissingKey(format!("{}.value", self.kind)))?;
        Ok(serde_json::from_value(value).map_err(IoError::from)?)
    }

    /// Fails unless the element has the expected kind.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Malformed`] on a kind mismatch.
    pub fn expect_kind(&self, kind: &str) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(IoError::malformed(format!("expected {kind}, found {}", self.kind)).into())
        }
    }

    /// Named child element.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::MissingKey`] if there is no such child.
    pub fn child(&self, key: &str) -> Result<&IoElement> {
        self.children
            .get(key)
            .ok_or_else(|| IoError::MissingKey(format!("{}.{key}", self.kind)).into())
    }

    /// Adds or replaces a named child.
    pub fn insert(&mut self, key: impl Into<String>, child: IoElement) {
        self.children.insert(key.into(), child);
    }

    /// Appends an item.
    pub fn push(&mut self, item: IoElement) {
        self.items.push(item);
    }

    /// Element of kind `kind` listing `items`.
    #[must_use]
    pub fn list(kind: impl Into<String>, items: Vec<IoElement>) -> Self {
        let mut element = Self::new(kind);
        element.items = items;
        element
    }

    /// Pretty-printed JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self).map_err(IoError::from)?)
    }

    /// Parses JSON text produced by [`IoElement::to_json`].
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] if the text is not a valid element.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text).map_err(IoError::from)?)
    }
}
