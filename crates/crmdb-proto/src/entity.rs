//! Stored records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::{EntityReference, Value};

/// One stored record of an entity type.
///
/// Attribute names are case-insensitive and stored lowercase. The
/// `formatted_values` side map holds display strings (option labels,
/// formatted amounts) keyed by the same attribute names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Entity {
    /// Logical name of the entity type.
    pub logical_name: String,
    /// Record identifier.
    pub id: Uuid,
    /// Attribute values keyed by lowercase attribute name.
    pub attributes: BTreeMap<String, Value>,
    /// Display strings keyed by lowercase attribute name.
    pub formatted_values: BTreeMap<String, String>,
}

impl Entity {
    /// Create an empty record with the given id.
    pub fn new(logical_name: impl Into<String>, id: Uuid) -> Self {
        Self {
            logical_name: logical_name.into().to_lowercase(),
            id,
            attributes: BTreeMap::new(),
            formatted_values: BTreeMap::new(),
        }
    }

    /// Create an empty record with a fresh random id.
    pub fn with_new_id(logical_name: impl Into<String>) -> Self {
        Self::new(logical_name, Uuid::new_v4())
    }

    /// Set an attribute (builder style).
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a formatted value (builder style).
    pub fn with_formatted_value(
        mut self,
        name: impl Into<String>,
        formatted: impl Into<String>,
    ) -> Self {
        self.set_formatted_value(name, formatted);
        self
    }

    /// Set an attribute, canonicalizing the name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes
            .insert(name.into().to_lowercase(), value.into());
    }

    /// Get an attribute by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self.attributes.get(name) {
            Some(value) => Some(value),
            None => self.attributes.get(&name.to_lowercase()),
        }
    }

    /// Remove an attribute, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(&name.to_lowercase())
    }

    /// Check if an attribute key is present (even if null).
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a formatted value, canonicalizing the name.
    pub fn set_formatted_value(&mut self, name: impl Into<String>, formatted: impl Into<String>) {
        self.formatted_values
            .insert(name.into().to_lowercase(), formatted.into());
    }

    /// Get a formatted value by attribute name.
    pub fn formatted_value(&self, name: &str) -> Option<&str> {
        match self.formatted_values.get(name) {
            Some(value) => Some(value.as_str()),
            None => self
                .formatted_values
                .get(&name.to_lowercase())
                .map(String::as_str),
        }
    }

    /// Build a reference pointing at this record.
    pub fn to_reference(&self) -> EntityReference {
        EntityReference::new(&self.logical_name, self.id)
    }

    /// Number of attributes on the record.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the record carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
