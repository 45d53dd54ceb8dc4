//! Entity definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::attribute::AttributeDef;
use super::types::AttributeType;

/// An entity definition.
///
/// The primary-id attribute is always declared, as a unique identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity logical name (lowercase).
    pub logical_name: String,
    /// Name of the primary-key attribute.
    pub primary_id_attribute: String,
    /// Name of the display-name attribute, if any.
    pub primary_name_attribute: Option<String>,
    /// Attribute definitions keyed by lowercase name.
    pub attributes: BTreeMap<String, AttributeDef>,
}

impl EntityDef {
    /// Create a new entity definition.
    pub fn new(logical_name: impl Into<String>, primary_id_attribute: impl Into<String>) -> Self {
        let primary_id_attribute = primary_id_attribute.into().to_lowercase();
        let mut attributes = BTreeMap::new();
        attributes.insert(
            primary_id_attribute.clone(),
            AttributeDef::new(primary_id_attribute.clone(), AttributeType::Uniqueidentifier),
        );
        Self {
            logical_name: logical_name.into().to_lowercase(),
            primary_id_attribute,
            primary_name_attribute: None,
            attributes,
        }
    }

    /// Set the display-name attribute, declaring it as text if missing.
    pub fn with_primary_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into().to_lowercase();
        self.attributes
            .entry(name.clone())
            .or_insert_with(|| AttributeDef::new(name.clone(), AttributeType::String));
        self.primary_name_attribute = Some(name);
        self
    }

    /// Add an attribute to the entity.
    pub fn with_attribute(mut self, attribute: AttributeDef) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    /// Add an attribute by name and type.
    pub fn with(self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.with_attribute(AttributeDef::new(name, attribute_type))
    }

    /// Add multiple attributes.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = AttributeDef>) -> Self {
        for attribute in attributes {
            self.attributes.insert(attribute.name.clone(), attribute);
        }
        self
    }

    /// Get an attribute by name (case-insensitive).
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeDef> {
        match self.attributes.get(name) {
            Some(attribute) => Some(attribute),
            None => self.attributes.get(&name.to_lowercase()),
        }
    }

    /// Check if an attribute is declared.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    /// Get the declared type of an attribute.
    pub fn attribute_type(&self, name: &str) -> Option<AttributeType> {
        self.get_attribute(name).map(|a| a.attribute_type)
    }

    /// List attribute names in sorted order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }
}
