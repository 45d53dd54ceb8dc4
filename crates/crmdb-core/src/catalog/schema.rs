//! Schema bundle - versioned snapshot of the entity metadata.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EntityDef;
use crate::error::Error;

/// A versioned snapshot of every entity definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaBundle {
    /// Schema version (monotonically increasing).
    pub version: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Entity definitions keyed by lowercase logical name.
    pub entities: HashMap<String, EntityDef>,
}

impl SchemaBundle {
    /// Create an empty schema bundle.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            created_at: Utc::now(),
            entities: HashMap::new(),
        }
    }

    /// Add an entity to the schema.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.entities.insert(entity.logical_name.clone(), entity);
        self
    }

    /// Add an entity in place.
    pub fn add_entity(&mut self, entity: EntityDef) {
        self.entities.insert(entity.logical_name.clone(), entity);
    }

    /// Get an entity by name (case-insensitive).
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        match self.entities.get(name) {
            Some(entity) => Some(entity),
            None => self.entities.get(&name.to_lowercase()),
        }
    }

    /// List all entity names.
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.keys().map(|s| s.as_str()).collect()
    }

    /// Serialize the schema bundle to JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|e| crmdb_proto::Error::from(e).into())
    }

    /// Deserialize a schema bundle from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| crmdb_proto::Error::from(e).into())
    }
}

impl Default for SchemaBundle {
    fn default() -> Self {
        Self::new(0)
    }
}
