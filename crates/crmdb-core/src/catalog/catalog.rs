//! Catalog manager for storing and retrieving entity metadata.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use super::{EntityDef, MetadataLookup, SchemaBundle};

/// The catalog manager for entity metadata.
///
/// Holds the current schema and every schema applied before it. Reads take a
/// shared lock, so lookups from concurrent queries never block each other.
pub struct Catalog {
    /// Current schema version (cached).
    current_version: AtomicU64,
    /// Current schema.
    current_schema: RwLock<SchemaBundle>,
    /// Every applied schema, oldest first.
    history: RwLock<Vec<SchemaBundle>>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            current_version: AtomicU64::new(0),
            current_schema: RwLock::new(SchemaBundle::default()),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Create a catalog with an initial schema applied.
    pub fn with_schema(bundle: SchemaBundle) -> Self {
        let catalog = Self::new();
        catalog.apply_schema(bundle);
        catalog
    }

    /// Get the current schema version.
    pub fn current_version(&self) -> u64 {
        self.current_version.load(Ordering::SeqCst)
    }

    /// Get a copy of the current schema bundle.
    pub fn current_schema(&self) -> SchemaBundle {
        self.current_schema.read().clone()
    }

    /// Get the schema bundle applied at a specific version.
    pub fn schema_at_version(&self, version: u64) -> Option<SchemaBundle> {
        self.history
            .read()
            .iter()
            .find(|s| s.version == version)
            .cloned()
    }

    /// Apply a new schema bundle, replacing the current one.
    ///
    /// Returns the new version number.
    pub fn apply_schema(&self, mut bundle: SchemaBundle) -> u64 {
        let mut current = self.current_schema.write();
        let new_version = self.current_version() + 1;
        bundle.version = new_version;

        debug!(
            version = new_version,
            entities = bundle.entities.len(),
            "applying schema"
        );

        self.history.write().push(bundle.clone());
        *current = bundle;
        self.current_version.store(new_version, Ordering::SeqCst);

        new_version
    }

    /// Add or replace one entity definition, producing a new schema version.
    pub fn register_entity(&self, entity: EntityDef) -> u64 {
        let mut bundle = self.current_schema();
        bundle.add_entity(entity);
        self.apply_schema(bundle)
    }

    /// Get an entity definition by name from the current schema.
    pub fn get_entity(&self, name: &str) -> Option<EntityDef> {
        self.current_schema.read().get_entity(name).cloned()
    }

    /// List all entity names in the current schema.
    pub fn list_entities(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .current_schema
            .read()
            .entity_names()
            .into_iter()
            .map(String::from)
            .collect();
        names.sort();
        names
    }

    /// List all schema versions.
    pub fn list_versions(&self) -> Vec<u64> {
        self.history.read().iter().map(|s| s.version).collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataLookup for Catalog {
    fn entity_metadata(&self, entity_name: &str) -> Option<EntityDef> {
        self.get_entity(entity_name)
    }
}
