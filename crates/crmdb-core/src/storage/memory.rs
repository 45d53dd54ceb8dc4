//! In-memory entity store.

use std::collections::HashMap;

use crmdb_proto::Entity;
use parking_lot::RwLock;
use tracing::trace;
use uuid::Uuid;

use super::EntityStore;

/// Records of one entity type, in insertion order.
#[derive(Debug, Default)]
struct Table {
    rows: Vec<Entity>,
    index: HashMap<Uuid, usize>,
}

impl Table {
    fn upsert(&mut self, entity: Entity) -> Option<Entity> {
        match self.index.get(&entity.id) {
            Some(&pos) => Some(std::mem::replace(&mut self.rows[pos], entity)),
            None => {
                self.index.insert(entity.id, self.rows.len());
                self.rows.push(entity);
                None
            }
        }
    }

    fn remove(&mut self, id: Uuid) -> Option<Entity> {
        let pos = self.index.remove(&id)?;
        let removed = self.rows.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }
}

/// A thread-safe, in-memory entity store.
///
/// Records are kept per entity type in insertion order, which is also the
/// order `get_all` returns them in.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any record with the same type and id.
    ///
    /// Returns the replaced record.
    pub fn insert(&self, entity: Entity) -> Option<Entity> {
        let entity_name = entity.logical_name.to_lowercase();
        trace!(entity = %entity_name, id = %entity.id, "inserting record");
        self.tables
            .write()
            .entry(entity_name)
            .or_default()
            .upsert(entity)
    }

    /// Insert many records.
    pub fn insert_all(&self, entities: impl IntoIterator<Item = Entity>) {
        let mut tables = self.tables.write();
        for entity in entities {
            tables
                .entry(entity.logical_name.to_lowercase())
                .or_default()
                .upsert(entity);
        }
    }

    /// Remove a record, returning it.
    pub fn remove(&self, entity_name: &str, id: Uuid) -> Option<Entity> {
        self.tables
            .write()
            .get_mut(&entity_name.to_lowercase())?
            .remove(id)
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.tables.write().clear();
    }

    /// Number of records of an entity type.
    pub fn count(&self, entity_name: &str) -> usize {
        self.tables
            .read()
            .get(&entity_name.to_lowercase())
            .map_or(0, |t| t.rows.len())
    }
}

impl EntityStore for MemoryStore {
    fn get_all(&self, entity_name: &str) -> Vec<Entity> {
        self.tables
            .read()
            .get(&entity_name.to_lowercase())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn get_by_id(&self, entity_name: &str, id: Uuid) -> Option<Entity> {
        let tables = self.tables.read();
        let table = tables.get(&entity_name.to_lowercase())?;
        table.index.get(&id).map(|&pos| table.rows[pos].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> Entity {
        Entity::with_new_id("account").with_attribute("name", name)
    }

    #[test]
    fn test_insert_and_get() {
        let store = MemoryStore::new();
        let a = account("Contoso");
        let id = a.id;
        assert!(store.insert(a).is_none());

        let loaded = store.get_by_id("Account", id).unwrap();
        assert_eq!(loaded.get("name").and_then(|v| v.as_str()), Some("Contoso"));
        assert!(store.get_by_id("account", Uuid::new_v4()).is_none());
        assert!(store.get_by_id("contact", id).is_none());
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let store = MemoryStore::new();
        let first = account("First");
        let second = account("Second");
        let replacement = Entity::new("account", first.id).with_attribute("name", "Renamed");
        store.insert_all([first, second]);

        let replaced = store.insert(replacement).unwrap();
        assert_eq!(replaced.get("name").and_then(|v| v.as_str()), Some("First"));

        let names: Vec<_> = store
            .get_all("account")
            .iter()
            .filter_map(|e| e.get("name").and_then(|v| v.as_str()).map(String::from))
            .collect();
        assert_eq!(names, vec!["Renamed", "Second"]);
    }

    #[test]
    fn test_get_all_is_a_snapshot() {
        let store = MemoryStore::new();
        store.insert(account("Contoso"));

        let snapshot = store.get_all("account");
        store.insert(account("Fabrikam"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.count("account"), 2);
    }

    #[test]
    fn test_remove_keeps_index_consistent() {
        let store = MemoryStore::new();
        let a = account("A");
        let b = account("B");
        let c = account("C");
        let (a_id, c_id) = (a.id, c.id);
        store.insert_all([a, b, c]);

        assert!(store.remove("account", a_id).is_some());
        assert!(store.remove("account", a_id).is_none());
        let loaded = store.get_by_id("account", c_id).unwrap();
        assert_eq!(loaded.get("name").and_then(|v| v.as_str()), Some("C"));

        store.clear();
        assert_eq!(store.count("account"), 0);
        assert!(store.get_all("account").is_empty());
    }
}
