//! Entity storage for CRMDB.
//!
//! The query engine reads records through the [`EntityStore`] trait. The
//! provided [`MemoryStore`] keeps every record in memory behind a
//! `parking_lot` lock and hands out point-in-time snapshots.

mod memory;

pub use memory::MemoryStore;

use crmdb_proto::{Entity, Value};
use uuid::Uuid;

use crate::catalog::EntityDef;

/// Read access to stored records.
pub trait EntityStore: Send + Sync {
    /// Get every record of an entity type.
    ///
    /// The returned vector is a snapshot: later writes to the store are not
    /// visible through it.
    fn get_all(&self, entity_name: &str) -> Vec<Entity>;

    /// Get one record by id, or `None` if it does not exist.
    fn get_by_id(&self, entity_name: &str, id: Uuid) -> Option<Entity>;
}

/// Load a snapshot of every record of `entity`, ready for evaluation.
///
/// A record whose primary-id attribute is absent reads it as the record's
/// own id.
pub fn snapshot(store: &dyn EntityStore, entity: &EntityDef) -> Vec<Entity> {
    let mut records = store.get_all(&entity.logical_name);
    for record in &mut records {
        let id = record.id;
        record
            .attributes
            .entry(entity.primary_id_attribute.clone())
            .or_insert(Value::Guid(id));
    }
    records
}
