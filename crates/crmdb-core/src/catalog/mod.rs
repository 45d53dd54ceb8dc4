//! Metadata catalog for CRMDB.
//!
//! The catalog stores entity definitions: each entity's attributes with
//! their declared types, its primary-key attribute and its display-name
//! attribute. The query engine reads it through the [`MetadataLookup`] trait.

mod attribute;
mod catalog;
mod entity;
mod schema;
mod types;

pub use attribute::{AttributeDef, OptionMetadata};
pub use catalog::Catalog;
pub use entity::EntityDef;
pub use schema::SchemaBundle;
pub use types::AttributeType;

/// Read access to entity metadata.
///
/// Implementations must be safe to share across threads: several queries may
/// look up metadata concurrently.
pub trait MetadataLookup: Send + Sync {
    /// Get the definition of an entity type, or `None` if it is unknown.
    ///
    /// Names are matched case-insensitively.
    fn entity_metadata(&self, entity_name: &str) -> Option<EntityDef>;
}

impl MetadataLookup for SchemaBundle {
    fn entity_metadata(&self, entity_name: &str) -> Option<EntityDef> {
        self.get_entity(entity_name).cloned()
    }
}
