//! Result types for query responses.

use serde::{Deserialize, Serialize};

use crate::entity::Entity;

/// The rows returned by one query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityCollection {
    /// Root entity type of the query.
    pub entity_name: String,
    /// Projected rows, in result order.
    pub entities: Vec<Entity>,
    /// Whether rows exist beyond the returned page.
    pub more_records: bool,
    /// Opaque cookie to pass with the next page request.
    pub paging_cookie: Option<String>,
    /// Total number of matching rows before paging, when requested.
    pub total_record_count: Option<usize>,
}

impl EntityCollection {
    /// Create an empty collection.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            ..Default::default()
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }
}

impl IntoIterator for EntityCollection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}
