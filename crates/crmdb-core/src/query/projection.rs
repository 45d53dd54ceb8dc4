//! Result projection.
//!
//! The [`Projector`] turns a filtered, joined row into an output record:
//! it selects the requested columns, deep-clones their values, fills missing
//! formatted values from metadata labels and strips nulls.

use std::collections::BTreeMap;

use crmdb_proto::{AliasedValue, ColumnSet, Entity, EntityReference, Value};

use crate::catalog::{AttributeDef, EntityDef, MetadataLookup};
use crate::error::Error;
use crate::storage::EntityStore;

/// Separator between the labels of a multi-select formatted value.
pub const MULTI_SELECT_LABEL_SEPARATOR: &str = "; ";

/// Projects rows of one query.
pub struct Projector<'a> {
    store: &'a dyn EntityStore,
    metadata: &'a dyn MetadataLookup,
    entity: &'a EntityDef,
    aliases: &'a BTreeMap<String, EntityDef>,
    columns: &'a ColumnSet,
}

impl<'a> Projector<'a> {
    /// Create a projector for `entity`'s rows.
    ///
    /// In strict mode every explicitly requested column must exist in
    /// metadata.
    pub fn new(
        store: &'a dyn EntityStore,
        metadata: &'a dyn MetadataLookup,
        entity: &'a EntityDef,
        aliases: &'a BTreeMap<String, EntityDef>,
        columns: &'a ColumnSet,
        strict: bool,
    ) -> Result<Self, Error> {
        if strict {
            if let ColumnSet::Columns(names) = columns {
                for name in names {
                    if !entity.has_attribute(name) {
                        return Err(Error::unknown_attribute(&entity.logical_name, name));
                    }
                }
            }
        }
        Ok(Self {
            store,
            metadata,
            entity,
            aliases,
            columns,
        })
    }

    /// Project one row.
    ///
    /// The primary-id attribute is always present in the output. Columns
    /// merged from link entities are kept as they are: each link already
    /// merged only its own requested columns.
    pub fn project(&self, row: &Entity) -> Entity {
        let mut out = Entity::new(row.logical_name.clone(), row.id);

        for (name, value) in &row.attributes {
            if !self.selected(name) {
                continue;
            }
            let value = self.clone_value(value);
            if value.unaliased().is_null() {
                continue;
            }
            if let Some(formatted) = row.formatted_values.get(name) {
                out.formatted_values.insert(name.clone(), formatted.clone());
            } else if let Some(label) = self.label(name, &value) {
                out.formatted_values.insert(name.clone(), label);
            }
            out.attributes.insert(name.clone(), value);
        }

        out.attributes
            .entry(self.entity.primary_id_attribute.clone())
            .or_insert(Value::Guid(row.id));
        out
    }

    fn selected(&self, name: &str) -> bool {
        let linked = name
            .split_once('.')
            .is_some_and(|(alias, _)| self.aliases.contains_key(alias));
        linked
            || name == self.entity.primary_id_attribute
            || self.columns.contains(name)
    }

    /// Definition of a row column, looking through link aliases.
    fn attribute_def(&self, name: &str) -> Option<&AttributeDef> {
        match name.split_once('.') {
            None => self.entity.get_attribute(name),
            Some((alias, attribute)) => self.aliases.get(alias)?.get_attribute(attribute),
        }
    }

    /// Formatted value derived from option labels in metadata.
    fn label(&self, name: &str, value: &Value) -> Option<String> {
        let definition = self.attribute_def(name)?;
        if !definition.attribute_type.has_labels() {
            return None;
        }
        match value.unaliased() {
            Value::OptionSet(option) => definition.label_for(option.value()).map(str::to_string),
            Value::Bool(b) => definition.label_for(i32::from(*b)).map(str::to_string),
            Value::MultiOptionSet(set) => {
                let labels: Vec<&str> = set
                    .codes()
                    .into_iter()
                    .filter_map(|code| definition.label_for(code))
                    .collect();
                if labels.is_empty() {
                    None
                } else {
                    Some(labels.join(MULTI_SELECT_LABEL_SEPARATOR))
                }
            }
            _ => None,
        }
    }

    /// Deep-clone a value for output.
    ///
    /// References get their display name refreshed from the referenced
    /// record when it is stored and its entity has a primary-name attribute;
    /// otherwise the cached name is kept. Nested records are cloned
    /// attribute by attribute.
    pub fn clone_value(&self, value: &Value) -> Value {
        match value {
            Value::Reference(reference) => Value::Reference(self.clone_reference(reference)),
            Value::EntityCollection(records) => Value::EntityCollection(
                records.iter().map(|record| self.clone_record(record)).collect(),
            ),
            Value::Aliased(aliased) => Value::Aliased(Box::new(AliasedValue::new(
                aliased.entity_logical_name.clone(),
                aliased.attribute_logical_name.clone(),
                self.clone_value(&aliased.value),
            ))),
            other => other.clone(),
        }
    }

    fn clone_reference(&self, reference: &EntityReference) -> EntityReference {
        let mut cloned = EntityReference::new(reference.logical_name.clone(), reference.id);
        cloned.key_attributes = reference.key_attributes.clone();
        cloned.name = self.display_name(reference).or_else(|| reference.name.clone());
        cloned
    }

    fn display_name(&self, reference: &EntityReference) -> Option<String> {
        let definition = self.metadata.entity_metadata(&reference.logical_name)?;
        let name_attribute = definition.primary_name_attribute.as_deref()?;
        let record = self.store.get_by_id(&reference.logical_name, reference.id)?;
        record
            .get(name_attribute)
            .and_then(|value| value.unaliased().as_str())
            .map(str::to_string)
    }

    fn clone_record(&self, record: &Entity) -> Entity {
        let mut cloned = Entity::new(record.logical_name.clone(), record.id);
        for (name, value) in &record.attributes {
            cloned.attributes.insert(name.clone(), self.clone_value(value));
        }
        cloned.formatted_values = record.formatted_values.clone();
        cloned
    }
}
