//! Runtime attribute values.
//!
//! Every attribute on a record holds one [`Value`]. The enum is closed: the
//! comparison, coercion and cloning code in the engine matches on it
//! exhaustively, so a new kind has to be handled everywhere it is added.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::Entity;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Two-option (boolean) value.
    Bool(bool),
    /// 32-bit whole number.
    Int(i32),
    /// 64-bit whole number.
    BigInt(i64),
    /// Floating point number.
    Double(f64),
    /// Fixed-precision decimal number.
    Decimal(BigDecimal),
    /// Single or multiple lines of text.
    String(String),
    /// Date and time, always UTC.
    DateTime(DateTime<Utc>),
    /// Unique identifier.
    Guid(Uuid),
    /// Binary payload (images, files).
    Bytes(Vec<u8>),
    /// Reference to another record.
    Reference(EntityReference),
    /// Single option-set code.
    OptionSet(OptionSetValue),
    /// Currency amount.
    Money(Money),
    /// Multi-select option-set codes.
    MultiOptionSet(OptionSetValueCollection),
    /// Nested records (party lists).
    EntityCollection(Vec<Entity>),
    /// Column merged in from a joined entity.
    Aliased(Box<AliasedValue>),
}

impl Value {
    /// Check if this value is null.
    ///
    /// An aliased value wrapping null is also null.
    pub fn is_null(&self) -> bool {
        matches!(self.unaliased(), Value::Null)
    }

    /// Strip any [`AliasedValue`] wrapping, returning the payload.
    pub fn unaliased(&self) -> &Value {
        match self {
            Value::Aliased(aliased) => aliased.value.unaliased(),
            other => other,
        }
    }

    /// Consume the value, stripping any [`AliasedValue`] wrapping.
    pub fn into_unaliased(self) -> Value {
        match self {
            Value::Aliased(aliased) => aliased.value.into_unaliased(),
            other => other,
        }
    }

    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::BigInt(_) => "bigint",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Guid(_) => "guid",
            Value::Bytes(_) => "binary",
            Value::Reference(_) => "entity reference",
            Value::OptionSet(_) => "option set",
            Value::Money(_) => "money",
            Value::MultiOptionSet(_) => "multi-select option set",
            Value::EntityCollection(_) => "entity collection",
            Value::Aliased(_) => "aliased value",
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self.unaliased() {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64, widening 32-bit integers and option codes.
    pub fn as_i64(&self) -> Option<i64> {
        match self.unaliased() {
            Value::Int(i) => Some(i64::from(*i)),
            Value::BigInt(i) => Some(*i),
            Value::OptionSet(o) => Some(i64::from(o.value())),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self.unaliased() {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a date-time.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self.unaliased() {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Try to get an identifier, from either a GUID or a reference.
    pub fn as_guid(&self) -> Option<Uuid> {
        match self.unaliased() {
            Value::Guid(id) => Some(*id),
            Value::Reference(r) => Some(r.id),
            _ => None,
        }
    }

    /// Try to get as an entity reference.
    pub fn as_reference(&self) -> Option<&EntityReference> {
        match self.unaliased() {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Try to get as bytes reference.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.unaliased() {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::BigInt(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Guid(id) => write!(f, "{id}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Reference(r) => write!(f, "{}({})", r.logical_name, r.id),
            Value::OptionSet(o) => write!(f, "{}", o.value()),
            Value::Money(m) => write!(f, "{}", m.value()),
            Value::MultiOptionSet(set) => {
                let codes: Vec<String> = set.codes().iter().map(|c| c.to_string()).collect();
                write!(f, "[{}]", codes.join(","))
            }
            Value::EntityCollection(entities) => write!(f, "<{} records>", entities.len()),
            Value::Aliased(aliased) => aliased.value.fmt(f),
        }
    }
}

/// A reference to a record of another entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReference {
    /// Logical name of the referenced entity type.
    pub logical_name: String,
    /// Identifier of the referenced record.
    pub id: Uuid,
    /// Cached display name of the referenced record.
    pub name: Option<String>,
    /// Alternate-key attributes identifying the record.
    pub key_attributes: BTreeMap<String, Value>,
}

impl EntityReference {
    /// Create a reference by logical name and id.
    pub fn new(logical_name: impl Into<String>, id: Uuid) -> Self {
        Self {
            logical_name: logical_name.into().to_lowercase(),
            id,
            name: None,
            key_attributes: BTreeMap::new(),
        }
    }

    /// Set the cached display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add an alternate-key attribute.
    pub fn with_key(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.key_attributes
            .insert(attribute.into().to_lowercase(), value.into());
        self
    }
}

/// A single option-set code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptionSetValue(pub i32);

impl OptionSetValue {
    /// Create an option value.
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    /// The integer code.
    pub fn value(&self) -> i32 {
        self.0
    }
}

/// A currency amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money(pub BigDecimal);

impl Money {
    /// Create a money value.
    pub fn new(value: impl Into<BigDecimal>) -> Self {
        Self(value.into())
    }

    /// The decimal amount.
    pub fn value(&self) -> &BigDecimal {
        &self.0
    }
}

/// The codes selected on a multi-select option set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OptionSetValueCollection(pub Vec<OptionSetValue>);

impl OptionSetValueCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a collection from raw codes.
    pub fn from_codes(codes: impl IntoIterator<Item = i32>) -> Self {
        Self(codes.into_iter().map(OptionSetValue).collect())
    }

    /// The distinct codes, ignoring order and duplicates.
    pub fn codes(&self) -> BTreeSet<i32> {
        self.0.iter().map(|o| o.value()).collect()
    }

    /// Check whether a code is selected.
    pub fn contains(&self, code: i32) -> bool {
        self.0.iter().any(|o| o.value() == code)
    }

    /// Add a code.
    pub fn push(&mut self, value: OptionSetValue) {
        self.0.push(value);
    }

    /// Number of selected codes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no code is selected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A column merged onto a row from a joined entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasedValue {
    /// Logical name of the joined entity type.
    pub entity_logical_name: String,
    /// Attribute name on the joined entity.
    pub attribute_logical_name: String,
    /// The wrapped value.
    pub value: Value,
}

impl AliasedValue {
    /// Wrap a value with its provenance.
    pub fn new(
        entity_logical_name: impl Into<String>,
        attribute_logical_name: impl Into<String>,
        value: Value,
    ) -> Self {
        Self {
            entity_logical_name: entity_logical_name.into(),
            attribute_logical_name: attribute_logical_name.into(),
            value,
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<BigDecimal> for Value {
    fn from(v: BigDecimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<EntityReference> for Value {
    fn from(v: EntityReference) -> Self {
        Value::Reference(v)
    }
}

impl From<OptionSetValue> for Value {
    fn from(v: OptionSetValue) -> Self {
        Value::OptionSet(v)
    }
}

impl From<Money> for Value {
    fn from(v: Money) -> Self {
        Value::Money(v)
    }
}

impl From<OptionSetValueCollection> for Value {
    fn from(v: OptionSetValueCollection) -> Self {
        Value::MultiOptionSet(v)
    }
}

impl From<Vec<Entity>> for Value {
    fn from(v: Vec<Entity>) -> Self {
        Value::EntityCollection(v)
    }
}

impl From<AliasedValue> for Value {
    fn from(v: AliasedValue) -> Self {
        Value::Aliased(Box::new(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
