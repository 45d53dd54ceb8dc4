//! Type-aware value comparison.
//!
//! Attribute values and literals are lowered to a [`Key`] before they are
//! compared. All numeric kinds share one decimal representation, references
//! compare by id, and multi-select sets compare as sets.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use crmdb_proto::Value;
use uuid::Uuid;

use crate::catalog::AttributeType;
use crate::error::Error;

/// A value lowered for comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// Boolean.
    Bool(bool),
    /// Any numeric kind, option codes included.
    Number(BigDecimal),
    /// Text.
    Text(String),
    /// Instant.
    Date(DateTime<Utc>),
    /// Identifier or reference id.
    Guid(Uuid),
    /// Binary payload.
    Bytes(Vec<u8>),
    /// Multi-select codes.
    Set(BTreeSet<i32>),
}

impl Key {
    /// Lower a stored value. Returns `None` for null.
    pub fn from_value(value: &Value, attribute: &str) -> Result<Option<Key>, Error> {
        let key = match value.unaliased() {
            Value::Null => return Ok(None),
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(i) => Key::Number(BigDecimal::from(*i)),
            Value::BigInt(i) => Key::Number(BigDecimal::from(*i)),
            Value::Double(d) => Key::Number(double_to_decimal(*d, attribute)?),
            Value::Decimal(d) => Key::Number(d.clone()),
            Value::Money(m) => Key::Number(m.value().clone()),
            Value::OptionSet(o) => Key::Number(BigDecimal::from(o.value())),
            Value::String(s) => Key::Text(s.clone()),
            Value::DateTime(dt) => Key::Date(*dt),
            Value::Guid(id) => Key::Guid(*id),
            Value::Reference(r) => Key::Guid(r.id),
            Value::Bytes(b) => Key::Bytes(b.clone()),
            Value::MultiOptionSet(set) => Key::Set(set.codes()),
            other @ (Value::EntityCollection(_) | Value::Aliased(_)) => {
                return Err(Error::unsupported(attribute, other.kind()))
            }
        };
        Ok(Some(key))
    }

    /// Lower a stored value, checking it against the declared type.
    pub fn from_record(
        value: &Value,
        attribute_type: Option<AttributeType>,
        attribute: &str,
    ) -> Result<Option<Key>, Error> {
        let key = match Self::from_value(value, attribute)? {
            Some(key) => key,
            None => return Ok(None),
        };
        if let Some(attribute_type) = attribute_type {
            if !key.fits(attribute_type) {
                return Err(Error::unsupported(attribute, value.unaliased().kind()));
            }
        }
        Ok(Some(key))
    }

    /// Coerce a query literal to the declared type of its attribute.
    pub fn coerce(
        value: &Value,
        attribute_type: Option<AttributeType>,
        attribute: &str,
    ) -> Result<Key, Error> {
        let value = value.unaliased();
        let unsupported = || Error::unsupported(attribute, value.kind());

        let attribute_type = match attribute_type {
            Some(t) => t,
            None => return Self::from_value(value, attribute)?.ok_or_else(unsupported),
        };

        let key = match attribute_type {
            AttributeType::Integer
            | AttributeType::BigInt
            | AttributeType::Double
            | AttributeType::Decimal
            | AttributeType::Money
            | AttributeType::Picklist
            | AttributeType::State
            | AttributeType::Status => Key::Number(number_literal(value, attribute)?),
            AttributeType::Boolean => match value {
                Value::Bool(b) => Key::Bool(*b),
                Value::Int(0) | Value::BigInt(0) => Key::Bool(false),
                Value::Int(1) | Value::BigInt(1) => Key::Bool(true),
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "1" => Key::Bool(true),
                    "false" | "0" => Key::Bool(false),
                    _ => return Err(unsupported()),
                },
                _ => return Err(unsupported()),
            },
            AttributeType::String | AttributeType::Memo => match value {
                Value::String(s) => Key::Text(s.clone()),
                Value::Bool(_)
                | Value::Int(_)
                | Value::BigInt(_)
                | Value::Double(_)
                | Value::Decimal(_)
                | Value::Guid(_) => Key::Text(value.to_string()),
                _ => return Err(unsupported()),
            },
            AttributeType::DateTime => match value {
                Value::DateTime(dt) => Key::Date(*dt),
                Value::String(s) => Key::Date(parse_datetime(s).ok_or_else(unsupported)?),
                _ => return Err(unsupported()),
            },
            AttributeType::Uniqueidentifier
            | AttributeType::Lookup
            | AttributeType::Customer
            | AttributeType::Owner => match value {
                Value::Guid(id) => Key::Guid(*id),
                Value::Reference(r) => Key::Guid(r.id),
                Value::String(s) => Key::Guid(Uuid::parse_str(s).map_err(|_| unsupported())?),
                _ => return Err(unsupported()),
            },
            AttributeType::MultiSelectPicklist => match value {
                Value::MultiOptionSet(set) => Key::Set(set.codes()),
                _ => Key::Number(number_literal(value, attribute)?),
            },
            AttributeType::Binary => match value {
                Value::Bytes(b) => Key::Bytes(b.clone()),
                _ => return Err(unsupported()),
            },
            AttributeType::PartyList => return Err(unsupported()),
        };
        Ok(key)
    }

    /// Check whether this key is the kind stored for a declared type.
    pub fn fits(&self, attribute_type: AttributeType) -> bool {
        match attribute_type {
            AttributeType::Integer
            | AttributeType::BigInt
            | AttributeType::Double
            | AttributeType::Decimal
            | AttributeType::Money
            | AttributeType::Picklist
            | AttributeType::State
            | AttributeType::Status => matches!(self, Key::Number(_)),
            AttributeType::Boolean => matches!(self, Key::Bool(_)),
            AttributeType::String | AttributeType::Memo => matches!(self, Key::Text(_)),
            AttributeType::DateTime => matches!(self, Key::Date(_)),
            AttributeType::Uniqueidentifier
            | AttributeType::Lookup
            | AttributeType::Customer
            | AttributeType::Owner => matches!(self, Key::Guid(_)),
            AttributeType::MultiSelectPicklist => matches!(self, Key::Set(_)),
            AttributeType::Binary => matches!(self, Key::Bytes(_)),
            AttributeType::PartyList => false,
        }
    }

    /// The integer code of a numeric key, if it is a whole `i32`.
    pub fn as_code(&self) -> Option<i32> {
        match self {
            Key::Number(n) if n.is_integer() => n.with_scale(0).to_string().parse().ok(),
            _ => None,
        }
    }

    /// The instant of a date key.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Key::Date(dt) => Some(*dt),
            _ => None,
        }
    }
}

/// Compare two keys of the same kind. Keys of different kinds do not compare.
pub fn compare_keys(a: &Key, b: &Key, case_sensitive: bool) -> Option<Ordering> {
    match (a, b) {
        (Key::Bool(a), Key::Bool(b)) => Some(a.cmp(b)),
        (Key::Number(a), Key::Number(b)) => Some(a.cmp(b)),
        (Key::Text(a), Key::Text(b)) => {
            if case_sensitive {
                Some(a.cmp(b))
            } else {
                Some(a.to_lowercase().cmp(&b.to_lowercase()))
            }
        }
        (Key::Date(a), Key::Date(b)) => Some(a.cmp(b)),
        (Key::Guid(a), Key::Guid(b)) => Some(a.cmp(b)),
        (Key::Bytes(a), Key::Bytes(b)) => Some(a.cmp(b)),
        (Key::Set(a), Key::Set(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Check two keys for equality.
pub fn keys_equal(a: &Key, b: &Key, case_sensitive: bool) -> bool {
    compare_keys(a, b, case_sensitive) == Some(Ordering::Equal)
}

/// Compare two optional keys for sorting. Nulls sort first; keys of
/// different kinds are considered equal.
pub fn compare_for_sort(a: Option<&Key>, b: Option<&Key>, case_sensitive: bool) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less, // NULLs first
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_keys(a, b, case_sensitive).unwrap_or(Ordering::Equal),
    }
}

fn double_to_decimal(value: f64, attribute: &str) -> Result<BigDecimal, Error> {
    BigDecimal::from_str(&value.to_string()).map_err(|_| Error::unsupported(attribute, "double"))
}

fn number_literal(value: &Value, attribute: &str) -> Result<BigDecimal, Error> {
    match value {
        Value::Int(i) => Ok(BigDecimal::from(*i)),
        Value::BigInt(i) => Ok(BigDecimal::from(*i)),
        Value::Double(d) => double_to_decimal(*d, attribute),
        Value::Decimal(d) => Ok(d.clone()),
        Value::Money(m) => Ok(m.value().clone()),
        Value::OptionSet(o) => Ok(BigDecimal::from(o.value())),
        Value::String(s) => {
            BigDecimal::from_str(s.trim()).map_err(|_| Error::unsupported(attribute, "string"))
        }
        other => Err(Error::unsupported(attribute, other.kind())),
    }
}

/// Parse an RFC 3339 instant or a plain `YYYY-MM-DD` date (as UTC midnight).
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
