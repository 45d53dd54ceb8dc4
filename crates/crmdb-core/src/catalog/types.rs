//! Attribute type definitions for the catalog.

use serde::{Deserialize, Serialize};

/// Declared type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeType {
    /// Two options.
    Boolean,
    /// 32-bit whole number.
    Integer,
    /// 64-bit whole number.
    BigInt,
    /// Floating point number.
    Double,
    /// Fixed-precision decimal.
    Decimal,
    /// Currency.
    Money,
    /// Single line of text.
    String,
    /// Multiple lines of text.
    Memo,
    /// Date and time.
    DateTime,
    /// Unique identifier.
    Uniqueidentifier,
    /// Reference to another entity.
    Lookup,
    /// Reference to an account or contact.
    Customer,
    /// Reference to a user or team.
    Owner,
    /// Option set.
    Picklist,
    /// Record state option set.
    State,
    /// Record status option set.
    Status,
    /// Multi-select option set.
    MultiSelectPicklist,
    /// Image or file payload.
    Binary,
    /// List of activity parties.
    PartyList,
}

impl AttributeType {
    /// Check if this type compares numerically.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AttributeType::Integer
                | AttributeType::BigInt
                | AttributeType::Double
                | AttributeType::Decimal
                | AttributeType::Money
        )
    }

    /// Check if this type holds text.
    pub fn is_text(&self) -> bool {
        matches!(self, AttributeType::String | AttributeType::Memo)
    }

    /// Check if this type holds a reference to another record.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            AttributeType::Lookup | AttributeType::Customer | AttributeType::Owner
        )
    }

    /// Check if this type holds a single option code.
    pub fn is_option_set(&self) -> bool {
        matches!(
            self,
            AttributeType::Picklist | AttributeType::State | AttributeType::Status
        )
    }

    /// Check if formatted values for this type come from option labels.
    pub fn has_labels(&self) -> bool {
        self.is_option_set()
            || matches!(
                self,
                AttributeType::Boolean | AttributeType::MultiSelectPicklist
            )
    }
}
