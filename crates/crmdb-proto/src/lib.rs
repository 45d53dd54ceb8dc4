//! CRMDB protocol types.
//!
//! This crate defines the data model shared by callers and the query engine:
//! typed attribute values, stored records, query descriptors and result
//! collections. Every type derives serde's `Serialize`/`Deserialize` so that
//! queries and results can be logged, persisted or sent over the wire as JSON.
//!
//! # Modules
//!
//! - [`value`] - Attribute values and their wrapper types
//! - [`entity`] - Stored records
//! - [`query`] - Query descriptors (filters, joins, ordering, paging)
//! - [`result`] - Query results
//! - [`error`] - Protocol error types

pub mod entity;
pub mod error;
pub mod query;
pub mod result;
pub mod value;

pub use entity::Entity;
pub use error::Error;

// Re-export commonly used types at crate root
pub use query::{
    Arity, ColumnSet, ConditionExpression, ConditionOperator, FilterExpression, JoinOperator,
    LinkEntity, LogicalOperator, OrderExpression, OrderType, PagingInfo, QueryByAttribute,
    QueryExpression,
};
pub use result::EntityCollection;
pub use value::{
    AliasedValue, EntityReference, Money, OptionSetValue, OptionSetValueCollection, Value,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_json_roundtrip() {
        let query = QueryExpression::new("account")
            .with_columns(ColumnSet::new(["name"]))
            .with_condition(ConditionExpression::eq("statecode", OptionSetValue(0)))
            .link("contact", "primarycontactid", "contactid", JoinOperator::LeftOuter)
            .with_order(OrderExpression::desc("name"))
            .with_paging(PagingInfo::new(2, 25));

        let json = serde_json::to_string(&query).unwrap();
        let decoded: QueryExpression = serde_json::from_str(&json).unwrap();
        assert_eq!(query, decoded);
    }

    #[test]
    fn test_decode_error_maps_to_deserialization() {
        let err: Error = serde_json::from_str::<QueryExpression>("{").unwrap_err().into();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
