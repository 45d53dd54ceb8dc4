//! Core error types.

use thiserror::Error;

/// Query engine errors.
///
/// Every variant is fatal to the query that raised it: the executor never
/// returns partial results.
#[derive(Debug, Error)]
pub enum Error {
    /// Root or linked entity type is not in the metadata.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Attribute is not declared on the entity while strict validation is on.
    #[error("unknown attribute '{attribute}' on entity '{entity}'")]
    UnknownAttribute {
        /// Entity the attribute was looked up on.
        entity: String,
        /// Offending attribute name.
        attribute: String,
    },

    /// Fiscal period number outside the template's range.
    #[error("invalid fiscal period {period}: template has {periods} periods")]
    InvalidFiscalPeriod {
        /// Requested period.
        period: i64,
        /// Number of periods in the configured template.
        periods: u32,
    },

    /// A value cannot be compared or converted as the attribute's declared type.
    #[error("unsupported value of kind '{kind}' for attribute '{attribute}'")]
    UnsupportedValueType {
        /// Attribute holding the value.
        attribute: String,
        /// Kind of the offending value.
        kind: String,
    },

    /// Query descriptor is malformed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Paging cookie cannot be decoded.
    #[error("invalid paging cookie: {0}")]
    InvalidPagingCookie(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] crmdb_proto::Error),
}

impl Error {
    /// Build an [`Error::UnknownAttribute`].
    pub fn unknown_attribute(entity: impl Into<String>, attribute: impl Into<String>) -> Self {
        Error::UnknownAttribute {
            entity: entity.into(),
            attribute: attribute.into(),
        }
    }

    /// Build an [`Error::UnsupportedValueType`].
    pub fn unsupported(attribute: impl Into<String>, kind: impl Into<String>) -> Self {
        Error::UnsupportedValueType {
            attribute: attribute.into(),
            kind: kind.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::unknown_attribute("account", "revenue2");
        assert_eq!(
            err.to_string(),
            "unknown attribute 'revenue2' on entity 'account'"
        );

        let err = Error::InvalidFiscalPeriod {
            period: 5,
            periods: 4,
        };
        assert_eq!(
            err.to_string(),
            "invalid fiscal period 5: template has 4 periods"
        );

        let err: Error = crmdb_proto::Error::InvalidQuery("bad".into()).into();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
