//! Attribute definitions for entities.

use serde::{Deserialize, Serialize};

use super::types::AttributeType;

/// An attribute definition within an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Attribute logical name (lowercase).
    pub name: String,
    /// Declared type.
    pub attribute_type: AttributeType,
    /// Entity types a reference attribute may point at.
    pub targets: Vec<String>,
    /// Option labels for option-set and boolean attributes.
    pub options: Vec<OptionMetadata>,
}

/// One option of an option set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionMetadata {
    /// Integer code (0/1 for booleans).
    pub value: i32,
    /// Display label.
    pub label: String,
}

impl OptionMetadata {
    /// Create an option.
    pub fn new(value: i32, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }
}

impl AttributeDef {
    /// Create an attribute definition.
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into().to_lowercase(),
            attribute_type,
            targets: Vec::new(),
            options: Vec::new(),
        }
    }

    /// Create a lookup pointing at the given entity types.
    pub fn lookup<S: Into<String>>(
        name: impl Into<String>,
        targets: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(name, AttributeType::Lookup).with_targets(targets)
    }

    /// Set the reference targets.
    pub fn with_targets<S: Into<String>>(mut self, targets: impl IntoIterator<Item = S>) -> Self {
        self.targets = targets
            .into_iter()
            .map(|t| t.into().to_lowercase())
            .collect();
        self
    }

    /// Add an option label.
    pub fn with_option(mut self, value: i32, label: impl Into<String>) -> Self {
        self.options.push(OptionMetadata::new(value, label));
        self
    }

    /// Get the label of an option code.
    pub fn label_for(&self, value: i32) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_def_builder() {
        let attr = AttributeDef::new("StatusCode", AttributeType::Status)
            .with_option(1, "Active")
            .with_option(2, "Inactive");

        assert_eq!(attr.name, "statuscode");
        assert_eq!(attr.label_for(2), Some("Inactive"));
        assert_eq!(attr.label_for(3), None);
    }

    #[test]
    fn test_lookup_targets() {
        let attr = AttributeDef::lookup("parentcustomerid", ["Account", "Contact"]);
        assert_eq!(attr.attribute_type, AttributeType::Lookup);
        assert_eq!(attr.targets, vec!["account", "contact"]);
    }
}
