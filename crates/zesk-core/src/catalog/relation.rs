//! Relation definitions between classes.

use super::ClassDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Target of a has_one relation.
///
/// Written as a class name, or as `*column` to take the class name from
/// another column of the same instance at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HasOne {
    /// Fixed target class.
    Class(String),
    /// Target class read from the named column.
    Dynamic(String),
}

impl HasOne {
    /// Fixed target.
    pub fn class(name: impl Into<String>) -> Self {
        HasOne::Class(name.into())
    }

    /// Target class taken from `column`.
    pub fn dynamic(column: impl Into<String>) -> Self {
        HasOne::Dynamic(column.into())
    }

    /// Fixed class name, if any.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            HasOne::Class(name) => Some(name),
            HasOne::Dynamic(_) => None,
        }
    }
}

impl From<String> for HasOne {
    fn from(value: String) -> Self {
        match value.strip_prefix('*') {
            Some(column) => HasOne::Dynamic(column.to_string()),
            None => HasOne::Class(value),
        }
    }
}

impl From<&str> for HasOne {
    fn from(value: &str) -> Self {
        HasOne::from(value.to_string())
    }
}

impl From<HasOne> for String {
    fn from(value: HasOne) -> Self {
        value.to_string()
    }
}

impl fmt::Display for HasOne {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HasOne::Class(name) => f.write_str(name),
            HasOne::Dynamic(column) => write!(f, "*{}", column),
        }
    }
}

/// One-to-many relation: rows of `class` whose `foreign_key` holds our id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HasMany {
    /// Target class name.
    pub class: String,
    /// Column on the target class referring back to this class.
    ///
    /// Empty means "the source class's code name" and is filled in on registration.
    #[serde(default)]
    pub foreign_key: String,
    /// Column on the target class identifying the far object, if different from its id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub far_key: Option<String>,
}

impl HasMany {
    /// Create a has_many relation.
    pub fn new(class: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            foreign_key: foreign_key.into(),
            far_key: None,
        }
    }

    /// Set the far key.
    pub fn with_far_key(mut self, far_key: impl Into<String>) -> Self {
        self.far_key = Some(far_key.into());
        self
    }
}

/// Relation cardinality as seen from the source class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// has_one: a column on the source holds the target id.
    One,
    /// has_many: a column on the target holds the source id.
    Many,
}

/// A relation whose target class has been looked up.
#[derive(Debug, Clone)]
pub struct ResolvedRelation {
    /// Relation name on the source class.
    pub name: String,
    /// Cardinality.
    pub kind: RelationKind,
    /// Source class name.
    pub source: String,
    /// Target descriptor.
    pub target: Arc<ClassDescriptor>,
    /// Column on the target referring to the source (has_many only).
    pub foreign_key: Option<String>,
    /// Far key on the target (has_many only).
    pub far_key: Option<String>,
}

impl ResolvedRelation {
    /// Target class name.
    pub fn target_class(&self) -> &str {
        &self.target.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_one_parse() {
        assert_eq!(HasOne::from("Contact_Person"), HasOne::class("Contact_Person"));
        assert_eq!(HasOne::from("*Related_Class"), HasOne::dynamic("Related_Class"));
        assert_eq!(HasOne::dynamic("kind").to_string(), "*kind");
        assert_eq!(HasOne::dynamic("kind").class_name(), None);
    }

    #[test]
    fn test_has_one_serde() {
        let one: HasOne = serde_json::from_str("\"*Owner_Class\"").unwrap();
        assert_eq!(one, HasOne::dynamic("Owner_Class"));
        assert_eq!(serde_json::to_string(&one).unwrap(), "\"*Owner_Class\"");
    }

    #[test]
    fn test_has_many_defaults() {
        let many: HasMany = serde_json::from_str(r#"{"class": "Contact_Email"}"#).unwrap();
        assert_eq!(many.class, "Contact_Email");
        assert!(many.foreign_key.is_empty());
        assert!(many.far_key.is_none());

        let many = HasMany::new("Contact_Tag", "contact").with_far_key("tag");
        assert_eq!(many.far_key.as_deref(), Some("tag"));
    }
}
