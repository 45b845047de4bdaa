//! Core error types.

use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A class descriptor failed registration-time validation.
    #[error("malformed descriptor for {class}: {reason}")]
    MalformedDescriptor { class: String, reason: String },

    /// Relation name is neither a has_one nor a has_many of the class.
    #[error("unknown relation {relation} on {class}")]
    UnknownRelation { class: String, relation: String },

    /// A referenced class was never registered.
    #[error("unknown class {0}")]
    UnknownClass(String),

    /// A has_many foreign key does not name a column of the target class.
    #[error("invalid foreign key {foreign_key} for {class}.{relation}: no such column on {target}")]
    InvalidForeignKey {
        class: String,
        relation: String,
        target: String,
        foreign_key: String,
    },

    /// Fetch found no matching row.
    #[error("{class} not found ({key})")]
    NotFound { class: String, key: String },

    /// A column value violates its column type; nothing was written.
    #[error("validation failed for {class}.{column}: {reason}")]
    Validation {
        class: String,
        column: String,
        reason: String,
    },

    /// Insert found a row with the same key.
    #[error("duplicate key {key} in {table}")]
    DuplicateKey { table: String, key: String },

    /// Store would create a second object with the same duplicate keys.
    #[error("{class} already exists with {keys}")]
    Duplicate { class: String, keys: String },

    /// Column is not declared on the class.
    #[error("unknown column {column} on {class}")]
    UnknownColumn { class: String, column: String },

    /// Module was never registered.
    #[error("unknown module {0}")]
    UnknownModule(String),

    /// A module requires another module that is not loaded.
    #[error("module {module} requires {requires}, which is not loaded")]
    MissingDependency { module: String, requires: String },

    /// A hook callback id was registered twice with `no_duplicates`.
    #[error("duplicate registration of hook {hook} callback {id}")]
    DuplicateHook { hook: String, id: String },

    /// A callback of a fail-fast hook failed.
    #[error("hook {hook} callback {id} failed: {source}")]
    HookFailed {
        hook: String,
        id: String,
        #[source]
        source: crate::hooks::HookError,
    },

    /// Registration attempted after the application booted.
    #[error("application is booted; {0} is read-only")]
    Sealed(&'static str),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Storage value error.
    #[error("value error: {0}")]
    Value(#[from] zesk_proto::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a [`Error::MalformedDescriptor`].
    pub fn malformed(class: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedDescriptor {
            class: class.into(),
            reason: reason.into(),
        }
    }

    /// True for [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// True for [`Error::Duplicate`] and [`Error::DuplicateKey`].
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::Duplicate { .. } | Error::DuplicateKey { .. })
    }
}

/// Emitted when a module name is registered again with a different class set.
///
/// Not an error: the new registration replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateModuleWarning {
    /// Cleaned module name.
    pub module: String,
    /// Model classes of the replaced registration.
    pub previous: Vec<String>,
    /// Model classes of the active registration.
    pub replacement: Vec<String>,
}

impl fmt::Display for DuplicateModuleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "module {} registered again: classes [{}] replaced by [{}]",
            self.module,
            self.previous.join(", "),
            self.replacement.join(", ")
        )
    }
}
