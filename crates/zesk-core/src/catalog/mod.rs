//! Class catalog for zesk models.
//!
//! The catalog holds declarative metadata about model classes: column types,
//! keys, relations and defaults. Descriptors are registered once at module
//! load time and shared read-only afterwards.

mod descriptor;
mod registry;
mod relation;
mod types;

pub use descriptor::ClassDescriptor;
pub use registry::{ClassRegistry, DEFAULT_ID_COLUMN};
pub use relation::{HasMany, HasOne, RelationKind, ResolvedRelation};
pub use types::ColumnType;
