//! Zesk Core - class descriptors, model runtime, modules and hooks.
//!
//! This crate provides the ORM metadata layer and application context for
//! zesk: declarative [`ClassDescriptor`]s registered in a [`ClassRegistry`],
//! [`ModelInstance`]s that read and write typed columns through a pluggable
//! [`Storage`], a [`ModuleRegistry`] that loads feature modules at bootstrap,
//! and the [`Hooks`] dispatcher used as the framework's event mechanism.
//!
//! Everything hangs off one [`Application`], which is passed explicitly to the
//! operations that need registry or storage access.

pub mod application;
pub mod catalog;
pub mod config;
pub mod error;
pub mod hooks;
pub mod model;
pub mod module;
pub mod storage;

pub use application::{Application, Validate};
pub use catalog::{
    ClassDescriptor, ClassRegistry, ColumnType, HasMany, HasOne, RelationKind, ResolvedRelation,
};
pub use config::{AppConfig, Bootstrap, StorageBackend, StorageConfig};
pub use error::{DuplicateModuleWarning, Error, Result};
pub use hooks::{Callback, HookError, HookHandle, HookOptions, HookStats, Hooks};
pub use model::{Member, ModelInstance, RegisterStatus};
pub use module::{Module, ModuleManifest, ModuleRegistry, Route};
pub use storage::{MemoryStorage, Row, SledStorage, Storage};

/// Re-export storage value types.
pub use zesk_proto as proto;
