//! Module registry.
//!
//! A module bundles model classes, routes and hook callbacks under one name.
//! Modules are registered during bootstrap and read-only once the application
//! boots.

mod manifest;
mod registry;

pub use manifest::{ManifestHook, ModuleManifest, Route};
pub use registry::{Module, ModuleRegistry};
