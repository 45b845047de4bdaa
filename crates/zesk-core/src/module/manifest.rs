//! Module manifests.

use crate::catalog::ClassDescriptor;
use crate::hooks::{Callback, HookError, HookOptions};
use crate::model::Member;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A route recorded by a module. Routes are metadata only; nothing here serves them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// URL pattern.
    pub path: String,
    /// Name of the handler responsible for the path.
    pub handler: String,
    /// Ordering weight; lower weights match first.
    #[serde(default)]
    pub weight: i32,
}

impl Route {
    /// Create a route with weight 0.
    pub fn new(path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            handler: handler.into(),
            weight: 0,
        }
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }
}

/// A hook callback a module attaches when it loads.
#[derive(Clone)]
pub struct ManifestHook {
    /// Hook name.
    pub name: String,
    /// Placement options.
    pub options: HookOptions,
    /// The callback.
    pub callback: Callback,
}

impl fmt::Debug for ManifestHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestHook")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Everything a module contributes: classes, routes, hooks and dependencies.
///
/// Manifests deserialize from bootstrap JSON; hooks can only be attached in
/// code.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModuleManifest {
    /// Module name. Cleaned (trimmed, lowercased) on registration.
    pub name: String,
    /// Module version.
    pub version: Option<String>,
    /// Names of modules that must be loaded before boot.
    pub requires: Vec<String>,
    /// Model classes the module owns but does not describe here.
    pub model_classes: Vec<String>,
    /// Class descriptors registered with the module.
    pub classes: Vec<ClassDescriptor>,
    /// Routes.
    pub routes: Vec<Route>,
    /// Hook callbacks.
    #[serde(skip)]
    pub hooks: Vec<ManifestHook>,
}

impl ModuleManifest {
    /// Create an empty manifest.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Add a required module.
    pub fn with_requires(mut self, module: impl Into<String>) -> Self {
        self.requires.push(module.into());
        self
    }

    /// Add an owned model class name.
    pub fn with_model_class(mut self, class: impl Into<String>) -> Self {
        self.model_classes.push(class.into());
        self
    }

    /// Add a class descriptor.
    pub fn with_class(mut self, descriptor: ClassDescriptor) -> Self {
        self.classes.push(descriptor);
        self
    }

    /// Add a route.
    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Attach a hook callback.
    pub fn with_hook<F>(self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&[Member]) -> Result<Member, HookError> + Send + Sync + 'static,
    {
        self.with_hook_options(name, HookOptions::default(), callback)
    }

    /// Attach a hook callback with options.
    pub fn with_hook_options<F>(mut self, name: impl Into<String>, options: HookOptions, callback: F) -> Self
    where
        F: Fn(&[Member]) -> Result<Member, HookError> + Send + Sync + 'static,
    {
        self.hooks.push(ManifestHook {
            name: name.into(),
            options,
            callback: Arc::new(callback),
        });
        self
    }

    /// Every model class of the module, described or listed, sorted and deduplicated.
    pub fn class_set(&self) -> Vec<String> {
        self.classes
            .iter()
            .map(|d| d.class.clone())
            .chain(self.model_classes.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
