//! Loaded modules.

use super::manifest::{ModuleManifest, Route};
use crate::catalog::ClassRegistry;
use crate::error::{DuplicateModuleWarning, Error, Result};
use crate::hooks::{HookHandle, Hooks};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// A registered module.
#[derive(Debug, Clone)]
pub struct Module {
    /// Cleaned module name.
    pub name: String,
    /// Module version.
    pub version: Option<String>,
    /// Cleaned names of required modules.
    pub requires: Vec<String>,
    /// Model classes, sorted.
    pub model_classes: Vec<String>,
    /// Classes whose descriptors this module registered.
    pub described_classes: Vec<String>,
    /// Routes in manifest order.
    pub routes: Vec<Route>,
    /// Handles of the hooks this module added.
    hook_handles: Vec<HookHandle>,
    /// Registration sequence number.
    order: u64,
}

impl Module {
    /// Number of hook callbacks the module added.
    pub fn hook_count(&self) -> usize {
        self.hook_handles.len()
    }
}

/// Module name to module record.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Module>,
    next_order: u64,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a module name: trimmed and lowercased.
    pub fn clean_name(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Register a module: its class descriptors, then the record, then its hooks.
    ///
    /// Every descriptor is validated before any is registered, so a
    /// malformed descriptor leaves the registries untouched. Registering a
    /// name again replaces the previous module and removes its hooks; if the
    /// model class set changed, a [`DuplicateModuleWarning`] is logged and
    /// returned.
    pub fn register(
        &mut self,
        manifest: ModuleManifest,
        classes: &mut ClassRegistry,
        hooks: &mut Hooks,
    ) -> Result<Option<DuplicateModuleWarning>> {
        let name = Self::clean_name(&manifest.name);
        if name.is_empty() {
            return Err(Error::Config("module name is empty".to_string()));
        }

        let model_classes = manifest.class_set();
        let prepared = manifest
            .classes
            .into_iter()
            .map(|d| classes.prepare(d))
            .collect::<Result<Vec<_>>>()?;

        let mut hook_handles = Vec::with_capacity(manifest.hooks.len());
        for hook in manifest.hooks {
            match hooks.add_callback(&hook.name, hook.options, hook.callback) {
                Ok(handle) => hook_handles.push(handle),
                Err(e) => {
                    for handle in &hook_handles {
                        hooks.remove(handle);
                    }
                    return Err(e);
                }
            }
        }

        let described_classes: Vec<String> = prepared.iter().map(|d| d.class.clone()).collect();
        for descriptor in prepared {
            classes.insert(descriptor);
        }

        let warning = match self.modules.remove(&name) {
            Some(previous) => {
                for handle in &previous.hook_handles {
                    hooks.remove(handle);
                }
                for class in &previous.described_classes {
                    let still_described = described_classes.contains(class)
                        || self
                            .modules
                            .values()
                            .any(|m| m.described_classes.contains(class));
                    if !still_described {
                        classes.unregister(class);
                    }
                }
                (previous.model_classes != model_classes).then(|| DuplicateModuleWarning {
                    module: name.clone(),
                    previous: previous.model_classes,
                    replacement: model_classes.clone(),
                })
            }
            None => None,
        };

        if let Some(w) = &warning {
            warn!(module = %name, warning = %w, "duplicate module registration");
        }

        self.next_order += 1;
        info!(
            module = %name,
            version = manifest.version.as_deref().unwrap_or("-"),
            classes = model_classes.len(),
            routes = manifest.routes.len(),
            hooks = hook_handles.len(),
            "registered module"
        );

        self.modules.insert(
            name.clone(),
            Module {
                name,
                version: manifest.version,
                requires: manifest.requires.iter().map(|r| Self::clean_name(r)).collect(),
                model_classes,
                described_classes,
                routes: manifest.routes,
                hook_handles,
                order: self.next_order,
            },
        );

        Ok(warning)
    }

    /// Remove a module and its hooks. Its classes stay registered.
    pub fn unregister(&mut self, name: &str, hooks: &mut Hooks) -> Result<Module> {
        let name = Self::clean_name(name);
        let module = self
            .modules
            .remove(&name)
            .ok_or(Error::UnknownModule(name))?;
        for handle in &module.hook_handles {
            hooks.remove(handle);
        }
        Ok(module)
    }

    /// Get a module by name.
    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(&Self::clean_name(name))
    }

    /// Get a module or fail with [`Error::UnknownModule`].
    pub fn require(&self, name: &str) -> Result<&Module> {
        self.get(name)
            .ok_or_else(|| Error::UnknownModule(Self::clean_name(name)))
    }

    /// Is the module loaded?
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(&Self::clean_name(name))
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// True when no module is loaded.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules in registration order. A re-registered module moves to the end.
    pub fn modules(&self) -> Vec<&Module> {
        let mut modules: Vec<&Module> = self.modules.values().collect();
        modules.sort_by_key(|m| m.order);
        modules
    }

    /// Module names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.modules().into_iter().map(|m| m.name.clone()).collect()
    }

    /// Version of a module.
    pub fn version(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|m| m.version.as_deref())
    }

    /// Every route with its module, ordered by weight, ties in registration order.
    pub fn routes(&self) -> Vec<(&str, &Route)> {
        let mut routes: Vec<(&str, &Route)> = self
            .modules()
            .into_iter()
            .flat_map(|m| m.routes.iter().map(move |r| (m.name.as_str(), r)))
            .collect();
        routes.sort_by_key(|(_, r)| r.weight);
        routes
    }

    /// Model classes across all modules, sorted and deduplicated.
    pub fn model_classes(&self) -> Vec<String> {
        self.modules
            .values()
            .flat_map(|m| m.model_classes.iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Check that every module's requirements are loaded.
    pub fn check_dependencies(&self) -> Result<()> {
        for module in self.modules() {
            for requires in &module.requires {
                if !self.modules.contains_key(requires) {
                    return Err(Error::MissingDependency {
                        module: module.name.clone(),
                        requires: requires.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Drop every module.
    pub fn clear(&mut self) {
        self.modules.clear();
    }
}
