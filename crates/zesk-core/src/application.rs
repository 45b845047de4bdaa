//! The application context.
//!
//! An [`Application`] owns the class registry, module registry, hooks and
//! storage. It is built and populated during bootstrap, then [`boot`]ed, after
//! which registration is rejected and the context can be shared read-only.
//!
//! [`boot`]: Application::boot

use crate::catalog::{ClassDescriptor, ClassRegistry};
use crate::config::{AppConfig, Bootstrap};
use crate::error::{DuplicateModuleWarning, Error, Result};
use crate::hooks::{self, HookError, HookHandle, HookOptions, Hooks};
use crate::model::{Member, ModelInstance};
use crate::module::{ModuleManifest, ModuleRegistry};
use crate::storage::Storage;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-class validation run by `store` before anything is written.
pub trait Validate: Send + Sync {
    /// Reject the instance with an error (typically [`Error::Validation`]).
    fn validate(&self, instance: &ModelInstance) -> Result<()>;
}

impl<F> Validate for F
where
    F: Fn(&ModelInstance) -> Result<()> + Send + Sync,
{
    fn validate(&self, instance: &ModelInstance) -> Result<()> {
        self(instance)
    }
}

/// Process-wide context passed to model operations.
pub struct Application {
    config: AppConfig,
    classes: ClassRegistry,
    modules: ModuleRegistry,
    hooks: Hooks,
    storage: Box<dyn Storage>,
    validators: HashMap<String, Vec<Arc<dyn Validate>>>,
    booted: bool,
}

impl Application {
    /// Create an application, opening the configured storage.
    pub fn new(config: AppConfig) -> Result<Self> {
        let storage = config.storage.open()?;
        Ok(Self::with_storage(config, storage))
    }

    /// Create an application over an existing storage.
    pub fn with_storage(config: AppConfig, storage: Box<dyn Storage>) -> Self {
        let classes = ClassRegistry::with_defaults(&config.table_prefix, &config.id_column_default);
        let mut hooks = Hooks::new();
        for hook in &config.fail_fast_hooks {
            hooks.declare_fail_fast(hook);
        }
        Self {
            config,
            classes,
            modules: ModuleRegistry::new(),
            hooks,
            storage,
            validators: HashMap::new(),
            booted: false,
        }
    }

    /// Create an application and register every bootstrap module. Does not boot.
    pub fn from_bootstrap(bootstrap: Bootstrap) -> Result<Self> {
        let mut app = Self::new(bootstrap.config)?;
        for manifest in bootstrap.modules {
            app.register_module(manifest)?;
        }
        Ok(app)
    }

    /// Application settings.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registered classes.
    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Loaded modules.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Hook dispatcher.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Storage behind model instances.
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Has [`boot`](Self::boot) run?
    pub fn is_booted(&self) -> bool {
        self.booted
    }

    fn ensure_open(&self, what: &'static str) -> Result<()> {
        if self.booted {
            return Err(Error::Sealed(what));
        }
        Ok(())
    }

    /// Register a class descriptor outside any module.
    pub fn register_class(&mut self, descriptor: ClassDescriptor) -> Result<Arc<ClassDescriptor>> {
        self.ensure_open("class registry")?;
        self.classes.register(descriptor)
    }

    /// Register a module.
    pub fn register_module(&mut self, manifest: ModuleManifest) -> Result<Option<DuplicateModuleWarning>> {
        self.ensure_open("module registry")?;
        self.modules
            .register(manifest, &mut self.classes, &mut self.hooks)
    }

    /// Add a hook callback.
    pub fn add_hook<F>(&mut self, name: &str, callback: F) -> Result<HookHandle>
    where
        F: Fn(&[Member]) -> std::result::Result<Member, HookError> + Send + Sync + 'static,
    {
        self.ensure_open("hooks")?;
        Ok(self.hooks.add(name, callback))
    }

    /// Add a hook callback with options.
    pub fn add_hook_with<F>(&mut self, name: &str, options: HookOptions, callback: F) -> Result<HookHandle>
    where
        F: Fn(&[Member]) -> std::result::Result<Member, HookError> + Send + Sync + 'static,
    {
        self.ensure_open("hooks")?;
        self.hooks.add_with(name, options, callback)
    }

    /// Declare a hook fail-fast.
    pub fn declare_fail_fast(&mut self, name: &str) -> Result<()> {
        self.ensure_open("hooks")?;
        self.hooks.declare_fail_fast(name);
        Ok(())
    }

    /// Add a store-time validator for `class`.
    pub fn add_validator(&mut self, class: &str, validator: impl Validate + 'static) -> Result<()> {
        self.ensure_open("validators")?;
        self.validators
            .entry(class.to_string())
            .or_default()
            .push(Arc::new(validator));
        Ok(())
    }

    /// Run the validators of the instance's class.
    pub(crate) fn validate(&self, instance: &ModelInstance) -> Result<()> {
        if let Some(validators) = self.validators.get(instance.class()) {
            for validator in validators {
                validator.validate(instance)?;
            }
        }
        Ok(())
    }

    /// Finish bootstrap.
    ///
    /// Checks module dependencies, logs relations whose target class is
    /// missing, then calls the `configured` and `schema_updated` hooks. After
    /// boot every registration method fails with [`Error::Sealed`].
    pub fn boot(&mut self) -> Result<()> {
        self.ensure_open("application")?;
        self.modules.check_dependencies()?;

        for error in self.classes.check() {
            warn!(error = %error, "unresolved relation");
        }

        self.hooks.call(hooks::CONFIGURED, &[])?;
        self.hooks.call(hooks::SCHEMA_UPDATED, &[])?;
        self.booted = true;

        info!(
            modules = self.modules.len(),
            classes = self.classes.len(),
            hooks = self.hooks.names().len(),
            "application booted"
        );
        Ok(())
    }

    /// Call the `exit` hook, flush storage and drop every registration.
    ///
    /// Cleanup happens even if an `exit` callback fails; that failure is
    /// returned afterwards.
    pub fn shutdown(&mut self) -> Result<()> {
        let exit = self.hooks.call(hooks::EXIT, &[]);
        let flushed = self.storage.flush();

        self.hooks.clear();
        self.modules.clear();
        self.classes.clear();
        self.validators.clear();
        self.booted = false;

        info!("application shut down");
        exit?;
        flushed
    }

    /// Report an error to `exception` hook listeners.
    pub fn report(&self, error: &Error) {
        if let Err(e) = self
            .hooks
            .call(hooks::EXCEPTION, &[Member::String(error.to_string())])
        {
            warn!(error = %e, "exception hook failed");
        }
    }

    /// A fresh instance of `class`.
    pub fn model(&self, class: &str) -> Result<ModelInstance> {
        Ok(ModelInstance::new(self.classes.require(class)?))
    }

    /// Fetch an instance of `class` by its id column.
    pub fn fetch(&self, class: &str, id: impl Into<Member>) -> Result<ModelInstance> {
        let mut instance = self.model(class)?;
        let id_column = instance
            .descriptor()
            .id_column
            .clone()
            .ok_or_else(|| Error::malformed(class, "class has no id column"))?;
        instance.set(&id_column, id)?;
        instance.fetch(self)?;
        Ok(instance)
    }
}
