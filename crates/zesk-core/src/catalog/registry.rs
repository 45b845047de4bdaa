//! Class registry and relationship resolution.

use super::relation::{HasOne, RelationKind, ResolvedRelation};
use super::ClassDescriptor;
use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Default id column name used when a class declares no keys.
pub const DEFAULT_ID_COLUMN: &str = "id";

/// Registered class descriptors, keyed by class name.
pub struct ClassRegistry {
    /// Descriptors by class name.
    classes: HashMap<String, Arc<ClassDescriptor>>,
    /// Prefix for implied table names.
    table_prefix: String,
    /// Id column implied for classes without keys.
    id_column_default: String,
}

impl ClassRegistry {
    /// Create an empty registry with default naming rules.
    pub fn new() -> Self {
        Self::with_defaults("", DEFAULT_ID_COLUMN)
    }

    /// Create an empty registry with the given table prefix and default id column.
    pub fn with_defaults(table_prefix: impl Into<String>, id_column_default: impl Into<String>) -> Self {
        Self {
            classes: HashMap::new(),
            table_prefix: table_prefix.into(),
            id_column_default: id_column_default.into(),
        }
    }

    /// Normalize, validate and register a descriptor.
    ///
    /// Registering a class name again replaces the previous descriptor.
    pub fn register(&mut self, descriptor: ClassDescriptor) -> Result<Arc<ClassDescriptor>> {
        let descriptor = self.prepare(descriptor)?;
        Ok(self.insert(descriptor))
    }

    /// Normalize and validate without registering.
    pub(crate) fn prepare(&self, mut descriptor: ClassDescriptor) -> Result<ClassDescriptor> {
        descriptor.normalize(&self.table_prefix, &self.id_column_default);
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Register a descriptor returned by [`prepare`](Self::prepare).
    pub(crate) fn insert(&mut self, descriptor: ClassDescriptor) -> Arc<ClassDescriptor> {
        let descriptor = Arc::new(descriptor);
        let replaced = self
            .classes
            .insert(descriptor.class.clone(), Arc::clone(&descriptor))
            .is_some();

        debug!(
            class = %descriptor.class,
            table = %descriptor.table,
            columns = descriptor.column_types.len(),
            replaced,
            "registered class"
        );

        descriptor
    }

    /// Remove a class. Returns the removed descriptor.
    pub fn unregister(&mut self, class: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.remove(class)
    }

    /// Get a descriptor by class name.
    pub fn get(&self, class: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.get(class).cloned()
    }

    /// Get a descriptor or fail with [`Error::UnknownClass`].
    pub fn require(&self, class: &str) -> Result<Arc<ClassDescriptor>> {
        self.get(class)
            .ok_or_else(|| Error::UnknownClass(class.to_string()))
    }

    /// Is the class registered?
    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Registered class names, sorted.
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True when no class is registered.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Iterate over registered descriptors (unordered).
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<ClassDescriptor>> {
        self.classes.values()
    }

    /// Resolve a relation of `descriptor` to its target class.
    ///
    /// Dynamic has_one relations (`*column`) have no fixed target; use
    /// [`resolve_dynamic`](Self::resolve_dynamic) with the class name read from
    /// the instance.
    pub fn resolve(&self, descriptor: &ClassDescriptor, relation: &str) -> Result<ResolvedRelation> {
        if let Some(one) = descriptor.has_one.get(relation) {
            return match one {
                HasOne::Class(class) => self.resolve_one(descriptor, relation, class),
                HasOne::Dynamic(column) => Err(Error::UnknownClass(format!(
                    "{}.{} takes its class from column {}",
                    descriptor.class, relation, column
                ))),
            };
        }

        if let Some(many) = descriptor.has_many.get(relation) {
            let target = self.require(&many.class)?;
            if !target.has_column(&many.foreign_key) {
                return Err(Error::InvalidForeignKey {
                    class: descriptor.class.clone(),
                    relation: relation.to_string(),
                    target: target.class.clone(),
                    foreign_key: many.foreign_key.clone(),
                });
            }
            return Ok(ResolvedRelation {
                name: relation.to_string(),
                kind: RelationKind::Many,
                source: descriptor.class.clone(),
                target,
                foreign_key: Some(many.foreign_key.clone()),
                far_key: many.far_key.clone(),
            });
        }

        Err(Error::UnknownRelation {
            class: descriptor.class.clone(),
            relation: relation.to_string(),
        })
    }

    /// Resolve a has_one relation whose class name came from an instance.
    pub fn resolve_dynamic(
        &self,
        descriptor: &ClassDescriptor,
        relation: &str,
        class: &str,
    ) -> Result<ResolvedRelation> {
        if !descriptor.has_one.contains_key(relation) {
            return Err(Error::UnknownRelation {
                class: descriptor.class.clone(),
                relation: relation.to_string(),
            });
        }
        self.resolve_one(descriptor, relation, class)
    }

    fn resolve_one(
        &self,
        descriptor: &ClassDescriptor,
        relation: &str,
        class: &str,
    ) -> Result<ResolvedRelation> {
        let target = self.require(class)?;
        Ok(ResolvedRelation {
            name: relation.to_string(),
            kind: RelationKind::One,
            source: descriptor.class.clone(),
            target,
            foreign_key: None,
            far_key: None,
        })
    }

    /// Classes `descriptor` depends on through fixed relations, sorted.
    pub fn dependencies(&self, descriptor: &ClassDescriptor) -> Vec<String> {
        let mut requires = BTreeSet::new();
        for one in descriptor.has_one.values() {
            if let Some(class) = one.class_name() {
                requires.insert(class.to_string());
            }
        }
        for many in descriptor.has_many.values() {
            requires.insert(many.class.clone());
        }
        requires.into_iter().collect()
    }

    /// Resolve every fixed relation of every class, collecting failures.
    pub fn check(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        for class in self.class_names() {
            let Some(descriptor) = self.get(&class) else {
                continue;
            };
            let relations = descriptor
                .has_one
                .iter()
                .filter(|(_, one)| one.class_name().is_some())
                .map(|(column, _)| column)
                .chain(descriptor.has_many.keys());
            for relation in relations {
                if let Err(e) = self.resolve(&descriptor, relation) {
                    errors.push(e);
                }
            }
        }
        errors
    }

    /// Drop every class.
    pub fn clear(&mut self) {
        self.classes.clear();
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ColumnType, HasMany};

    fn contact() -> ClassDescriptor {
        ClassDescriptor::new("Contact")
            .with_column("id", ColumnType::Id)
            .with_column("name", ColumnType::String)
            .with_has_one("person", "Contact_Person")
            .with_has_many("emails", HasMany::new("Contact_Email", "contact"))
    }

    fn person() -> ClassDescriptor {
        ClassDescriptor::new("Contact_Person")
            .with_column("id", ColumnType::Id)
            .with_column("first", ColumnType::String)
    }

    fn email() -> ClassDescriptor {
        ClassDescriptor::new("Contact_Email")
            .with_column("id", ColumnType::Id)
            .with_column("address", ColumnType::String)
            .with_has_one("contact", "Contact")
    }

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.register(contact()).unwrap();
        registry.register(person()).unwrap();
        registry.register(email()).unwrap();
        registry
    }

    #[test]
    fn test_register_and_get() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("Contact"));
        assert_eq!(
            registry.class_names(),
            vec!["Contact", "Contact_Email", "Contact_Person"]
        );
        assert!(registry.get("Nope").is_none());
        assert!(matches!(registry.require("Nope"), Err(Error::UnknownClass(_))));
    }

    #[test]
    fn test_register_rejects_malformed() {
        let mut registry = ClassRegistry::new();
        let bad = person().with_primary_keys(["ghost"]);
        assert!(matches!(
            registry.register(bad),
            Err(Error::MalformedDescriptor { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registered_keys_are_declared() {
        let registry = registry();
        for descriptor in registry.descriptors() {
            let keys = descriptor
                .primary_keys
                .iter()
                .chain(&descriptor.find_keys)
                .chain(&descriptor.duplicate_keys);
            for key in keys {
                assert!(descriptor.has_column(key) || descriptor.has_one.contains_key(key));
            }
        }
    }

    #[test]
    fn test_resolve_has_one() {
        let registry = registry();
        let contact = registry.get("Contact").unwrap();
        let resolved = registry.resolve(&contact, "person").unwrap();

        assert_eq!(resolved.kind, RelationKind::One);
        assert_eq!(resolved.target_class(), "Contact_Person");
        assert!(resolved.foreign_key.is_none());
    }

    #[test]
    fn test_resolve_has_many() {
        let registry = registry();
        let contact = registry.get("Contact").unwrap();
        let resolved = registry.resolve(&contact, "emails").unwrap();

        assert_eq!(resolved.kind, RelationKind::Many);
        assert_eq!(resolved.target_class(), "Contact_Email");
        assert_eq!(resolved.foreign_key.as_deref(), Some("contact"));
    }

    #[test]
    fn test_resolve_unknown_relation() {
        let registry = registry();
        let contact = registry.get("Contact").unwrap();
        assert!(matches!(
            registry.resolve(&contact, "nonexistent"),
            Err(Error::UnknownRelation { .. })
        ));
    }

    #[test]
    fn test_resolve_unknown_class() {
        let mut registry = ClassRegistry::new();
        let contact = registry.register(contact()).unwrap();
        assert!(matches!(
            registry.resolve(&contact, "person"),
            Err(Error::UnknownClass(class)) if class == "Contact_Person"
        ));
    }

    #[test]
    fn test_resolve_invalid_foreign_key() {
        let mut registry = registry();
        let contact = registry
            .register(contact().with_has_many("phones", HasMany::new("Contact_Email", "owner")))
            .unwrap();
        assert!(matches!(
            registry.resolve(&contact, "phones"),
            Err(Error::InvalidForeignKey { foreign_key, .. }) if foreign_key == "owner"
        ));
    }

    #[test]
    fn test_resolve_dynamic() {
        let mut registry = registry();
        let note = registry
            .register(
                ClassDescriptor::new("Note")
                    .with_column("id", ColumnType::Id)
                    .with_column("subject_class", ColumnType::String)
                    .with_has_one("subject", "*subject_class"),
            )
            .unwrap();

        assert!(registry.resolve(&note, "subject").is_err());
        let resolved = registry
            .resolve_dynamic(&note, "subject", "Contact_Person")
            .unwrap();
        assert_eq!(resolved.target_class(), "Contact_Person");
    }

    #[test]
    fn test_dependencies_and_check() {
        let mut registry = ClassRegistry::new();
        let contact = registry.register(contact()).unwrap();
        assert_eq!(
            registry.dependencies(&contact),
            vec!["Contact_Email", "Contact_Person"]
        );
        assert_eq!(registry.check().len(), 2);

        registry.register(person()).unwrap();
        registry.register(email()).unwrap();
        assert!(registry.check().is_empty());
    }
}
