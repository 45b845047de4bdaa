//! Class descriptors: per-model storage shape and relationships.

use super::relation::{HasMany, HasOne};
use super::types::ColumnType;
use crate::error::{Error, Result};
use crate::model::Member;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Declarative metadata for one model class.
///
/// Descriptors are built once (in code or from a module manifest), normalized
/// and validated by [`ClassRegistry::register`](super::ClassRegistry::register),
/// and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassDescriptor {
    /// Class name (unique within the registry), e.g. `zesk\Contact\Person`.
    pub class: String,
    /// Human-readable name. Defaults to the class name.
    pub name: String,
    /// Short programmer name. Defaults to the last segment of the class name.
    pub code_name: String,
    /// Storage table. Defaults to table prefix + code name.
    pub table: String,
    /// Column holding the single identifier, if the class has one.
    pub id_column: Option<String>,
    /// Columns uniquely identifying a row.
    pub primary_keys: Vec<String>,
    /// Columns used to look up an existing row when the primary key is unset.
    pub find_keys: Vec<String>,
    /// Columns whose combined values must be unique; `store` refuses a second row with them.
    pub duplicate_keys: Vec<String>,
    /// Column name to type.
    pub column_types: BTreeMap<String, ColumnType>,
    /// has_one relations: column name to target.
    pub has_one: BTreeMap<String, HasOne>,
    /// has_many relations: relation name to definition.
    pub has_many: BTreeMap<String, HasMany>,
    /// Default values for fresh instances.
    pub column_defaults: BTreeMap<String, Member>,
    /// Name of the class whose database this class shares.
    pub database_group: String,
}

impl ClassDescriptor {
    /// Create an empty descriptor for `class`.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Default::default()
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the id column (implies a single-column primary key).
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    /// Set the primary keys.
    pub fn with_primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the find keys.
    pub fn with_find_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.find_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the duplicate keys.
    pub fn with_duplicate_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.duplicate_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Add a column.
    pub fn with_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.column_types.insert(name.into(), column_type);
        self
    }

    /// Add multiple columns.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        self.column_types
            .extend(columns.into_iter().map(|(name, t)| (name.into(), t)));
        self
    }

    /// Add a has_one relation stored in `column`.
    pub fn with_has_one(mut self, column: impl Into<String>, target: impl Into<HasOne>) -> Self {
        self.has_one.insert(column.into(), target.into());
        self
    }

    /// Add a has_many relation.
    pub fn with_has_many(mut self, name: impl Into<String>, many: HasMany) -> Self {
        self.has_many.insert(name.into(), many);
        self
    }

    /// Set a column default.
    pub fn with_default(mut self, column: impl Into<String>, value: impl Into<Member>) -> Self {
        self.column_defaults.insert(column.into(), value.into());
        self
    }

    /// Set the database group.
    pub fn with_database_group(mut self, group: impl Into<String>) -> Self {
        self.database_group = group.into();
        self
    }

    /// Type of a column.
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.column_types.get(column).copied()
    }

    /// Does this class have the column?
    pub fn has_column(&self, column: &str) -> bool {
        self.column_types.contains_key(column)
    }

    /// Is `name` a has_one or has_many relation?
    pub fn is_relation(&self, name: &str) -> bool {
        self.has_one.contains_key(name) || self.has_many.contains_key(name)
    }

    /// Column names (has_one columns included).
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.column_types.keys().map(String::as_str).collect();
        for column in self.has_one.keys() {
            if !self.column_types.contains_key(column) {
                names.push(column);
            }
        }
        names
    }

    /// All member names: columns plus has_many relations.
    pub fn member_names(&self) -> Vec<&str> {
        let mut names = self.column_names();
        names.extend(self.has_many.keys().map(String::as_str));
        names
    }

    /// Default value for a column, if declared.
    pub fn column_default(&self, column: &str) -> Option<&Member> {
        self.column_defaults.get(column)
    }

    /// True when the class has a single auto-assigned `Id` primary key.
    pub fn auto_id_column(&self) -> Option<&str> {
        let id = self.id_column.as_deref()?;
        match (self.primary_keys.as_slice(), self.column_type(id)) {
            ([only], Some(ColumnType::Id)) if only == id => Some(id),
            _ => None,
        }
    }

    /// Fill in implied values. Runs once, before validation.
    pub(crate) fn normalize(&mut self, table_prefix: &str, id_column_default: &str) {
        if self.code_name.is_empty() {
            self.code_name = short_class_name(&self.class).to_string();
        }
        if self.name.is_empty() {
            self.name = self.class.clone();
        }
        if self.table.is_empty() {
            self.table = format!("{}{}", table_prefix, self.code_name);
        }

        if !self.primary_keys.is_empty() {
            if self.primary_keys.len() == 1 {
                self.id_column = Some(self.primary_keys[0].clone());
            }
        } else if let Some(id) = &self.id_column {
            self.primary_keys = vec![id.clone()];
        } else if !id_column_default.is_empty() && self.has_column(id_column_default) {
            self.id_column = Some(id_column_default.to_string());
            self.primary_keys = vec![id_column_default.to_string()];
        }

        if self.find_keys.is_empty() {
            self.find_keys = self.primary_keys.clone();
        }

        for column in self.has_one.keys() {
            match self.column_types.get(column) {
                Some(ColumnType::Object) | None => {}
                Some(other) => warn!(
                    class = %self.class,
                    column = %column,
                    declared = %other,
                    "has_one column type is not object and will be overwritten"
                ),
            }
            self.column_types.insert(column.clone(), ColumnType::Object);
        }

        let code_name = self.code_name.clone();
        for many in self.has_many.values_mut() {
            if many.foreign_key.is_empty() {
                many.foreign_key = code_name.clone();
            }
        }
    }

    /// Check registration-time invariants.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.class.trim().is_empty() {
            return Err(Error::malformed("<unnamed>", "class name is empty"));
        }

        for (label, keys) in [
            ("primary key", &self.primary_keys),
            ("find key", &self.find_keys),
            ("duplicate key", &self.duplicate_keys),
        ] {
            for key in keys.iter() {
                if !self.has_column(key) && !self.has_one.contains_key(key) {
                    return Err(Error::malformed(
                        &self.class,
                        format!("{} {} is not a column or has_one relation", label, key),
                    ));
                }
            }
        }

        if let Some(id) = &self.id_column {
            if !self.has_column(id) {
                return Err(Error::malformed(
                    &self.class,
                    format!("id column {} is not declared", id),
                ));
            }
        }

        for (column, target) in &self.has_one {
            match target {
                HasOne::Class(name) if name.trim().is_empty() => {
                    return Err(Error::malformed(
                        &self.class,
                        format!("has_one {} has an empty class", column),
                    ));
                }
                HasOne::Dynamic(source) if !self.has_column(source) => {
                    return Err(Error::malformed(
                        &self.class,
                        format!("has_one {} reads its class from undeclared column {}", column, source),
                    ));
                }
                _ => {}
            }
        }

        for (name, many) in &self.has_many {
            if many.class.trim().is_empty() {
                return Err(Error::malformed(
                    &self.class,
                    format!("has_many {} must name a class", name),
                ));
            }
            if self.has_column(name) {
                return Err(Error::malformed(
                    &self.class,
                    format!("has_many {} collides with a column of the same name", name),
                ));
            }
        }

        for column in self.column_defaults.keys() {
            if !self.has_column(column) {
                return Err(Error::malformed(
                    &self.class,
                    format!("default given for undeclared column {}", column),
                ));
            }
        }

        Ok(())
    }
}

/// Last segment of a namespaced class name (`a\b\C` or `a::b::C` → `C`).
fn short_class_name(class: &str) -> &str {
    let tail = class.rsplit('\\').next().unwrap_or(class);
    tail.rsplit("::").next().unwrap_or(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> ClassDescriptor {
        ClassDescriptor::new("zesk\\Contact\\Person")
            .with_column("id", ColumnType::Id)
            .with_column("name", ColumnType::String)
            .with_column("email", ColumnType::String)
            .with_column("created", ColumnType::Created)
    }

    #[test]
    fn test_normalize_implies_names_and_keys() {
        let mut d = person();
        d.normalize("T", "id");

        assert_eq!(d.code_name, "Person");
        assert_eq!(d.name, "zesk\\Contact\\Person");
        assert_eq!(d.table, "TPerson");
        assert_eq!(d.id_column.as_deref(), Some("id"));
        assert_eq!(d.primary_keys, vec!["id"]);
        assert_eq!(d.find_keys, vec!["id"]);
        assert_eq!(d.auto_id_column(), Some("id"));
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_normalize_keeps_explicit_keys() {
        let mut d = person()
            .with_table("contact_person")
            .with_primary_keys(["email"])
            .with_find_keys(["name", "email"]);
        d.normalize("", "id");

        assert_eq!(d.table, "contact_person");
        assert_eq!(d.id_column.as_deref(), Some("email"));
        assert_eq!(d.find_keys, vec!["name", "email"]);
        assert_eq!(d.auto_id_column(), None);
    }

    #[test]
    fn test_has_one_forces_object_type() {
        let mut d = person()
            .with_column("account", ColumnType::Integer)
            .with_has_one("account", "Account")
            .with_has_one("owner", "User");
        d.normalize("", "id");

        assert_eq!(d.column_type("account"), Some(ColumnType::Object));
        assert_eq!(d.column_type("owner"), Some(ColumnType::Object));
    }

    #[test]
    fn test_has_many_default_foreign_key() {
        let mut d = person().with_has_many("emails", HasMany::new("Contact_Email", ""));
        d.normalize("", "id");
        assert_eq!(d.has_many["emails"].foreign_key, "Person");
    }

    #[test]
    fn test_validate_rejects_unknown_primary_key() {
        let mut d = person().with_primary_keys(["missing"]);
        d.normalize("", "id");
        assert!(matches!(d.validate(), Err(Error::MalformedDescriptor { .. })));
    }

    #[test]
    fn test_validate_rejects_unknown_find_key() {
        let mut d = person().with_find_keys(["nickname"]);
        d.normalize("", "id");
        assert!(matches!(d.validate(), Err(Error::MalformedDescriptor { .. })));
    }

    #[test]
    fn test_validate_rejects_unknown_duplicate_key() {
        let mut d = person().with_duplicate_keys(["name", "nickname"]);
        d.normalize("", "id");
        assert!(matches!(d.validate(), Err(Error::MalformedDescriptor { .. })));

        let mut d = person().with_duplicate_keys(["name"]);
        d.normalize("", "id");
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_dynamic_has_one() {
        let mut d = person().with_has_one("subject", "*subject_class");
        d.normalize("", "id");
        assert!(d.validate().is_err());

        let mut d = person()
            .with_column("subject_class", ColumnType::String)
            .with_has_one("subject", "*subject_class");
        d.normalize("", "id");
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_member_names() {
        let mut d = person()
            .with_has_one("account", "Account")
            .with_has_many("emails", HasMany::new("Contact_Email", "person"));
        d.normalize("", "id");

        let members = d.member_names();
        assert!(members.contains(&"account"));
        assert!(members.contains(&"emails"));
        assert!(!d.column_names().contains(&"emails"));
        assert!(d.is_relation("emails"));
        assert!(d.is_relation("account"));
        assert!(!d.is_relation("name"));
    }

    #[test]
    fn test_deserialize_from_manifest_json() {
        let json = r#"{
            "class": "Contact_Address",
            "column_types": {"id": "id", "street": "text", "contact": "orm", "geo": "serialize"},
            "has_one": {"contact": "Contact"},
            "column_defaults": {"street": ""}
        }"#;
        let d: ClassDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.column_type("street"), Some(ColumnType::String));
        assert_eq!(d.has_one["contact"], HasOne::class("Contact"));
        assert_eq!(d.column_default("street"), Some(&Member::String(String::new())));
    }
}
