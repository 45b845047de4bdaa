//! Model instances: one row of one class, plus lazily loaded relations.

use super::codec;
use super::Member;
use crate::application::Application;
use crate::catalog::{ClassDescriptor, ColumnType, HasOne, RelationKind};
use crate::error::{Error, Result};
use crate::hooks;
use crate::storage::Row;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;
use zesk_proto::{RowKey, Value};

/// Cached relation targets.
#[derive(Debug)]
enum Related {
    One(Option<Box<ModelInstance>>),
    Many(Vec<ModelInstance>),
}

/// Outcome of [`ModelInstance::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterStatus {
    /// A row matching the find keys already existed and was loaded.
    Exists,
    /// No match; the instance was stored as a new row.
    Inserted,
}

/// A single model object.
///
/// Values are held in canonical member form once stored or fetched; `set`
/// accepts anything convertible to a [`Member`] and defers coercion to
/// [`store`](Self::store), which validates every written column before
/// touching storage.
#[derive(Debug)]
pub struct ModelInstance {
    descriptor: Arc<ClassDescriptor>,
    values: BTreeMap<String, Member>,
    dirty: BTreeSet<String>,
    related: HashMap<String, Related>,
    persisted: bool,
    status: Option<RegisterStatus>,
}

impl ModelInstance {
    /// Create a fresh instance seeded with column defaults.
    pub fn new(descriptor: Arc<ClassDescriptor>) -> Self {
        let values = default_values(&descriptor);
        Self {
            descriptor,
            values,
            dirty: BTreeSet::new(),
            related: HashMap::new(),
            persisted: false,
            status: None,
        }
    }

    /// Build a persisted instance from a stored row.
    pub fn from_row(descriptor: Arc<ClassDescriptor>, row: Row) -> Result<Self> {
        let mut instance = Self::new(descriptor);
        instance.load_row(row)?;
        Ok(instance)
    }

    /// The class descriptor.
    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.descriptor
    }

    /// Class name.
    pub fn class(&self) -> &str {
        &self.descriptor.class
    }

    /// True until the instance is stored or fetched.
    pub fn is_new(&self) -> bool {
        !self.persisted
    }

    /// Result of the last [`register`](Self::register), if any.
    pub fn status(&self) -> Option<RegisterStatus> {
        self.status
    }

    /// Was the column set since the last store or fetch?
    pub fn is_dirty(&self, column: &str) -> bool {
        self.dirty.contains(column)
    }

    /// Columns set since the last store or fetch, sorted.
    pub fn dirty_columns(&self) -> Vec<&str> {
        self.dirty.iter().map(String::as_str).collect()
    }

    /// All column values.
    pub fn values(&self) -> &BTreeMap<String, Member> {
        &self.values
    }

    /// Read a column.
    pub fn get(&self, column: &str) -> Result<&Member> {
        self.values
            .get(column)
            .ok_or_else(|| self.unknown_column(column))
    }

    /// Write a column and mark it dirty.
    ///
    /// The value is kept as given; coercion happens on store.
    pub fn set(&mut self, column: &str, value: impl Into<Member>) -> Result<()> {
        if !self.values.contains_key(column) {
            return Err(self.unknown_column(column));
        }
        self.values.insert(column.to_string(), value.into());
        self.dirty.insert(column.to_string());

        self.related.remove(column);
        for (relation, target) in &self.descriptor.has_one {
            if matches!(target, HasOne::Dynamic(source) if source == column) {
                self.related.remove(relation);
            }
        }
        Ok(())
    }

    /// The id column's value, if the class has one and it is set.
    pub fn id(&self) -> Option<&Member> {
        let column = self.descriptor.id_column.as_deref()?;
        self.values.get(column).filter(|m| !m.is_null())
    }

    /// Storage key built from the primary keys, if all are set.
    pub fn primary_key(&self) -> Result<Option<RowKey>> {
        Ok(self
            .encode_columns(&self.descriptor.primary_keys)?
            .map(|pairs| RowKey::new(pairs.into_iter().map(|(_, v)| v).collect())))
    }

    /// Load this instance's row.
    ///
    /// Uses the primary keys when all are set, otherwise the find keys. Fails
    /// with [`Error::NotFound`] if neither is set or no row matches.
    pub fn fetch(&mut self, app: &Application) -> Result<&mut Self> {
        let descriptor = Arc::clone(&self.descriptor);
        let storage = app.storage();

        let row = match self.primary_key()? {
            Some(key) => storage.load(&descriptor.table, &key)?,
            None => match self.encode_columns(&descriptor.find_keys)? {
                Some(criteria) => storage
                    .find(&descriptor.table, &criteria)?
                    .into_iter()
                    .next(),
                None => None,
            },
        };

        let Some(row) = row else {
            return Err(Error::NotFound {
                class: descriptor.class.clone(),
                key: self.describe_keys(),
            });
        };

        self.load_row(row)?;
        debug!(class = %descriptor.class, key = %self.describe_keys(), "fetched instance");
        Ok(self)
    }

    /// Write this instance.
    ///
    /// New instances insert every column; persisted ones update dirty columns
    /// plus `modified` columns. All written values are validated and coerced
    /// before storage is touched, so a [`Error::Validation`] means nothing was
    /// written. On success the in-memory values take their canonical forms.
    ///
    /// Classes with duplicate keys refuse a row whose duplicate key values
    /// another row already holds, with [`Error::Duplicate`]. The per-class
    /// `store` hook runs just before the write and `stored` just after, both
    /// with the class name and id as arguments.
    pub fn store(&mut self, app: &Application) -> Result<&mut Self> {
        let descriptor = Arc::clone(&self.descriptor);
        app.validate(self)?;

        let now = Utc::now();
        let insert = !self.persisted;
        let mut row = Row::new();
        let mut canonical = BTreeMap::new();

        for (column, &column_type) in &descriptor.column_types {
            let current = self.values.get(column).cloned().unwrap_or_default();
            let member = match column_type {
                ColumnType::Modified => Member::Timestamp(now),
                ColumnType::Created if insert && current.is_null() => Member::Timestamp(now),
                ColumnType::Created if !insert => continue,
                _ if insert || self.dirty.contains(column) => current,
                _ => continue,
            };
            let (member, value) = codec::to_storage(column_type, &member, now)
                .map_err(|reason| self.invalid(column, reason))?;
            row.insert(column.clone(), value);
            canonical.insert(column.clone(), member);
        }

        if !descriptor.duplicate_keys.is_empty() {
            self.check_duplicate(app, &row, now)?;
        }
        app.hooks().call(
            &hooks::class_hook(&descriptor.class, hooks::STORE),
            &[Member::from(descriptor.class.as_str()), self.id().cloned().unwrap_or_default()],
        )?;

        let storage = app.storage();
        if insert {
            if let Some(id_column) = descriptor.auto_id_column() {
                if row.get(id_column).map_or(true, Value::is_null) {
                    let id = storage.next_id(&descriptor.table)?;
                    row.insert(id_column.to_string(), Value::Int(id));
                    canonical.insert(id_column.to_string(), Member::Int(id));
                }
            }
            let key = self.insert_key(&row)?;
            storage.insert(&descriptor.table, &key, row)?;
        } else {
            if let Some(column) = descriptor
                .primary_keys
                .iter()
                .find(|k| self.dirty.contains(*k))
            {
                return Err(self.invalid(column, "primary key cannot change once stored"));
            }
            let key = self
                .primary_key()?
                .ok_or_else(|| self.invalid(&self.key_label(), "primary key is not set"))?;
            if !row.is_empty() && !storage.update(&descriptor.table, &key, row)? {
                return Err(Error::NotFound {
                    class: descriptor.class.clone(),
                    key: key.to_string(),
                });
            }
        }

        let written = canonical.len();
        self.values.extend(canonical);
        self.dirty.clear();
        self.persisted = true;
        if insert {
            self.related.clear();
        }

        debug!(class = %descriptor.class, insert, columns = written, "stored instance");
        app.hooks().call(
            &hooks::class_hook(&descriptor.class, hooks::STORED),
            &[Member::from(descriptor.class.as_str()), self.id().cloned().unwrap_or_default()],
        )?;
        Ok(self)
    }

    /// Find-or-create by the find keys.
    ///
    /// When a row matches the find keys it is loaded into this instance and
    /// the status is [`RegisterStatus::Exists`]; otherwise the instance is
    /// stored and the status is [`RegisterStatus::Inserted`]. Find keys that
    /// are not all set always insert.
    pub fn register(&mut self, app: &Application) -> Result<RegisterStatus> {
        let descriptor = Arc::clone(&self.descriptor);
        let existing = match self.encode_columns(&descriptor.find_keys)? {
            Some(criteria) => app
                .storage()
                .find(&descriptor.table, &criteria)?
                .into_iter()
                .next(),
            None => None,
        };

        let status = match existing {
            Some(row) => {
                self.load_row(row)?;
                RegisterStatus::Exists
            }
            None => {
                self.store(app)?;
                RegisterStatus::Inserted
            }
        };
        self.status = Some(status);
        debug!(class = %descriptor.class, ?status, "registered instance");
        Ok(status)
    }

    /// Delete this instance's row by primary key. Returns false if it was already gone.
    pub fn delete(&mut self, app: &Application) -> Result<bool> {
        let Some(key) = self.primary_key()? else {
            return Err(Error::NotFound {
                class: self.descriptor.class.clone(),
                key: self.describe_keys(),
            });
        };
        let deleted = app.storage().delete(&self.descriptor.table, &key)?;
        self.persisted = false;
        self.related.clear();
        debug!(class = %self.descriptor.class, key = %key, deleted, "deleted instance");
        Ok(deleted)
    }

    /// The object a has_one relation points at, loaded on first access.
    ///
    /// Returns `None` when the relation column is empty (or, for a dynamic
    /// relation, when the class column is empty).
    pub fn related(&mut self, app: &Application, relation: &str) -> Result<Option<&mut ModelInstance>> {
        if !matches!(self.related.get(relation), Some(Related::One(_))) {
            let target = self.load_one(app, relation)?;
            self.related
                .insert(relation.to_string(), Related::One(target.map(Box::new)));
        }
        match self.related.get_mut(relation) {
            Some(Related::One(target)) => Ok(target.as_deref_mut()),
            _ => Err(Error::UnknownRelation {
                class: self.descriptor.class.clone(),
                relation: relation.to_string(),
            }),
        }
    }

    /// Objects of a has_many relation, loaded on first access, in key order.
    ///
    /// An instance without an id has no related objects; that empty result
    /// is not cached, so the relation loads once the instance is stored.
    pub fn related_many(&mut self, app: &Application, relation: &str) -> Result<&mut [ModelInstance]> {
        if !matches!(self.related.get(relation), Some(Related::Many(_))) {
            let targets = self.load_many(app, relation)?;
            if self.id().is_none() {
                return Ok(&mut []);
            }
            self.related
                .insert(relation.to_string(), Related::Many(targets));
        }
        match self.related.get_mut(relation) {
            Some(Related::Many(targets)) => Ok(targets.as_mut_slice()),
            _ => Err(Error::UnknownRelation {
                class: self.descriptor.class.clone(),
                relation: relation.to_string(),
            }),
        }
    }

    /// Drop cached relations so the next access reloads them.
    pub fn clear_related(&mut self) {
        self.related.clear();
    }

    /// Column values as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(column, member)| (column.clone(), member.to_json()))
                .collect(),
        )
    }

    fn load_one(&self, app: &Application, relation: &str) -> Result<Option<ModelInstance>> {
        let descriptor = &self.descriptor;
        let Some(target) = descriptor.has_one.get(relation) else {
            return Err(self.unknown_relation(relation));
        };

        let resolved = match target {
            HasOne::Class(_) => app.classes().resolve(descriptor, relation)?,
            HasOne::Dynamic(source) => match self.values.get(source) {
                Some(Member::String(class)) if !class.trim().is_empty() => {
                    app.classes()
                        .resolve_dynamic(descriptor, relation, class.trim())?
                }
                _ => return Ok(None),
            },
        };

        let id = self.values.get(relation).cloned().unwrap_or_default();
        if id.is_empty() {
            return Ok(None);
        }

        let mut instance = ModelInstance::new(Arc::clone(&resolved.target));
        let id_column = resolved.target.id_column.clone().ok_or_else(|| {
            Error::malformed(&resolved.target.class, "related class has no id column")
        })?;
        instance.set(&id_column, id)?;
        instance.fetch(app)?;
        debug!(class = %descriptor.class, relation, target = %resolved.target.class, "loaded has_one");
        Ok(Some(instance))
    }

    fn load_many(&self, app: &Application, relation: &str) -> Result<Vec<ModelInstance>> {
        let resolved = app.classes().resolve(&self.descriptor, relation)?;
        let foreign_key = match (resolved.kind, resolved.foreign_key.as_deref()) {
            (RelationKind::Many, Some(foreign_key)) => foreign_key,
            _ => return Err(self.unknown_relation(relation)),
        };
        let Some(id) = self.id() else {
            return Ok(Vec::new());
        };

        let target = &resolved.target;
        let column_type = target.column_type(foreign_key).unwrap_or(ColumnType::Object);
        let (_, value) = codec::to_storage(column_type, id, Utc::now()).map_err(|reason| {
            Error::Validation {
                class: target.class.clone(),
                column: foreign_key.to_string(),
                reason,
            }
        })?;

        let rows = app
            .storage()
            .find(&target.table, &[(foreign_key.to_string(), value)])?;
        debug!(class = %self.descriptor.class, relation, rows = rows.len(), "loaded has_many");
        rows.into_iter()
            .map(|row| ModelInstance::from_row(Arc::clone(target), row))
            .collect()
    }

    fn load_row(&mut self, row: Row) -> Result<()> {
        let mut values = default_values(&self.descriptor);
        for (column, value) in row {
            let Some(column_type) = self.descriptor.column_type(&column) else {
                continue;
            };
            let member = codec::from_storage(column_type, value).map_err(|reason| {
                Error::Deserialization(format!("{}.{}: {}", self.descriptor.class, column, reason))
            })?;
            values.insert(column, member);
        }
        self.values = values;
        self.dirty.clear();
        self.related.clear();
        self.persisted = true;
        Ok(())
    }

    /// Encode the named columns for storage, or `None` if any is null or the list is empty.
    fn encode_columns(&self, columns: &[String]) -> Result<Option<Vec<(String, Value)>>> {
        if columns.is_empty() {
            return Ok(None);
        }
        let now = Utc::now();
        let mut pairs = Vec::with_capacity(columns.len());
        for column in columns {
            let member = self.get(column)?;
            if member.is_empty() {
                return Ok(None);
            }
            let column_type = self
                .descriptor
                .column_type(column)
                .ok_or_else(|| self.unknown_column(column))?;
            let (_, value) = codec::to_storage(column_type, member, now)
                .map_err(|reason| self.invalid(column, reason))?;
            pairs.push((column.clone(), value));
        }
        Ok(Some(pairs))
    }

    /// Fail with [`Error::Duplicate`] if another row has the same duplicate key values.
    /// A null in any duplicate key column never matches.
    fn check_duplicate(&self, app: &Application, row: &Row, now: DateTime<Utc>) -> Result<()> {
        let descriptor = &self.descriptor;
        let mut criteria = Vec::with_capacity(descriptor.duplicate_keys.len());
        for column in &descriptor.duplicate_keys {
            let value = match row.get(column) {
                Some(value) => value.clone(),
                None => {
                    let column_type = descriptor
                        .column_type(column)
                        .ok_or_else(|| self.unknown_column(column))?;
                    let (_, value) = codec::to_storage(column_type, self.get(column)?, now)
                        .map_err(|reason| self.invalid(column, reason))?;
                    value
                }
            };
            if value.is_null() {
                return Ok(());
            }
            criteria.push((column.clone(), value));
        }

        let own_key = if self.persisted { self.primary_key()? } else { None };
        let duplicate = app
            .storage()
            .find(&descriptor.table, &criteria)?
            .iter()
            .any(|found| {
                let found_key = RowKey::new(
                    descriptor
                        .primary_keys
                        .iter()
                        .map(|k| found.get(k).cloned().unwrap_or(Value::Null))
                        .collect(),
                );
                own_key.as_ref() != Some(&found_key)
            });

        if duplicate {
            return Err(Error::Duplicate {
                class: descriptor.class.clone(),
                keys: criteria
                    .iter()
                    .map(|(column, value)| format!("{}={}", column, value))
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        Ok(())
    }

    fn insert_key(&self, row: &Row) -> Result<RowKey> {
        if self.descriptor.primary_keys.is_empty() {
            return Err(self.invalid(&self.key_label(), "class has no primary key"));
        }
        let mut values = Vec::with_capacity(self.descriptor.primary_keys.len());
        for column in &self.descriptor.primary_keys {
            match row.get(column) {
                Some(value) if !value.is_null() => values.push(value.clone()),
                _ => return Err(self.invalid(column, "primary key is not set")),
            }
        }
        Ok(RowKey::new(values))
    }

    fn describe_keys(&self) -> String {
        let keys = if self.descriptor.primary_keys.iter().all(|k| {
            self.values.get(k).is_some_and(|m| !m.is_empty())
        }) {
            &self.descriptor.primary_keys
        } else {
            &self.descriptor.find_keys
        };
        keys.iter()
            .map(|k| {
                let value = self.values.get(k).cloned().unwrap_or_default();
                format!("{}={}", k, value)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn key_label(&self) -> String {
        self.descriptor.primary_keys.join(",")
    }

    fn invalid(&self, column: &str, reason: impl Into<String>) -> Error {
        Error::Validation {
            class: self.descriptor.class.clone(),
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    fn unknown_column(&self, column: &str) -> Error {
        Error::UnknownColumn {
            class: self.descriptor.class.clone(),
            column: column.to_string(),
        }
    }

    fn unknown_relation(&self, relation: &str) -> Error {
        Error::UnknownRelation {
            class: self.descriptor.class.clone(),
            relation: relation.to_string(),
        }
    }
}

fn default_values(descriptor: &ClassDescriptor) -> BTreeMap<String, Member> {
    descriptor
        .column_names()
        .into_iter()
        .map(|column| {
            let value = descriptor.column_default(column).cloned().unwrap_or_default();
            (column.to_string(), value)
        })
        .collect()
}
