//! Row storage behind model instances.
//!
//! Model instances never talk to a database directly. They hand flat rows of
//! [`Value`]s to a [`Storage`] implementation keyed by table name and
//! primary-key values.

mod disk;
mod memory;
mod record;

pub use disk::SledStorage;
pub use memory::MemoryStorage;
pub use record::Record;

use crate::error::Result;
use std::collections::BTreeMap;
use zesk_proto::{RowKey, Value};

/// One stored row: column name to storage value.
pub type Row = BTreeMap<String, Value>;

/// Persistence collaborator for model instances.
///
/// Implementations are shared by the whole application, so they take `&self`
/// and synchronize internally.
pub trait Storage: Send + Sync {
    /// Allocate the next integer id for `table`. Ids start at 1.
    fn next_id(&self, table: &str) -> Result<i64>;

    /// Insert a new row. Fails with `DuplicateKey` if the key exists.
    fn insert(&self, table: &str, key: &RowKey, row: Row) -> Result<()>;

    /// Merge `changes` into an existing row. Returns false if no row has the key.
    fn update(&self, table: &str, key: &RowKey, changes: Row) -> Result<bool>;

    /// Load a row by key.
    fn load(&self, table: &str, key: &RowKey) -> Result<Option<Row>>;

    /// Rows whose columns equal every `(column, value)` criterion, in key order.
    fn find(&self, table: &str, criteria: &[(String, Value)]) -> Result<Vec<Row>>;

    /// Delete a row. Returns false if no row had the key.
    fn delete(&self, table: &str, key: &RowKey) -> Result<bool>;

    /// Number of rows in `table`.
    fn count(&self, table: &str) -> Result<usize>;

    /// Flush pending writes to durable storage.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Check a row against find criteria.
pub(crate) fn matches(row: &Row, criteria: &[(String, Value)]) -> bool {
    criteria
        .iter()
        .all(|(column, value)| row.get(column).unwrap_or(&Value::Null) == value)
}

/// The largest integer a single-column key holds, used to keep id counters ahead of explicit ids.
pub(crate) fn explicit_id(key: &RowKey) -> Option<i64> {
    match key.values.as_slice() {
        [Value::Int(id)] => Some(*id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        let mut row = Row::new();
        row.insert("contact".into(), Value::Int(3));
        row.insert("kind".into(), Value::from("home"));

        assert!(matches(&row, &[]));
        assert!(matches(&row, &[("contact".into(), Value::Int(3))]));
        assert!(!matches(&row, &[("contact".into(), Value::Int(4))]));
        assert!(matches(&row, &[("missing".into(), Value::Null)]));
    }

    #[test]
    fn test_explicit_id() {
        assert_eq!(explicit_id(&RowKey::single(7i64)), Some(7));
        assert_eq!(explicit_id(&RowKey::single("x")), None);
        assert_eq!(
            explicit_id(&RowKey::new(vec![Value::Int(1), Value::Int(2)])),
            None
        );
    }
}
