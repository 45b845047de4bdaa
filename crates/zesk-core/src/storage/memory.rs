//! In-memory storage.

use super::{explicit_id, matches, Row, Storage};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use zesk_proto::{RowKey, Value};

#[derive(Default)]
struct Table {
    /// Rows by encoded key, so iteration follows key order.
    rows: BTreeMap<Vec<u8>, Row>,
    /// Last id handed out or seen.
    last_id: i64,
}

/// Storage kept in process memory. Contents are lost on drop.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of tables that hold at least one row, sorted.
    pub fn tables(&self) -> Vec<String> {
        let tables = self.tables.read();
        let mut names: Vec<String> = tables
            .iter()
            .filter(|(_, table)| !table.rows.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Storage for MemoryStorage {
    fn next_id(&self, table: &str) -> Result<i64> {
        let mut tables = self.tables.write();
        let table = tables.entry(table.to_string()).or_default();
        table.last_id += 1;
        Ok(table.last_id)
    }

    fn insert(&self, table: &str, key: &RowKey, row: Row) -> Result<()> {
        let mut tables = self.tables.write();
        let entry = tables.entry(table.to_string()).or_default();
        let encoded = key.encode();
        if entry.rows.contains_key(&encoded) {
            return Err(Error::DuplicateKey {
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        if let Some(id) = explicit_id(key) {
            entry.last_id = entry.last_id.max(id);
        }
        entry.rows.insert(encoded, row);
        Ok(())
    }

    fn update(&self, table: &str, key: &RowKey, changes: Row) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(row) = tables
            .get_mut(table)
            .and_then(|t| t.rows.get_mut(&key.encode()))
        else {
            return Ok(false);
        };
        row.extend(changes);
        Ok(true)
    }

    fn load(&self, table: &str, key: &RowKey) -> Result<Option<Row>> {
        let tables = self.tables.read();
        Ok(tables
            .get(table)
            .and_then(|t| t.rows.get(&key.encode()))
            .cloned())
    }

    fn find(&self, table: &str, criteria: &[(String, Value)]) -> Result<Vec<Row>> {
        let tables = self.tables.read();
        Ok(tables
            .get(table)
            .map(|t| {
                t.rows
                    .values()
                    .filter(|row| matches(row, criteria))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn delete(&self, table: &str, key: &RowKey) -> Result<bool> {
        let mut tables = self.tables.write();
        Ok(tables
            .get_mut(table)
            .and_then(|t| t.rows.remove(&key.encode()))
            .is_some())
    }

    fn count(&self, table: &str) -> Result<usize> {
        Ok(self.tables.read().get(table).map_or(0, |t| t.rows.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, name: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::Int(id));
        row.insert("name".into(), Value::from(name));
        row
    }

    #[test]
    fn test_insert_load_delete() {
        let storage = MemoryStorage::new();
        let key = RowKey::single(1i64);

        storage.insert("person", &key, row(1, "Ada")).unwrap();
        assert_eq!(storage.load("person", &key).unwrap(), Some(row(1, "Ada")));
        assert_eq!(storage.count("person").unwrap(), 1);
        assert_eq!(storage.tables(), vec!["person"]);

        assert!(storage.delete("person", &key).unwrap());
        assert!(!storage.delete("person", &key).unwrap());
        assert!(storage.load("person", &key).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert() {
        let storage = MemoryStorage::new();
        let key = RowKey::single(1i64);
        storage.insert("person", &key, row(1, "Ada")).unwrap();
        assert!(matches!(
            storage.insert("person", &key, row(1, "Bob")),
            Err(Error::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_update_merges() {
        let storage = MemoryStorage::new();
        let key = RowKey::single(1i64);
        storage.insert("person", &key, row(1, "Ada")).unwrap();

        let mut changes = Row::new();
        changes.insert("name".into(), Value::from("Grace"));
        assert!(storage.update("person", &key, changes.clone()).unwrap());
        assert!(!storage.update("person", &RowKey::single(2i64), changes).unwrap());

        let loaded = storage.load("person", &key).unwrap().unwrap();
        assert_eq!(loaded["name"], Value::from("Grace"));
        assert_eq!(loaded["id"], Value::Int(1));
    }

    #[test]
    fn test_next_id_skips_explicit_ids() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.next_id("person").unwrap(), 1);
        storage.insert("person", &RowKey::single(10i64), row(10, "Ada")).unwrap();
        assert_eq!(storage.next_id("person").unwrap(), 11);
        assert_eq!(storage.next_id("other").unwrap(), 1);
    }

    #[test]
    fn test_find_in_key_order() {
        let storage = MemoryStorage::new();
        for (id, name) in [(3i64, "c"), (1, "a"), (2, "a")] {
            storage.insert("t", &RowKey::single(id), row(id, name)).unwrap();
        }
        let found = storage
            .find("t", &[("name".into(), Value::from("a"))])
            .unwrap();
        let ids: Vec<_> = found.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2)]);
        assert!(storage.find("missing", &[]).unwrap().is_empty());
    }
}
