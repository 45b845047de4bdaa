//! Sled-backed storage.

use super::{explicit_id, matches, Record, Row, Storage};
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use sled::{Db, Tree};
use std::collections::HashMap;
use tracing::debug;
use zesk_proto::{RowKey, Value};

/// Tree name for counters and other metadata.
const META_TREE: &str = "meta";

/// Prefix of per-table row trees.
const TABLE_PREFIX: &str = "table:";

/// Prefix of id counters in the meta tree.
const NEXT_ID_PREFIX: &str = "next_id:";

/// Storage in a sled database: one tree per table, rows rkyv-encoded.
pub struct SledStorage {
    /// The underlying sled database.
    db: Db,

    /// Tree for counters.
    meta_tree: Tree,

    /// Table trees opened so far, by tree name.
    tables: RwLock<HashMap<String, Tree>>,
}

impl SledStorage {
    /// Open or create a database with the given configuration.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        let db = config.to_sled_config().open()?;
        let meta_tree = db.open_tree(META_TREE)?;
        debug!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "opened sled storage"
        );
        Ok(Self {
            db,
            meta_tree,
            tables: RwLock::new(HashMap::new()),
        })
    }

    /// Check if the database was recovered from a previous run.
    pub fn was_recovered(&self) -> bool {
        self.db.was_recovered()
    }

    /// Get the size of the database on disk.
    pub fn size_on_disk(&self) -> Result<u64> {
        Ok(self.db.size_on_disk()?)
    }

    fn tree_name(table: &str) -> String {
        format!("{}{}", TABLE_PREFIX, table)
    }

    /// Open the tree of `table`, creating it if needed. Used by writes.
    fn table(&self, table: &str) -> Result<Tree> {
        let name = Self::tree_name(table);
        if let Some(tree) = self.tables.read().get(&name) {
            return Ok(tree.clone());
        }
        let tree = self.db.open_tree(&name)?;
        self.tables.write().insert(name, tree.clone());
        Ok(tree)
    }

    /// The tree of `table` if it was ever written. Used by reads, which must not create trees.
    fn existing_table(&self, table: &str) -> Result<Option<Tree>> {
        let name = Self::tree_name(table);
        if let Some(tree) = self.tables.read().get(&name) {
            return Ok(Some(tree.clone()));
        }
        let exists = self
            .db
            .tree_names()
            .iter()
            .any(|n| &n[..] == name.as_bytes());
        if !exists {
            return Ok(None);
        }
        self.table(table).map(Some)
    }

    fn counter_key(table: &str) -> Vec<u8> {
        format!("{}{}", NEXT_ID_PREFIX, table).into_bytes()
    }

    /// Raise the id counter of `table` to at least `floor`, returning the new value.
    fn advance_counter(&self, table: &str, floor: Option<i64>) -> Result<i64> {
        let updated = self
            .meta_tree
            .update_and_fetch(Self::counter_key(table), |old| {
                let current = old.map(decode_counter).unwrap_or(0);
                let next = match floor {
                    Some(floor) => current.max(floor),
                    None => current + 1,
                };
                Some(next.to_be_bytes().to_vec())
            })?;
        Ok(updated.as_deref().map(decode_counter).unwrap_or(0))
    }

    fn decode_row(bytes: &[u8]) -> Result<Row> {
        Ok(Record::from_bytes(bytes)?.into_row())
    }
}

fn decode_counter(bytes: &[u8]) -> i64 {
    <[u8; 8]>::try_from(bytes)
        .map(i64::from_be_bytes)
        .unwrap_or(0)
}

impl Storage for SledStorage {
    fn next_id(&self, table: &str) -> Result<i64> {
        self.advance_counter(table, None)
    }

    fn insert(&self, table: &str, key: &RowKey, row: Row) -> Result<()> {
        let tree = self.table(table)?;
        let bytes = Record::from_row(&row).to_bytes()?;
        let swapped = tree.compare_and_swap(key.encode(), None as Option<&[u8]>, Some(bytes))?;
        if swapped.is_err() {
            return Err(Error::DuplicateKey {
                table: table.to_string(),
                key: key.to_string(),
            });
        }
        if let Some(id) = explicit_id(key) {
            self.advance_counter(table, Some(id))?;
        }
        Ok(())
    }

    fn update(&self, table: &str, key: &RowKey, changes: Row) -> Result<bool> {
        let Some(tree) = self.existing_table(table)? else {
            return Ok(false);
        };
        let encoded = key.encode();
        let Some(bytes) = tree.get(&encoded)? else {
            return Ok(false);
        };
        let mut row = Self::decode_row(&bytes)?;
        row.extend(changes);
        tree.insert(encoded, Record::from_row(&row).to_bytes()?)?;
        Ok(true)
    }

    fn load(&self, table: &str, key: &RowKey) -> Result<Option<Row>> {
        let Some(tree) = self.existing_table(table)? else {
            return Ok(None);
        };
        match tree.get(key.encode())? {
            Some(bytes) => Ok(Some(Self::decode_row(&bytes)?)),
            None => Ok(None),
        }
    }

    fn find(&self, table: &str, criteria: &[(String, Value)]) -> Result<Vec<Row>> {
        let Some(tree) = self.existing_table(table)? else {
            return Ok(Vec::new());
        };
        let mut rows = Vec::new();
        for result in tree.iter() {
            let (_, bytes) = result?;
            let row = Self::decode_row(&bytes)?;
            if matches(&row, criteria) {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn delete(&self, table: &str, key: &RowKey) -> Result<bool> {
        let Some(tree) = self.existing_table(table)? else {
            return Ok(false);
        };
        Ok(tree.remove(key.encode())?.is_some())
    }

    fn count(&self, table: &str) -> Result<usize> {
        Ok(self.existing_table(table)?.map_or(0, |tree| tree.len()))
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestDb {
        storage: SledStorage,
        _dir: tempfile::TempDir, // Keep the temp dir alive
    }

    impl std::ops::Deref for TestDb {
        type Target = SledStorage;
        fn deref(&self) -> &Self::Target {
            &self.storage
        }
    }

    fn test_storage() -> TestDb {
        let dir = tempfile::tempdir().unwrap();
        let storage = SledStorage::open(&StorageConfig::sled(dir.path())).unwrap();
        TestDb { storage, _dir: dir }
    }

    fn row(id: i64, contact: i64) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::Int(id));
        row.insert("contact".into(), Value::Int(contact));
        row
    }

    #[test]
    fn test_insert_and_load() {
        let storage = test_storage();
        let key = RowKey::single(1i64);
        storage.insert("email", &key, row(1, 9)).unwrap();

        assert_eq!(storage.load("email", &key).unwrap(), Some(row(1, 9)));
        assert!(storage.load("email", &RowKey::single(2i64)).unwrap().is_none());
        assert!(storage.load("other", &key).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert() {
        let storage = test_storage();
        let key = RowKey::single(1i64);
        storage.insert("email", &key, row(1, 9)).unwrap();
        assert!(matches!(
            storage.insert("email", &key, row(1, 10)),
            Err(Error::DuplicateKey { .. })
        ));
        assert_eq!(storage.load("email", &key).unwrap(), Some(row(1, 9)));
    }

    #[test]
    fn test_next_id() {
        let storage = test_storage();
        assert_eq!(storage.next_id("email").unwrap(), 1);
        assert_eq!(storage.next_id("email").unwrap(), 2);
        storage.insert("email", &RowKey::single(40i64), row(40, 1)).unwrap();
        assert_eq!(storage.next_id("email").unwrap(), 41);
        assert_eq!(storage.next_id("phone").unwrap(), 1);
    }

    #[test]
    fn test_update_find_delete() {
        let storage = test_storage();
        for id in 1..=3 {
            storage
                .insert("email", &RowKey::single(id), row(id, id % 2))
                .unwrap();
        }

        let mut changes = Row::new();
        changes.insert("contact".into(), Value::Int(1));
        assert!(storage.update("email", &RowKey::single(2i64), changes).unwrap());

        let found = storage
            .find("email", &[("contact".into(), Value::Int(1))])
            .unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0]["id"], Value::Int(1));

        assert!(storage.delete("email", &RowKey::single(2i64)).unwrap());
        assert_eq!(storage.count("email").unwrap(), 2);
    }

    #[test]
    fn test_reads_do_not_create_tables() {
        let storage = test_storage();
        let key = RowKey::single(1i64);

        assert!(storage.load("ghost", &key).unwrap().is_none());
        assert!(storage.find("ghost", &[]).unwrap().is_empty());
        assert_eq!(storage.count("ghost").unwrap(), 0);
        assert!(!storage.delete("ghost", &key).unwrap());
        assert!(!storage.update("ghost", &key, Row::new()).unwrap());

        let has_tree = |name: &str| {
            storage
                .db
                .tree_names()
                .iter()
                .any(|n| &n[..] == name.as_bytes())
        };
        assert!(!has_tree("table:ghost"));

        storage.insert("ghost", &key, row(1, 1)).unwrap();
        assert!(has_tree("table:ghost"));
        assert_eq!(storage.count("ghost").unwrap(), 1);
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::sled(dir.path());
        let key = RowKey::single(5i64);

        {
            let storage = SledStorage::open(&config).unwrap();
            storage.insert("email", &key, row(5, 1)).unwrap();
            storage.flush().unwrap();
        }

        {
            let storage = SledStorage::open(&config).unwrap();
            assert_eq!(storage.load("email", &key).unwrap(), Some(row(5, 1)));
            assert_eq!(storage.next_id("email").unwrap(), 6);
        }
    }
}
