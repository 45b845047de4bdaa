//! On-disk row encoding.

use super::Row;
use crate::error::Error;
use rkyv::{Archive, Deserialize, Serialize};
use zesk_proto::{Value, FORMAT_VERSION};

/// A stored column.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoredColumn {
    /// Column name.
    pub name: String,
    /// Storage value.
    pub value: Value,
}

/// A row as written to a sled tree.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Record {
    /// Encoding version.
    pub version: u32,
    /// Columns in name order.
    pub columns: Vec<StoredColumn>,
}

impl Record {
    /// Build a record from a row.
    pub fn from_row(row: &Row) -> Self {
        Self {
            version: FORMAT_VERSION,
            columns: row
                .iter()
                .map(|(name, value)| StoredColumn {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    /// Convert back into a row.
    pub fn into_row(self) -> Row {
        self.columns
            .into_iter()
            .map(|column| (column.name, column.value))
            .collect()
    }

    /// Serialize the record to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let record = rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))?;
        if record.version != FORMAT_VERSION {
            return Err(Error::Value(zesk_proto::Error::VersionMismatch {
                expected: FORMAT_VERSION,
                actual: record.version,
            }));
        }
        Ok(record)
    }
}
