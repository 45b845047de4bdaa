//! Column type registry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic column types.
///
/// A column type decides how a member is coerced on write, how the stored
/// value is decoded on read, and what default a fresh instance gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Integer identifier, auto-assigned on insert when it is the sole primary key.
    Id,
    /// Plain integer.
    Integer,
    /// Double-precision float.
    #[serde(alias = "double", alias = "real", alias = "decimal")]
    Float,
    /// Text.
    #[serde(alias = "text")]
    String,
    /// Reference to another model by id (the storage side of a has_one).
    #[serde(alias = "orm")]
    Object,
    /// Arbitrary structured value stored as an encoded blob.
    Serialize,
    /// Structured value stored as JSON text.
    Json,
    /// Set to the current time when first inserted.
    Created,
    /// Set to the current time on every store.
    Modified,
    /// Point in time.
    #[serde(alias = "datetime")]
    Timestamp,
    /// Binary data exposed as a hex string.
    #[serde(alias = "hex32")]
    Hex,
    /// IPv4 address stored as a 32-bit integer.
    #[serde(alias = "ip4")]
    Ip,
    /// Boolean.
    Boolean,
}

impl ColumnType {
    /// All column types, in declaration order.
    pub const ALL: [ColumnType; 13] = [
        ColumnType::Id,
        ColumnType::Integer,
        ColumnType::Float,
        ColumnType::String,
        ColumnType::Object,
        ColumnType::Serialize,
        ColumnType::Json,
        ColumnType::Created,
        ColumnType::Modified,
        ColumnType::Timestamp,
        ColumnType::Hex,
        ColumnType::Ip,
        ColumnType::Boolean,
    ];

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Id => "id",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::String => "string",
            ColumnType::Object => "object",
            ColumnType::Serialize => "serialize",
            ColumnType::Json => "json",
            ColumnType::Created => "created",
            ColumnType::Modified => "modified",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Hex => "hex",
            ColumnType::Ip => "ip",
            ColumnType::Boolean => "boolean",
        }
    }

    /// Check if this type holds a point in time.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ColumnType::Created | ColumnType::Modified | ColumnType::Timestamp
        )
    }

    /// Check if the value is maintained by `store` rather than the caller.
    pub fn is_automatic(&self) -> bool {
        matches!(self, ColumnType::Created | ColumnType::Modified)
    }

    /// Check if this type holds structured (nested) data.
    pub fn is_structured(&self) -> bool {
        matches!(self, ColumnType::Serialize | ColumnType::Json)
    }

    /// Check if this type is integer-valued in storage.
    pub fn is_integer(&self) -> bool {
        matches!(self, ColumnType::Id | ColumnType::Integer)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let found = match lower.as_str() {
            "double" | "real" | "decimal" => Some(ColumnType::Float),
            "text" => Some(ColumnType::String),
            "orm" => Some(ColumnType::Object),
            "datetime" => Some(ColumnType::Timestamp),
            "hex32" => Some(ColumnType::Hex),
            "ip4" => Some(ColumnType::Ip),
            other => ColumnType::ALL.iter().copied().find(|t| t.name() == other),
        };
        found.ok_or_else(|| format!("unknown column type {:?}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_checks() {
        assert!(ColumnType::Created.is_temporal());
        assert!(ColumnType::Timestamp.is_temporal());
        assert!(!ColumnType::Hex.is_temporal());

        assert!(ColumnType::Modified.is_automatic());
        assert!(!ColumnType::Timestamp.is_automatic());

        assert!(ColumnType::Serialize.is_structured());
        assert!(ColumnType::Id.is_integer());
    }

    #[test]
    fn test_parse_names_and_aliases() {
        for t in ColumnType::ALL {
            assert_eq!(t.name().parse::<ColumnType>().unwrap(), t);
        }
        assert_eq!("ORM".parse::<ColumnType>().unwrap(), ColumnType::Object);
        assert_eq!("ip4".parse::<ColumnType>().unwrap(), ColumnType::Ip);
        assert_eq!("double".parse::<ColumnType>().unwrap(), ColumnType::Float);
        assert!("varchar".parse::<ColumnType>().is_err());
    }

    #[test]
    fn test_serde_aliases() {
        let t: ColumnType = serde_json::from_str("\"orm\"").unwrap();
        assert_eq!(t, ColumnType::Object);
        assert_eq!(serde_json::to_string(&ColumnType::Ip).unwrap(), "\"ip\"");
    }
}
