//! In-memory member values.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// A column value as held by a [`ModelInstance`](super::ModelInstance).
///
/// Members are the rich, caller-facing form. Each column type has a canonical
/// member form that `store` writes back after coercion, and a storage form
/// ([`zesk_proto::Value`]) produced by the codec.
///
/// Serde maps members to and from plain JSON so that manifest defaults read
/// naturally (`"status": "active"`, `"count": 0`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Member {
    /// No value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer (also ids and object references).
    Int(i64),
    /// Float.
    Float(f64),
    /// Text (also hex-encoded binary for hex columns).
    String(String),
    /// Raw binary.
    Bytes(Vec<u8>),
    /// Point in time, UTC.
    Timestamp(DateTime<Utc>),
    /// IPv4 address.
    Ip(Ipv4Addr),
    /// Structured data (serialize and json columns).
    Structured(serde_json::Value),
}

impl Member {
    /// Check if this member is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Member::Null)
    }

    /// Null, or an empty/whitespace-only string.
    pub fn is_empty(&self) -> bool {
        match self {
            Member::Null => true,
            Member::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Member::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Member::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64. Integers widen.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Member::Float(f) => Some(*f),
            Member::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Member::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as timestamp.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Member::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Try to get as IPv4 address.
    pub fn as_ip(&self) -> Option<Ipv4Addr> {
        match self {
            Member::Ip(ip) => Some(*ip),
            _ => None,
        }
    }

    /// Try to get as structured data.
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            Member::Structured(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Member::Null => "null",
            Member::Bool(_) => "bool",
            Member::Int(_) => "int",
            Member::Float(_) => "float",
            Member::String(_) => "string",
            Member::Bytes(_) => "bytes",
            Member::Timestamp(_) => "timestamp",
            Member::Ip(_) => "ip",
            Member::Structured(_) => "structured",
        }
    }

    /// Wrap decoded structured data. JSON null becomes [`Member::Null`].
    pub fn from_structured(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Member::Null,
            other => Member::Structured(other),
        }
    }

    /// Convert to JSON. Timestamps render as RFC 3339, bytes as hex.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Member::Null => serde_json::Value::Null,
            Member::Bool(b) => serde_json::Value::Bool(*b),
            Member::Int(i) => serde_json::Value::from(*i),
            Member::Float(f) => serde_json::Value::from(*f),
            Member::String(s) => serde_json::Value::String(s.clone()),
            Member::Bytes(b) => serde_json::Value::String(hex::encode(b)),
            Member::Timestamp(t) => {
                serde_json::Value::String(t.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            Member::Ip(ip) => serde_json::Value::String(ip.to_string()),
            Member::Structured(v) => v.clone(),
        }
    }
}

impl From<serde_json::Value> for Member {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Member::Null,
            serde_json::Value::Bool(b) => Member::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Member::Int(i),
                None => n.as_f64().map(Member::Float).unwrap_or(Member::Null),
            },
            serde_json::Value::String(s) => Member::String(s),
            other => Member::Structured(other),
        }
    }
}

impl From<Member> for serde_json::Value {
    fn from(m: Member) -> Self {
        m.to_json()
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Null => write!(f, "NULL"),
            Member::Bool(b) => write!(f, "{}", b),
            Member::Int(i) => write!(f, "{}", i),
            Member::Float(x) => write!(f, "{}", x),
            Member::String(s) => write!(f, "{}", s),
            Member::Bytes(b) => write!(f, "{}", hex::encode(b)),
            Member::Timestamp(t) => write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Member::Ip(ip) => write!(f, "{}", ip),
            Member::Structured(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Member {
    fn from(v: bool) -> Self {
        Member::Bool(v)
    }
}

impl From<i32> for Member {
    fn from(v: i32) -> Self {
        Member::Int(v as i64)
    }
}

impl From<i64> for Member {
    fn from(v: i64) -> Self {
        Member::Int(v)
    }
}

impl From<f64> for Member {
    fn from(v: f64) -> Self {
        Member::Float(v)
    }
}

impl From<String> for Member {
    fn from(v: String) -> Self {
        Member::String(v)
    }
}

impl From<&str> for Member {
    fn from(v: &str) -> Self {
        Member::String(v.to_string())
    }
}

impl From<Vec<u8>> for Member {
    fn from(v: Vec<u8>) -> Self {
        Member::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Member {
    fn from(v: DateTime<Utc>) -> Self {
        Member::Timestamp(v)
    }
}

impl From<Ipv4Addr> for Member {
    fn from(v: Ipv4Addr) -> Self {
        Member::Ip(v)
    }
}

impl<T: Into<Member>> From<Option<T>> for Member {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Member::Null,
        }
    }
}
