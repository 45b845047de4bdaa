//! Per-column-type coercion between members and storage values.
//!
//! Every column type has three forms: whatever the caller `set`, the canonical
//! member form, and the flat storage [`Value`]. [`canonicalize`] maps the first
//! to the second, [`to_storage`] the second to the third, and [`from_storage`]
//! goes back. Coercion failures are plain reason strings; the caller attaches
//! class and column.

use crate::catalog::ColumnType;
use crate::model::Member;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::net::Ipv4Addr;
use zesk_proto::Value;

/// Text timestamp format accepted besides RFC 3339.
pub const SQL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Zero date used by SQL dumps to mean "no value".
const ZERO_DATETIME: &str = "0000-00-00 00:00:00";

type Coerced<T> = std::result::Result<T, String>;

/// Coerce a member into the canonical form for `column_type`.
///
/// `now` is substituted for the literal `"now"` in temporal columns.
pub fn canonicalize(column_type: ColumnType, member: &Member, now: DateTime<Utc>) -> Coerced<Member> {
    if member.is_null() {
        return Ok(Member::Null);
    }
    match column_type {
        ColumnType::Id | ColumnType::Integer => to_integer(member),
        ColumnType::Float => to_float(member),
        ColumnType::String => to_text(member),
        ColumnType::Object => to_object_id(member),
        ColumnType::Serialize | ColumnType::Json => Ok(to_structured(member)),
        ColumnType::Created | ColumnType::Modified | ColumnType::Timestamp => {
            to_timestamp(member, now)
        }
        ColumnType::Hex => to_hex(member),
        ColumnType::Ip => to_ip(member),
        ColumnType::Boolean => to_boolean(member),
    }
}

/// Coerce a member and encode it for storage.
///
/// Returns the canonical member alongside the stored value so the caller can
/// write it back after a successful store.
pub fn to_storage(
    column_type: ColumnType,
    member: &Member,
    now: DateTime<Utc>,
) -> Coerced<(Member, Value)> {
    let canonical = canonicalize(column_type, member, now)?;
    let value = encode(column_type, &canonical)?;
    Ok((canonical, value))
}

/// Decode a stored value into its canonical member form.
pub fn from_storage(column_type: ColumnType, value: Value) -> Coerced<Member> {
    if value.is_null() {
        return Ok(Member::Null);
    }
    let kind = value.kind();
    let decoded = match (column_type, value) {
        (ColumnType::Id | ColumnType::Integer, Value::Int(i)) => Member::Int(i),
        (ColumnType::Id | ColumnType::Integer, Value::Bool(b)) => Member::Int(b as i64),
        (ColumnType::Float, Value::Float(f)) => Member::Float(f),
        (ColumnType::Float, Value::Int(i)) => Member::Float(i as f64),
        (ColumnType::String, Value::String(s)) => Member::String(s),
        (ColumnType::Object, Value::Int(i)) => Member::Int(i),
        (ColumnType::Object, Value::String(s)) => Member::String(s),
        (ColumnType::Serialize, Value::Bytes(bytes)) => {
            let v: serde_json::Value = serde_json::from_slice(&bytes)
                .map_err(|e| format!("corrupt serialized value: {}", e))?;
            Member::from_structured(v)
        }
        (ColumnType::Json | ColumnType::Serialize, Value::String(text)) => {
            let v: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| format!("corrupt json value: {}", e))?;
            Member::from_structured(v)
        }
        (ColumnType::Created | ColumnType::Modified | ColumnType::Timestamp, Value::Timestamp(us)) => {
            DateTime::from_timestamp_micros(us)
                .map(Member::Timestamp)
                .ok_or_else(|| format!("timestamp {} out of range", us))?
        }
        (ColumnType::Hex, Value::Bytes(bytes)) => Member::String(hex::encode(bytes)),
        (ColumnType::Ip, Value::Int(i)) => {
            let bits = u32::try_from(i).map_err(|_| format!("{} is not an IPv4 address", i))?;
            Member::Ip(Ipv4Addr::from(bits))
        }
        (ColumnType::Boolean, Value::Bool(b)) => Member::Bool(b),
        (ColumnType::Boolean, Value::Int(i)) => Member::Bool(i != 0),
        (column_type, _) => {
            return Err(format!("stored {} value cannot be read as {}", kind, column_type));
        }
    };
    Ok(decoded)
}

/// Encode a canonical member.
fn encode(column_type: ColumnType, canonical: &Member) -> Coerced<Value> {
    let value = match (column_type, canonical) {
        (_, Member::Null) => Value::Null,
        (ColumnType::Id | ColumnType::Integer | ColumnType::Object, Member::Int(i)) => Value::Int(*i),
        (ColumnType::Float, Member::Float(f)) => Value::Float(*f),
        (ColumnType::String | ColumnType::Object, Member::String(s)) => Value::String(s.clone()),
        (ColumnType::Serialize, Member::Structured(v)) => Value::Bytes(
            serde_json::to_vec(v).map_err(|e| format!("cannot serialize value: {}", e))?,
        ),
        (ColumnType::Json, Member::Structured(v)) => Value::String(
            serde_json::to_string(v).map_err(|e| format!("cannot serialize value: {}", e))?,
        ),
        (ColumnType::Created | ColumnType::Modified | ColumnType::Timestamp, Member::Timestamp(t)) => {
            Value::Timestamp(t.timestamp_micros())
        }
        (ColumnType::Hex, Member::String(s)) => {
            Value::Bytes(hex::decode(s).map_err(|e| format!("invalid hex: {}", e))?)
        }
        (ColumnType::Ip, Member::Ip(ip)) => Value::Int(u32::from(*ip) as i64),
        (ColumnType::Boolean, Member::Bool(b)) => Value::Bool(*b),
        (column_type, other) => {
            return Err(format!("{} value is not a canonical {}", other.kind(), column_type));
        }
    };
    Ok(value)
}

/// Floats at or beyond 2^63 in magnitude do not fit an `i64`.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

fn rejected(member: &Member, wanted: &str) -> String {
    format!("{} value {} cannot be used as {}", member.kind(), member, wanted)
}

fn to_integer(member: &Member) -> Coerced<Member> {
    match member {
        Member::Int(i) => Ok(Member::Int(*i)),
        Member::Bool(b) => Ok(Member::Int(*b as i64)),
        Member::Float(f) if f.fract() == 0.0 && f.abs() < I64_LIMIT => Ok(Member::Int(*f as i64)),
        Member::String(s) if s.trim().is_empty() => Ok(Member::Null),
        Member::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Member::Int)
            .map_err(|_| rejected(member, "an integer")),
        _ => Err(rejected(member, "an integer")),
    }
}

fn to_float(member: &Member) -> Coerced<Member> {
    match member {
        Member::Float(f) => Ok(Member::Float(*f)),
        Member::Int(i) => Ok(Member::Float(*i as f64)),
        Member::Bool(b) => Ok(Member::Float(if *b { 1.0 } else { 0.0 })),
        Member::String(s) if s.trim().is_empty() => Ok(Member::Null),
        Member::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Member::Float)
            .map_err(|_| rejected(member, "a float")),
        _ => Err(rejected(member, "a float")),
    }
}

fn to_text(member: &Member) -> Coerced<Member> {
    match member {
        Member::String(s) => Ok(Member::String(s.clone())),
        Member::Bytes(bytes) => String::from_utf8(bytes.clone())
            .map(Member::String)
            .map_err(|_| "bytes are not valid UTF-8".to_string()),
        Member::Structured(_) => Err(rejected(member, "text")),
        other => Ok(Member::String(other.to_string())),
    }
}

fn to_object_id(member: &Member) -> Coerced<Member> {
    match member {
        Member::Int(i) => Ok(Member::Int(*i)),
        Member::String(s) if s.trim().is_empty() => Ok(Member::Null),
        Member::String(s) => match s.trim().parse::<i64>() {
            Ok(i) => Ok(Member::Int(i)),
            Err(_) => Ok(Member::String(s.clone())),
        },
        _ => Err(rejected(member, "an object id")),
    }
}

fn to_structured(member: &Member) -> Member {
    Member::from_structured(member.to_json())
}

fn to_timestamp(member: &Member, now: DateTime<Utc>) -> Coerced<Member> {
    let parsed = match member {
        Member::Timestamp(t) => *t,
        Member::Int(secs) => DateTime::from_timestamp(*secs, 0)
            .ok_or_else(|| format!("epoch seconds {} out of range", secs))?,
        Member::String(s) => match s.trim() {
            "" | ZERO_DATETIME => return Ok(Member::Null),
            text if text.eq_ignore_ascii_case("now") => now,
            text => parse_datetime(text).ok_or_else(|| rejected(member, "a timestamp"))?,
        },
        _ => return Err(rejected(member, "a timestamp")),
    };
    truncate_micros(parsed).map(Member::Timestamp)
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, SQL_DATETIME_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    text.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// Storage keeps microseconds; drop anything finer so store/fetch agree.
fn truncate_micros(t: DateTime<Utc>) -> Coerced<DateTime<Utc>> {
    DateTime::from_timestamp_micros(t.timestamp_micros())
        .ok_or_else(|| format!("timestamp {} out of range", t))
}

fn to_hex(member: &Member) -> Coerced<Member> {
    match member {
        Member::Bytes(bytes) => Ok(Member::String(hex::encode(bytes))),
        Member::String(s) => {
            let lower = s.trim().to_ascii_lowercase();
            hex::decode(&lower).map_err(|e| format!("{:?} is not valid hex: {}", s, e))?;
            Ok(Member::String(lower))
        }
        _ => Err(rejected(member, "hex")),
    }
}

fn to_ip(member: &Member) -> Coerced<Member> {
    match member {
        Member::Ip(ip) => Ok(Member::Ip(*ip)),
        Member::String(s) if s.trim().is_empty() => Ok(Member::Null),
        Member::String(s) => s
            .trim()
            .parse::<Ipv4Addr>()
            .map(Member::Ip)
            .map_err(|_| rejected(member, "an IPv4 address")),
        Member::Int(i) => u32::try_from(*i)
            .map(|bits| Member::Ip(Ipv4Addr::from(bits)))
            .map_err(|_| rejected(member, "an IPv4 address")),
        _ => Err(rejected(member, "an IPv4 address")),
    }
}

fn to_boolean(member: &Member) -> Coerced<Member> {
    match member {
        Member::Bool(b) => Ok(Member::Bool(*b)),
        Member::Int(i) => Ok(Member::Bool(*i != 0)),
        Member::String(s) => parse_bool(s)
            .map(Member::Bool)
            .ok_or_else(|| rejected(member, "a boolean")),
        _ => Err(rejected(member, "a boolean")),
    }
}

/// Parse the textual booleans accepted by boolean columns.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn roundtrip(column_type: ColumnType, member: Member) -> Member {
        let (canonical, value) = to_storage(column_type, &member, now()).unwrap();
        let decoded = from_storage(column_type, value).unwrap();
        assert_eq!(decoded, canonical);
        decoded
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(canonicalize(ColumnType::Integer, &"42".into(), now()).unwrap(), Member::Int(42));
        assert_eq!(canonicalize(ColumnType::Id, &true.into(), now()).unwrap(), Member::Int(1));
        assert_eq!(canonicalize(ColumnType::Integer, &"".into(), now()).unwrap(), Member::Null);
        assert!(canonicalize(ColumnType::Integer, &"4x".into(), now()).is_err());
        assert!(canonicalize(ColumnType::Integer, &1.5.into(), now()).is_err());
        assert_eq!(canonicalize(ColumnType::Integer, &3.0.into(), now()).unwrap(), Member::Int(3));
        assert!(canonicalize(ColumnType::Id, &Member::Float(1e300), now()).is_err());
        assert!(canonicalize(ColumnType::Id, &Member::Float(-1e19), now()).is_err());
        assert!(canonicalize(ColumnType::Integer, &Member::Float(f64::INFINITY), now()).is_err());
        assert!(canonicalize(ColumnType::Integer, &Member::Float(f64::NAN), now()).is_err());
    }

    #[test]
    fn test_string_rejects_structured() {
        let m = Member::Structured(json!({"a": 1}));
        assert!(canonicalize(ColumnType::String, &m, now()).is_err());
        assert_eq!(
            canonicalize(ColumnType::String, &Member::Int(7), now()).unwrap(),
            Member::String("7".into())
        );
    }

    #[test]
    fn test_serialize_roundtrips_map() {
        let map = Member::Structured(json!({"a": 1, "b": 2}));
        assert_eq!(roundtrip(ColumnType::Serialize, map.clone()), map);
        assert_eq!(roundtrip(ColumnType::Json, map.clone()), map);

        let (_, value) = to_storage(ColumnType::Serialize, &map, now()).unwrap();
        assert!(matches!(value, Value::Bytes(_)));
        let (_, value) = to_storage(ColumnType::Json, &map, now()).unwrap();
        assert!(matches!(value, Value::String(_)));
    }

    #[test]
    fn test_serialize_scalars() {
        assert_eq!(
            roundtrip(ColumnType::Serialize, Member::Int(5)),
            Member::Structured(json!(5))
        );
        assert_eq!(
            roundtrip(ColumnType::Json, "text".into()),
            Member::Structured(json!("text"))
        );
    }

    #[test]
    fn test_timestamp_parsing() {
        let expected = Member::Timestamp(now());
        assert_eq!(canonicalize(ColumnType::Timestamp, &"now".into(), now()).unwrap(), expected);
        assert_eq!(
            canonicalize(ColumnType::Timestamp, &"2024-05-01 12:00:00".into(), now()).unwrap(),
            expected
        );
        assert_eq!(
            canonicalize(ColumnType::Timestamp, &"2024-05-01T14:00:00+02:00".into(), now()).unwrap(),
            expected
        );
        assert_eq!(
            canonicalize(ColumnType::Timestamp, &Member::Int(now().timestamp()), now()).unwrap(),
            expected
        );
        assert_eq!(
            canonicalize(ColumnType::Timestamp, &ZERO_DATETIME.into(), now()).unwrap(),
            Member::Null
        );
        assert!(canonicalize(ColumnType::Timestamp, &"yesterday".into(), now()).is_err());
    }

    #[test]
    fn test_timestamp_truncates_to_micros() {
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let decoded = roundtrip(ColumnType::Timestamp, Member::Timestamp(precise));
        assert_eq!(
            decoded.as_timestamp().unwrap().timestamp_subsec_nanos(),
            123_456_000
        );
    }

    #[test]
    fn test_hex() {
        assert_eq!(roundtrip(ColumnType::Hex, "DEADbeef".into()), Member::String("deadbeef".into()));
        assert_eq!(
            canonicalize(ColumnType::Hex, &Member::Bytes(vec![1, 2]), now()).unwrap(),
            Member::String("0102".into())
        );
        assert!(canonicalize(ColumnType::Hex, &"xyz".into(), now()).is_err());
        assert!(canonicalize(ColumnType::Hex, &"abc".into(), now()).is_err());
    }

    #[test]
    fn test_ip() {
        let (canonical, value) = to_storage(ColumnType::Ip, &"192.168.1.10".into(), now()).unwrap();
        assert_eq!(canonical, Member::Ip(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(value, Value::Int(0xC0A8_010A));
        assert_eq!(from_storage(ColumnType::Ip, value).unwrap(), canonical);
        assert!(canonicalize(ColumnType::Ip, &"300.1.1.1".into(), now()).is_err());
        assert!(canonicalize(ColumnType::Ip, &Member::Int(-1), now()).is_err());
    }

    #[test]
    fn test_boolean() {
        for text in ["yes", "on", "T", "1", "true"] {
            assert_eq!(canonicalize(ColumnType::Boolean, &text.into(), now()).unwrap(), Member::Bool(true));
        }
        for text in ["no", "off", "f", "0", "N"] {
            assert_eq!(canonicalize(ColumnType::Boolean, &text.into(), now()).unwrap(), Member::Bool(false));
        }
        assert!(canonicalize(ColumnType::Boolean, &"maybe".into(), now()).is_err());
    }

    #[test]
    fn test_object_id() {
        assert_eq!(canonicalize(ColumnType::Object, &"12".into(), now()).unwrap(), Member::Int(12));
        assert_eq!(
            canonicalize(ColumnType::Object, &"abc".into(), now()).unwrap(),
            Member::String("abc".into())
        );
        assert_eq!(canonicalize(ColumnType::Object, &"".into(), now()).unwrap(), Member::Null);
    }

    #[test]
    fn test_from_storage_type_mismatch() {
        assert!(from_storage(ColumnType::Hex, Value::Int(3)).is_err());
        assert_eq!(from_storage(ColumnType::Hex, Value::Null).unwrap(), Member::Null);
    }
}
