//! Row key encoding.

use crate::{Error, Value};
use std::fmt;

const TAG_NULL: u8 = 0;
const TAG_FALSE: u8 = 1;
const TAG_TRUE: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_STRING: u8 = 5;
const TAG_BYTES: u8 = 6;
const TAG_TIMESTAMP: u8 = 7;

/// Primary-key values of one row, in the descriptor's primary key order.
///
/// Key format: a sequence of `[tag (1 byte)][payload]` segments.
///
/// - Integers and timestamps are stored big-endian with the sign bit flipped,
///   so byte order matches numeric order and sled range scans stay sorted.
/// - Strings and bytes are length-prefixed (4 bytes, big-endian).
#[derive(Clone, PartialEq)]
pub struct RowKey {
    /// Key values in primary-key order.
    pub values: Vec<Value>,
}

impl RowKey {
    /// Create a key from values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Create a single-column key.
    pub fn single(value: impl Into<Value>) -> Self {
        Self {
            values: vec![value.into()],
        }
    }

    /// True when any key value is null (the row cannot be addressed).
    pub fn has_null(&self) -> bool {
        self.values.is_empty() || self.values.iter().any(Value::is_null)
    }

    /// Encode the key to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.values.len() * 9);
        for value in &self.values {
            match value {
                Value::Null => buf.push(TAG_NULL),
                Value::Bool(false) => buf.push(TAG_FALSE),
                Value::Bool(true) => buf.push(TAG_TRUE),
                Value::Int(i) => {
                    buf.push(TAG_INT);
                    buf.extend_from_slice(&order_preserving(*i));
                }
                Value::Float(f) => {
                    buf.push(TAG_FLOAT);
                    buf.extend_from_slice(&f.to_bits().to_be_bytes());
                }
                Value::String(s) => {
                    buf.push(TAG_STRING);
                    push_length_prefixed(&mut buf, s.as_bytes());
                }
                Value::Bytes(b) => {
                    buf.push(TAG_BYTES);
                    push_length_prefixed(&mut buf, b);
                }
                Value::Timestamp(t) => {
                    buf.push(TAG_TIMESTAMP);
                    buf.extend_from_slice(&order_preserving(*t));
                }
            }
        }
        buf
    }

    /// Decode a key from bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let mut values = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let tag = bytes[pos];
            pos += 1;
            let value = match tag {
                TAG_NULL => Value::Null,
                TAG_FALSE => Value::Bool(false),
                TAG_TRUE => Value::Bool(true),
                TAG_INT => Value::Int(read_ordered(bytes, &mut pos)?),
                TAG_TIMESTAMP => Value::Timestamp(read_ordered(bytes, &mut pos)?),
                TAG_FLOAT => {
                    let raw = read_array::<8>(bytes, &mut pos)?;
                    Value::Float(f64::from_bits(u64::from_be_bytes(raw)))
                }
                TAG_STRING => {
                    let raw = read_length_prefixed(bytes, &mut pos)?;
                    let s = String::from_utf8(raw.to_vec())
                        .map_err(|e| Error::InvalidKey(e.to_string()))?;
                    Value::String(s)
                }
                TAG_BYTES => Value::Bytes(read_length_prefixed(bytes, &mut pos)?.to_vec()),
                other => return Err(Error::InvalidKey(format!("unknown key tag {}", other))),
            };
            values.push(value);
        }
        Ok(Self { values })
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.values.iter().map(|v| v.to_string())).finish()
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

fn order_preserving(i: i64) -> [u8; 8] {
    ((i as u64) ^ (1 << 63)).to_be_bytes()
}

fn push_length_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

fn read_array<const N: usize>(bytes: &[u8], pos: &mut usize) -> Result<[u8; N], Error> {
    let end = *pos + N;
    if end > bytes.len() {
        return Err(Error::InvalidKey("truncated key".into()));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[*pos..end]);
    *pos = end;
    Ok(out)
}

fn read_ordered(bytes: &[u8], pos: &mut usize) -> Result<i64, Error> {
    let raw = read_array::<8>(bytes, pos)?;
    Ok((u64::from_be_bytes(raw) ^ (1 << 63)) as i64)
}

fn read_length_prefixed<'a>(bytes: &'a [u8], pos: &mut usize) -> Result<&'a [u8], Error> {
    let len = u32::from_be_bytes(read_array::<4>(bytes, pos)?) as usize;
    let end = *pos + len;
    if end > bytes.len() {
        return Err(Error::InvalidKey("truncated key segment".into()));
    }
    let out = &bytes[*pos..end];
    *pos = end;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_composite() {
        let key = RowKey::new(vec![
            Value::Int(-5),
            Value::String("contact".into()),
            Value::Bytes(vec![1, 2, 3]),
            Value::Bool(true),
        ]);
        let decoded = RowKey::decode(&key.encode()).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_integer_ordering() {
        let a = RowKey::single(-10i64).encode();
        let b = RowKey::single(0i64).encode();
        let c = RowKey::single(42i64).encode();

        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_null_detection() {
        assert!(RowKey::new(vec![]).has_null());
        assert!(RowKey::new(vec![Value::Int(1), Value::Null]).has_null());
        assert!(!RowKey::single(1i64).has_null());
    }

    #[test]
    fn test_decode_truncated() {
        let mut bytes = RowKey::single(7i64).encode();
        bytes.pop();
        assert!(RowKey::decode(&bytes).is_err());
        assert!(RowKey::decode(&[99]).is_err());
    }
}
