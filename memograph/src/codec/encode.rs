//! Native encoder.

use crate::codec::TypeTag;
use crate::value::Value;

/// Encodes a value into the native self-describing format.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_size(value));
    write_value(&mut buf, value);
    buf
}

/// Exact size in bytes of the native encoding of `value`.
pub fn encoded_size(value: &Value) -> usize {
    const TAG: usize = 4;
    TAG + match value {
        Value::Nil => 0,
        Value::Boolean(_) => 1,
        Value::Integer(_) | Value::Float(_) | Value::Datetime(_) => 8,
        Value::String(s) => 4 + s.len(),
        Value::Blob(b) => 8 + b.len(),
        Value::Array(items) => 8 + items.iter().map(encoded_size).sum::<usize>(),
        Value::Map(entries) => {
            8 + entries
                .iter()
                .map(|(k, v)| encoded_size(k) + encoded_size(v))
                .sum::<usize>()
        }
    }
}

pub(crate) fn write_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Nil => write_tag(buf, TypeTag::Nil),
        Value::Boolean(v) => {
            write_tag(buf, TypeTag::Boolean);
            buf.push(u8::from(*v));
        }
        Value::Integer(v) => {
            write_tag(buf, TypeTag::Integer);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::Float(v) => {
            write_tag(buf, TypeTag::Float);
            buf.extend_from_slice(&v.to_le_bytes());
        }
        Value::String(s) => {
            write_tag(buf, TypeTag::String);
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Blob(b) => {
            write_tag(buf, TypeTag::Blob);
            buf.extend_from_slice(&(b.len() as u64).to_le_bytes());
            buf.extend_from_slice(b.as_slice());
        }
        Value::Datetime(dt) => {
            write_tag(buf, TypeTag::Datetime);
            buf.extend_from_slice(&dt.timestamp_millis().to_le_bytes());
        }
        Value::Array(items) => {
            write_tag(buf, TypeTag::Array);
            buf.extend_from_slice(&(items.len() as u64).to_le_bytes());
            for item in items {
                write_value(buf, item);
            }
        }
        // Entries are emitted in container iteration order; round-trip is
        // value-preserving but not byte-identical across insertion orders.
        Value::Map(entries) => {
            write_tag(buf, TypeTag::Map);
            buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
            for (key, val) in entries {
                write_value(buf, key);
                write_value(buf, val);
            }
        }
    }
}

fn write_tag(buf: &mut Vec<u8>, tag: TypeTag) {
    buf.extend_from_slice(&(tag as u32).to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    #[test]
    fn test_nil_is_tag_only() {
        assert_eq!(encode_value(&Value::Nil), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_boolean_payload() {
        assert_eq!(encode_value(&Value::Boolean(true)), vec![1, 0, 0, 0, 1]);
        assert_eq!(encode_value(&Value::Boolean(false)), vec![1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_integer_little_endian() {
        let bytes = encode_value(&Value::Integer(0x0102_0304));
        assert_eq!(bytes[0..4], [2, 0, 0, 0]);
        assert_eq!(bytes[4..12], [0x04, 0x03, 0x02, 0x01, 0, 0, 0, 0]);
    }

    #[test]
    fn test_string_length_prefix() {
        let bytes = encode_value(&Value::from("hi"));
        assert_eq!(bytes[0..4], [4, 0, 0, 0]);
        assert_eq!(bytes[4..8], [2, 0, 0, 0]);
        assert_eq!(&bytes[8..], b"hi");
    }

    #[test]
    fn test_datetime_payload_is_millis_le() {
        // One second past the epoch: 1000 ms = 0x03E8.
        let dt = Utc.timestamp_millis_opt(1000).unwrap();
        let bytes = encode_value(&Value::Datetime(dt));
        assert_eq!(bytes[0..4], [6, 0, 0, 0]);
        assert_eq!(bytes[4..12], [0xE8, 0x03, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encoded_size_matches_output() {
        let values = [
            Value::Nil,
            Value::Boolean(true),
            Value::Integer(-5),
            Value::Float(3.5),
            Value::from("hello"),
            Value::Blob(crate::value::Blob::from_bytes(vec![1, 2, 3])),
            Value::Array(vec![Value::Integer(1), Value::Nil]),
            Value::Map(vec![(Value::from("k"), Value::Integer(9))]),
        ];
        for value in values {
            assert_eq!(encode_value(&value).len(), encoded_size(&value));
        }
    }
}
