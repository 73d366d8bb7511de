//! Native decoder.

use crate::codec::{CodecError, TypeTag};
use crate::value::{Blob, Value};
use chrono::{TimeZone, Utc};

/// Decodes a complete value from the native format.
///
/// The entire input must be consumed; trailing bytes are an error.
pub fn decode_value(input: &[u8]) -> Result<Value, CodecError> {
    let mut reader = Reader::new(input);
    let value = reader.read_value()?;
    if reader.remaining() != 0 {
        return Err(CodecError::TrailingBytes(reader.remaining()));
    }
    Ok(value)
}

struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.input.len() - self.pos
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < count {
            return Err(CodecError::UnexpectedEnd {
                needed: count - self.remaining(),
            });
        }
        let slice = &self.input[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(u32::from_le_bytes(bytes))
    }

    fn read_u64(&mut self) -> Result<u64, CodecError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    fn read_i64(&mut self) -> Result<i64, CodecError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(i64::from_le_bytes(bytes))
    }

    fn read_count(&mut self) -> Result<usize, CodecError> {
        let raw = self.read_u64()?;
        usize::try_from(raw).map_err(|_| CodecError::LengthOverflow(raw))
    }

    fn read_value(&mut self) -> Result<Value, CodecError> {
        let raw_tag = self.read_u32()?;
        let tag = TypeTag::from_u32(raw_tag).ok_or(CodecError::UnknownTag(raw_tag))?;
        match tag {
            TypeTag::Nil => Ok(Value::Nil),
            TypeTag::Boolean => match self.read_u8()? {
                0 => Ok(Value::Boolean(false)),
                1 => Ok(Value::Boolean(true)),
                other => Err(CodecError::InvalidBoolean(other)),
            },
            TypeTag::Integer => Ok(Value::Integer(self.read_i64()?)),
            TypeTag::Float => {
                let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
                Ok(Value::Float(f64::from_le_bytes(bytes)))
            }
            TypeTag::String => {
                let len = self.read_u32()? as usize;
                let bytes = self.take(len)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::String(text.to_string()))
            }
            TypeTag::Blob => {
                let len = self.read_count()?;
                Ok(Value::Blob(Blob::from_bytes(self.take(len)?.to_vec())))
            }
            TypeTag::Datetime => {
                let millis = self.read_i64()?;
                Utc.timestamp_millis_opt(millis)
                    .single()
                    .map(Value::Datetime)
                    .ok_or(CodecError::InvalidDatetime(millis))
            }
            TypeTag::Array => {
                let count = self.read_count()?;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(self.read_value()?);
                }
                Ok(Value::Array(items))
            }
            TypeTag::Map => {
                let count = self.read_count()?;
                let mut entries = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let key = self.read_value()?;
                    let val = self.read_value()?;
                    entries.push((key, val));
                }
                Ok(Value::Map(entries))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_value;
    use chrono::Utc;

    fn round_trip(value: Value) {
        let decoded = decode_value(&encode_value(&value)).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_round_trip_scalars() {
        round_trip(Value::Nil);
        round_trip(Value::Boolean(true));
        round_trip(Value::Integer(i64::MIN));
        round_trip(Value::Integer(i64::MAX));
        round_trip(Value::Float(-0.25));
        round_trip(Value::from("snow ❄"));
    }

    #[test]
    fn test_round_trip_blob_and_datetime() {
        round_trip(Value::Blob(Blob::from_bytes(vec![0u8, 255, 7])));
        round_trip(Value::Datetime(
            Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
        ));
    }

    #[test]
    fn test_round_trip_nested_containers() {
        round_trip(Value::Map(vec![
            (Value::from("a"), Value::Integer(1)),
            (
                Value::from("b"),
                Value::Array(vec![Value::Boolean(true), Value::Nil, Value::Float(3.5)]),
            ),
        ]));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = decode_value(&[99, 0, 0, 0]).unwrap_err();
        assert_eq!(err, CodecError::UnknownTag(99));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut bytes = encode_value(&Value::Integer(7));
        bytes.truncate(8);
        assert!(matches!(
            decode_value(&bytes),
            Err(CodecError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode_value(&Value::Nil);
        bytes.push(0);
        assert_eq!(decode_value(&bytes), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn test_invalid_boolean_rejected() {
        let err = decode_value(&[1, 0, 0, 0, 2]).unwrap_err();
        assert_eq!(err, CodecError::InvalidBoolean(2));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        // String of length 1 with an invalid continuation byte.
        let err = decode_value(&[4, 0, 0, 0, 1, 0, 0, 0, 0xFF]).unwrap_err();
        assert_eq!(err, CodecError::InvalidUtf8);
    }
}
