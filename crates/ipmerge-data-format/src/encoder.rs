//! Data section encoder
//!
//! Every value is written as a control byte (type in the top three bits,
//! size in the low five), optional extended-type and size bytes, then the
//! payload. The encoder deduplicates: a value whose canonical encoding was
//! already written is referenced by offset instead of written again, and
//! nested values inside maps and slices become pointers whenever the pointer
//! is shorter than the inline bytes.

use crate::value::{type_id, Value};
use crate::DataError;
use rustc_hash::FxHashMap;

/// Largest size expressible in a control byte plus three size bytes
pub const MAX_SIZE: usize = 65_821 + 0xFF_FFFF;

/// Shortest canonical encoding worth remembering for pointer reuse.
/// A pointer is never shorter than two bytes.
const MIN_DEDUP_LEN: usize = 3;

/// Incremental data section writer with deduplication
#[derive(Debug, Default)]
pub struct DataEncoder {
    buffer: Vec<u8>,
    /// Canonical (pointer-free) encoding -> offset where it was written
    written: FxHashMap<Vec<u8>, u32>,
}

impl DataEncoder {
    /// Create an empty encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a value and return its offset in the data section.
    ///
    /// If an identical value was encoded before, its offset is returned and
    /// nothing new is written.
    pub fn encode(&mut self, value: &Value) -> Result<u32, DataError> {
        let canonical = encode_canonical(value)?;
        if let Some(&offset) = self.written.get(&canonical) {
            return Ok(offset);
        }
        let offset = self.current_offset()?;
        self.write_deduped(value)?;
        self.written.insert(canonical, offset);
        Ok(offset)
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Finish and return the data section bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    fn current_offset(&self) -> Result<u32, DataError> {
        u32::try_from(self.buffer.len()).map_err(|_| {
            DataError::TooLarge(format!(
                "data section exceeds 4 GiB ({} bytes)",
                self.buffer.len()
            ))
        })
    }

    /// Write a nested value, as a pointer when that is shorter
    fn write_child(&mut self, value: &Value) -> Result<(), DataError> {
        let canonical = encode_canonical(value)?;
        if let Some(&offset) = self.written.get(&canonical) {
            if pointer_len(offset) < canonical.len() {
                write_pointer(&mut self.buffer, offset);
                return Ok(());
            }
        }
        let offset = self.current_offset()?;
        self.write_deduped(value)?;
        if canonical.len() >= MIN_DEDUP_LEN {
            self.written.entry(canonical).or_insert(offset);
        }
        Ok(())
    }

    fn write_deduped(&mut self, value: &Value) -> Result<(), DataError> {
        match value {
            Value::Map(entries) => {
                write_control(&mut self.buffer, type_id::MAP, entries.len())?;
                for (key, child) in entries {
                    self.write_child(&Value::String(key.clone()))?;
                    self.write_child(child)?;
                }
                Ok(())
            }
            Value::Slice(items) => {
                write_control(&mut self.buffer, type_id::ARRAY, items.len())?;
                for child in items {
                    self.write_child(child)?;
                }
                Ok(())
            }
            scalar => write_value(&mut self.buffer, scalar),
        }
    }
}

/// Encode a value without any pointers.
///
/// This is the canonical form used as the deduplication key, and the form
/// metadata is written in.
pub fn encode_canonical(value: &Value) -> Result<Vec<u8>, DataError> {
    let mut buffer = Vec::new();
    write_value(&mut buffer, value)?;
    Ok(buffer)
}

/// Check that a value can be encoded without building the bytes
///
/// Pointers are rejected: they only make sense inside the data section
/// they were decoded from.
pub fn check_encodable(value: &Value) -> Result<(), DataError> {
    let len = match value {
        Value::Pointer(offset) => {
            return Err(DataError::InvalidType(format!(
                "pointer to offset {} cannot be stored as a value",
                offset
            )))
        }
        Value::String(s) => s.len(),
        Value::Bytes(b) => b.len(),
        Value::Slice(items) => {
            for item in items {
                check_encodable(item)?;
            }
            items.len()
        }
        Value::Map(entries) => {
            for (key, item) in entries {
                if key.len() > MAX_SIZE {
                    return Err(too_large("map key", key.len()));
                }
                check_encodable(item)?;
            }
            entries.len()
        }
        _ => 0,
    };
    if len > MAX_SIZE {
        return Err(too_large(value.type_name(), len));
    }
    Ok(())
}

fn too_large(what: &str, len: usize) -> DataError {
    DataError::TooLarge(format!(
        "{} of size {} exceeds maximum {}",
        what, len, MAX_SIZE
    ))
}

fn write_value(buf: &mut Vec<u8>, value: &Value) -> Result<(), DataError> {
    match value {
        Value::Pointer(offset) => {
            write_pointer(buf, *offset);
        }
        Value::String(s) => {
            write_control(buf, type_id::STRING, s.len())?;
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Float64(v) => {
            write_control(buf, type_id::DOUBLE, 8)?;
            buf.extend_from_slice(&v.to_be_bytes());
        }
        Value::Bytes(b) => {
            write_control(buf, type_id::BYTES, b.len())?;
            buf.extend_from_slice(b);
        }
        Value::Uint16(v) => write_uint(buf, type_id::UINT16, &v.to_be_bytes())?,
        Value::Uint32(v) => write_uint(buf, type_id::UINT32, &v.to_be_bytes())?,
        Value::Uint64(v) => write_uint(buf, type_id::UINT64, &v.to_be_bytes())?,
        Value::Uint128(v) => write_uint(buf, type_id::UINT128, &v.to_be_bytes())?,
        Value::Int32(v) => {
            // Negative values keep all four bytes so the sign survives
            write_uint(buf, type_id::INT32, &v.to_be_bytes())?;
        }
        Value::Map(entries) => {
            write_control(buf, type_id::MAP, entries.len())?;
            for (key, child) in entries {
                write_control(buf, type_id::STRING, key.len())?;
                buf.extend_from_slice(key.as_bytes());
                write_value(buf, child)?;
            }
        }
        Value::Slice(items) => {
            write_control(buf, type_id::ARRAY, items.len())?;
            for child in items {
                write_value(buf, child)?;
            }
        }
        Value::Bool(v) => write_control(buf, type_id::BOOL, usize::from(*v))?,
        Value::Float32(v) => {
            write_control(buf, type_id::FLOAT, 4)?;
            buf.extend_from_slice(&v.to_be_bytes());
        }
    }
    Ok(())
}

/// Write an unsigned integer with leading zero bytes stripped
fn write_uint(buf: &mut Vec<u8>, type_id: u8, be_bytes: &[u8]) -> Result<(), DataError> {
    let skip = be_bytes.iter().take_while(|&&b| b == 0).count();
    let payload = &be_bytes[skip..];
    write_control(buf, type_id, payload.len())?;
    buf.extend_from_slice(payload);
    Ok(())
}

/// Write a control byte (and extended type / size bytes)
fn write_control(buf: &mut Vec<u8>, type_id: u8, size: usize) -> Result<(), DataError> {
    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, Vec::new())
    } else if size < 29 + 256 {
        (29, vec![(size - 29) as u8])
    } else if size < 285 + 65_536 {
        let rest = (size - 285) as u16;
        (30, rest.to_be_bytes().to_vec())
    } else if size <= MAX_SIZE {
        let rest = (size - 65_821) as u32;
        (31, rest.to_be_bytes()[1..].to_vec())
    } else {
        return Err(too_large("value", size));
    };

    if type_id <= type_id::MAP {
        buf.push((type_id << 5) | size_bits);
    } else {
        buf.push(size_bits);
        buf.push(type_id - 7);
    }
    buf.extend_from_slice(&extra);
    Ok(())
}

/// Encoded length of a pointer to `offset`
pub fn pointer_len(offset: u32) -> usize {
    match offset {
        0..=2047 => 2,
        2048..=526_335 => 3,
        526_336..=134_744_063 => 4,
        _ => 5,
    }
}

fn write_pointer(buf: &mut Vec<u8>, offset: u32) {
    let ptr = type_id::POINTER << 5;
    match pointer_len(offset) {
        2 => {
            buf.push(ptr | ((offset >> 8) & 0x7) as u8);
            buf.push(offset as u8);
        }
        3 => {
            let v = offset - 2048;
            buf.push(ptr | (1 << 3) | ((v >> 16) & 0x7) as u8);
            buf.extend_from_slice(&(v as u16).to_be_bytes());
        }
        4 => {
            let v = offset - 526_336;
            buf.push(ptr | (2 << 3) | ((v >> 24) & 0x7) as u8);
            buf.extend_from_slice(&v.to_be_bytes()[1..]);
        }
        _ => {
            buf.push(ptr | (3 << 3));
            buf.extend_from_slice(&offset.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_short_string() {
        let bytes = encode_canonical(&Value::from("abc")).unwrap();
        assert_eq!(bytes, vec![0x43, b'a', b'b', b'c']);
    }

    #[test]
    fn test_encode_size_29_and_up() {
        let s = "x".repeat(29);
        let bytes = encode_canonical(&Value::from(s.as_str())).unwrap();
        assert_eq!(&bytes[..2], &[0x5d, 0x00]);

        let s = "x".repeat(300);
        let bytes = encode_canonical(&Value::from(s.as_str())).unwrap();
        assert_eq!(&bytes[..3], &[0x5e, 0x00, 15]);
    }

    #[test]
    fn test_encode_extended_types() {
        assert_eq!(encode_canonical(&Value::Bool(true)).unwrap(), vec![0x01, 0x07]);
        assert_eq!(encode_canonical(&Value::Bool(false)).unwrap(), vec![0x00, 0x07]);
        assert_eq!(
            encode_canonical(&Value::Uint64(1)).unwrap(),
            vec![0x01, 0x02, 0x01]
        );
        assert_eq!(
            encode_canonical(&Value::Int32(-1)).unwrap(),
            vec![0x04, 0x01, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(
            encode_canonical(&Value::Slice(vec![])).unwrap(),
            vec![0x00, 0x04]
        );
    }

    #[test]
    fn test_encode_uint_strips_leading_zeros() {
        assert_eq!(encode_canonical(&Value::Uint32(0)).unwrap(), vec![0xc0]);
        assert_eq!(
            encode_canonical(&Value::Uint32(0x0100)).unwrap(),
            vec![0xc2, 0x01, 0x00]
        );
        assert_eq!(
            encode_canonical(&Value::Uint16(0xffff)).unwrap(),
            vec![0xa2, 0xff, 0xff]
        );
    }

    #[test]
    fn test_pointer_boundaries() {
        let mut buf = Vec::new();
        write_pointer(&mut buf, 2047);
        assert_eq!(buf, vec![0x27, 0xff]);

        buf.clear();
        write_pointer(&mut buf, 2048);
        assert_eq!(buf, vec![0x28, 0x00, 0x00]);

        buf.clear();
        write_pointer(&mut buf, 526_336);
        assert_eq!(buf, vec![0x30, 0x00, 0x00, 0x00]);

        buf.clear();
        write_pointer(&mut buf, 134_744_064);
        assert_eq!(buf.len(), 5);
        assert_eq!(buf[0], 0x38);
    }

    #[test]
    fn test_encode_dedups_identical_values() {
        let mut encoder = DataEncoder::new();
        let value = Value::map([("country", "DE"), ("continent", "EU")]);
        let first = encoder.encode(&value).unwrap();
        let len_after_first = encoder.len();
        let second = encoder.encode(&value.clone()).unwrap();
        assert_eq!(first, second);
        assert_eq!(encoder.len(), len_after_first);
    }

    #[test]
    fn test_nested_values_become_pointers() {
        let mut encoder = DataEncoder::new();
        let shared = Value::slice(["development", "staging", "production"]);
        encoder
            .encode(&Value::map([("env", shared.clone()), ("team", "a".into())]))
            .unwrap();
        let before = encoder.len();
        encoder
            .encode(&Value::map([("env", shared), ("team", "b".into())]))
            .unwrap();
        // map header + pointer to "env" + pointer to the slice + "team" pointer + "b"
        assert!(encoder.len() - before < 12);
    }

    #[test]
    fn test_check_encodable_rejects_oversized() {
        let big = Value::Bytes(vec![0; MAX_SIZE + 1]);
        assert!(matches!(check_encodable(&big), Err(DataError::TooLarge(_))));
        assert!(check_encodable(&Value::from("ok")).is_ok());
    }

    #[test]
    fn test_check_encodable_rejects_nested_pointer() {
        assert!(matches!(
            check_encodable(&Value::Pointer(0)),
            Err(DataError::InvalidType(_))
        ));
        let nested = Value::map([("a", Value::Slice(vec![Value::Pointer(5000)]))]);
        assert!(matches!(
            check_encodable(&nested),
            Err(DataError::InvalidType(_))
        ));
    }
}
