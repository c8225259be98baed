//! The value model stored behind every network in a database
//!
//! [`Value`] mirrors the MaxMind DB data types one to one. Maps are
//! `BTreeMap`s so that key order, and therefore the encoded bytes, are
//! deterministic.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Type identifiers used in control bytes
pub mod type_id {
    /// Extended type marker (real type in the following byte)
    pub const EXTENDED: u8 = 0;
    /// Pointer into the data section
    pub const POINTER: u8 = 1;
    /// UTF-8 string
    pub const STRING: u8 = 2;
    /// IEEE-754 double
    pub const DOUBLE: u8 = 3;
    /// Raw bytes
    pub const BYTES: u8 = 4;
    /// Unsigned 16-bit integer
    pub const UINT16: u8 = 5;
    /// Unsigned 32-bit integer
    pub const UINT32: u8 = 6;
    /// String-keyed map
    pub const MAP: u8 = 7;
    /// Signed 32-bit integer
    pub const INT32: u8 = 8;
    /// Unsigned 64-bit integer
    pub const UINT64: u8 = 9;
    /// Unsigned 128-bit integer
    pub const UINT128: u8 = 10;
    /// Ordered sequence
    pub const ARRAY: u8 = 11;
    /// Data cache container (never written, rejected on read)
    pub const CONTAINER: u8 = 12;
    /// End marker (never written, rejected on read)
    pub const END_MARKER: u8 = 13;
    /// Boolean
    pub const BOOL: u8 = 14;
    /// IEEE-754 single
    pub const FLOAT: u8 = 15;
}

/// A typed value attached to a network
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Back-reference to a value at this data section offset.
    ///
    /// Only produced by [`DataDecoder::decode_raw`](crate::DataDecoder::decode_raw).
    Pointer(u32),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer, encoded big-endian
    Uint128(u128),
    /// Signed 32-bit integer
    Int32(i32),
    /// Single precision float
    Float32(f32),
    /// Double precision float
    Float64(f64),
    /// Boolean
    Bool(bool),
    /// Ordered sequence of values
    Slice(Vec<Value>),
    /// Map from string key to value, iterated in key order
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Type identifier written in the control byte for this value
    pub fn type_id(&self) -> u8 {
        match self {
            Value::Pointer(_) => type_id::POINTER,
            Value::String(_) => type_id::STRING,
            Value::Float64(_) => type_id::DOUBLE,
            Value::Bytes(_) => type_id::BYTES,
            Value::Uint16(_) => type_id::UINT16,
            Value::Uint32(_) => type_id::UINT32,
            Value::Map(_) => type_id::MAP,
            Value::Int32(_) => type_id::INT32,
            Value::Uint64(_) => type_id::UINT64,
            Value::Uint128(_) => type_id::UINT128,
            Value::Slice(_) => type_id::ARRAY,
            Value::Bool(_) => type_id::BOOL,
            Value::Float32(_) => type_id::FLOAT,
        }
    }

    /// Human-readable type name, used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Pointer(_) => "pointer",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Uint16(_) => "uint16",
            Value::Uint32(_) => "uint32",
            Value::Uint64(_) => "uint64",
            Value::Uint128(_) => "uint128",
            Value::Int32(_) => "int32",
            Value::Float32(_) => "float",
            Value::Float64(_) => "double",
            Value::Bool(_) => "boolean",
            Value::Slice(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Build a map from key/value pairs
    pub fn map<K, V, I>(entries: I) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a slice from values
    pub fn slice<V, I>(items: I) -> Value
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Value::Slice(items.into_iter().map(Into::into).collect())
    }

    /// Borrow the entries if this is a map
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow the string if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any unsigned integer that fits in a `u64`
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Uint16(v) => Some(v as u64),
            Value::Uint32(v) => Some(v as u64),
            Value::Uint64(v) => Some(v),
            Value::Uint128(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Look up a key if this is a map
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Returns true if this is a map
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Uint16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint64(v)
    }
}

impl From<u128> for Value {
    fn from(v: u128) -> Self {
        Value::Uint128(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Slice(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Pointer(p) => serializer.serialize_u32(*p),
            Value::String(s) => serializer.serialize_str(s),
            Value::Bytes(b) => {
                let mut seq = serializer.serialize_seq(Some(b.len()))?;
                for byte in b {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
            Value::Uint16(v) => serializer.serialize_u16(*v),
            Value::Uint32(v) => serializer.serialize_u32(*v),
            Value::Uint64(v) => serializer.serialize_u64(*v),
            // JSON numbers cannot carry 128 bits
            Value::Uint128(v) => serializer.serialize_str(&v.to_string()),
            Value::Int32(v) => serializer.serialize_i32(*v),
            Value::Float32(v) => serializer.serialize_f32(*v),
            Value::Float64(v) => serializer.serialize_f64(*v),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Slice(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}
