//! MaxMind DB data section format
//!
//! Values attached to networks are stored in the data section as a compact,
//! self-describing binary encoding. This crate provides:
//! - [`Value`], the typed value model
//! - [`DataEncoder`], which writes values with deduplication
//! - [`DataDecoder`], which reads them back, resolving pointers
//! - pointer-structure validation for untrusted input
//!
//! ```
//! use ipmerge_data_format::{DataDecoder, DataEncoder, Value};
//!
//! let value = Value::map([("AcmeCorp.DeptName", "SRE")]);
//! let mut encoder = DataEncoder::new();
//! let offset = encoder.encode(&value).unwrap();
//! let bytes = encoder.into_bytes();
//!
//! let decoded = DataDecoder::new(&bytes, 0).decode(offset).unwrap();
//! assert_eq!(decoded, value);
//! ```

#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
pub mod validation;
mod value;

pub use decoder::DataDecoder;
pub use encoder::{check_encodable, encode_canonical, pointer_len, DataEncoder, MAX_SIZE};
pub use error::DataError;
pub use validation::{validate_data_value_pointers, PointerValidationError, MAX_TOTAL_DEPTH};
pub use value::{type_id, Value};
