//! Error types for MMDB file operations

use ipmerge_data_format::{DataError, PointerValidationError};
use ipmerge_ip_trie::IpTreeError;
use std::fmt;

/// Errors that can occur while reading or writing an MMDB file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// File structure, tree or data section is invalid
    CorruptDatabase(String),
    /// Binary format major version other than 2
    UnsupportedFormatVersion {
        /// `binary_format_major_version` from the metadata
        major: u16,
        /// `binary_format_minor_version` from the metadata
        minor: u16,
    },
    /// Tree or data section does not fit the record size
    RecordTooLarge(String),
    /// I/O error
    Io {
        /// Kind of the underlying `std::io::Error`
        kind: std::io::ErrorKind,
        /// Description including the path involved
        message: String,
    },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::CorruptDatabase(msg) => write!(f, "Corrupt database: {}", msg),
            FormatError::UnsupportedFormatVersion { major, minor } => {
                write!(f, "Unsupported binary format version {}.{}", major, minor)
            }
            FormatError::RecordTooLarge(msg) => write!(f, "Record too large: {}", msg),
            FormatError::Io { message, .. } => write!(f, "I/O error: {}", message),
        }
    }
}

impl std::error::Error for FormatError {}

impl From<std::io::Error> for FormatError {
    fn from(err: std::io::Error) -> Self {
        FormatError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

// Decoding errors only arise from file contents
impl From<DataError> for FormatError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::TooLarge(msg) => FormatError::RecordTooLarge(msg),
            other => FormatError::CorruptDatabase(other.to_string()),
        }
    }
}

impl From<PointerValidationError> for FormatError {
    fn from(err: PointerValidationError) -> Self {
        FormatError::CorruptDatabase(err.to_string())
    }
}

impl From<IpTreeError> for FormatError {
    fn from(err: IpTreeError) -> Self {
        match err {
            IpTreeError::RecordTooLarge(msg) => FormatError::RecordTooLarge(msg),
            other => FormatError::CorruptDatabase(other.to_string()),
        }
    }
}
