//! Error types for data section encoding and decoding

use std::fmt;

/// Errors raised while encoding or decoding data section values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    /// Offset or length runs past the end of the buffer
    InvalidOffset(String),
    /// Unknown or misplaced type in a control byte
    InvalidType(String),
    /// String payload is not valid UTF-8
    InvalidUtf8(String),
    /// Nesting or pointer chain too deep
    DepthExceeded(String),
    /// Value cannot be expressed in the data format (size field overflow)
    TooLarge(String),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::InvalidOffset(msg) => write!(f, "Invalid offset: {}", msg),
            DataError::InvalidType(msg) => write!(f, "Invalid type: {}", msg),
            DataError::InvalidUtf8(msg) => write!(f, "Invalid UTF-8: {}", msg),
            DataError::DepthExceeded(msg) => write!(f, "Depth exceeded: {}", msg),
            DataError::TooLarge(msg) => write!(f, "Value too large: {}", msg),
        }
    }
}

impl std::error::Error for DataError {}
