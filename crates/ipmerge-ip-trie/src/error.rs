//! Error types for IP trie operations

use std::fmt;

/// Errors raised by trie construction, insertion and merging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpTreeError {
    /// Unparseable network, or a network outside the trie's address space
    InvalidNetwork(String),
    /// A merge strategy met a value of the wrong type
    TypeMismatch(String),
    /// A value cannot be stored in the configured record/data format
    RecordTooLarge(String),
    /// Node structure handed to the trie is inconsistent
    Corrupt(String),
}

impl fmt::Display for IpTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpTreeError::InvalidNetwork(msg) => write!(f, "Invalid network: {}", msg),
            IpTreeError::TypeMismatch(msg) => write!(f, "Type mismatch: {}", msg),
            IpTreeError::RecordTooLarge(msg) => write!(f, "Record too large: {}", msg),
            IpTreeError::Corrupt(msg) => write!(f, "Corrupt tree: {}", msg),
        }
    }
}

impl std::error::Error for IpTreeError {}

impl From<ipmerge_data_format::DataError> for IpTreeError {
    fn from(err: ipmerge_data_format::DataError) -> Self {
        match err {
            ipmerge_data_format::DataError::TooLarge(_) => {
                IpTreeError::RecordTooLarge(err.to_string())
            }
            other => IpTreeError::TypeMismatch(other.to_string()),
        }
    }
}
