//! Error types for the ipmerge library
//!
//! Component crates report their own error enums; this crate folds them into
//! one [`Error`] with a variant per failure kind.

use ipmerge_format::FormatError;
use ipmerge_ip_trie::IpTreeError;
use thiserror::Error;

/// Main error type for ipmerge operations
#[derive(Error, Debug)]
pub enum Error {
    /// Unparseable network, or a network outside the database's address space
    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    /// The input file is not a well-formed MMDB database
    #[error("corrupt database: {0}")]
    CorruptDatabase(String),

    /// A merge strategy met a value of the wrong type
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// A value or the finished tree does not fit the data or record format
    #[error("record too large: {0}")]
    RecordTooLarge(String),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The file uses a binary format major version other than 2
    #[error("unsupported binary format version {major}.{minor}")]
    UnsupportedFormatVersion {
        /// Major version found in the file
        major: u16,
        /// Minor version found in the file
        minor: u16,
    },
}

/// Result type alias for ipmerge operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<IpTreeError> for Error {
    fn from(err: IpTreeError) -> Self {
        match err {
            IpTreeError::InvalidNetwork(msg) => Error::InvalidNetwork(msg),
            IpTreeError::TypeMismatch(msg) => Error::TypeMismatch(msg),
            IpTreeError::RecordTooLarge(msg) => Error::RecordTooLarge(msg),
            IpTreeError::Corrupt(msg) => Error::CorruptDatabase(msg),
        }
    }
}

impl From<FormatError> for Error {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::CorruptDatabase(msg) => Error::CorruptDatabase(msg),
            FormatError::UnsupportedFormatVersion { major, minor } => {
                Error::UnsupportedFormatVersion { major, minor }
            }
            FormatError::RecordTooLarge(msg) => Error::RecordTooLarge(msg),
            FormatError::Io { kind, message } => Error::Io(std::io::Error::new(kind, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_errors_keep_their_kind() {
        let err: Error = IpTreeError::TypeMismatch("map vs string".into()).into();
        assert!(matches!(err, Error::TypeMismatch(_)));

        let err: Error = FormatError::UnsupportedFormatVersion { major: 3, minor: 1 }.into();
        assert_eq!(err.to_string(), "unsupported binary format version 3.1");

        let err: Error = FormatError::Io {
            kind: std::io::ErrorKind::PermissionDenied,
            message: "read-only file system".into(),
        }
        .into();
        assert!(matches!(&err, Error::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied));
        assert!(err.to_string().contains("read-only file system"));
    }
}
