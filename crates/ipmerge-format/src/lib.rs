//! MaxMind DB file format for ipmerge tries
//!
//! [`write_database`] serializes an [`IpTrie`](ipmerge_ip_trie::IpTrie) into
//! the MMDB binary format; [`read_database`] and [`read_database_file`] load
//! one back, rejecting anything structurally unsound with
//! [`FormatError::CorruptDatabase`].
//!
//! ```
//! use ipmerge_data_format::Value;
//! use ipmerge_format::{read_database, write_database, WriteOptions};
//! use ipmerge_ip_trie::{merge::Replace, IpTrie, IpVersion, Network};
//!
//! let mut trie = IpTrie::new(IpVersion::V4);
//! let net: Network = "192.0.2.0/24".parse().unwrap();
//! trie.insert(&net, &Replace(Value::from("doc"))).unwrap();
//!
//! let mut bytes = Vec::new();
//! write_database(&trie, &WriteOptions::default(), &mut bytes).unwrap();
//!
//! let loaded = read_database(&bytes).unwrap();
//! let hit = loaded.trie.lookup("192.0.2.7".parse().unwrap()).unwrap();
//! assert_eq!(**hit.value, Value::from("doc"));
//! ```

#![warn(missing_docs)]

mod error;
pub mod mmdb;
mod reader;
mod writer;

pub use error::FormatError;
pub use mmdb::Metadata;
pub use reader::{read_database, read_database_file, LoadedDatabase};
pub use writer::{write_database, WriteOptions};
