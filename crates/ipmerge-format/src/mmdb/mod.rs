//! MMDB file layout
//!
//! ```text
//! [search tree][16 zero bytes][data section]["\xAB\xCD\xEFMaxMind.com"][metadata map]
//! ```

pub mod metadata;
pub mod types;

pub use metadata::Metadata;
pub use types::{
    find_metadata_start, record_size_from_bits, METADATA_MARKER, METADATA_SEARCH_WINDOW,
};
