//! ipmerge - build and enrich MaxMind DB files
//!
//! ipmerge keeps a whole MMDB database in memory as a binary trie over
//! address bits, lets you insert networks with merge-on-insert semantics,
//! and writes the result back out in the standard MMDB binary format.
//!
//! # Quick Start
//!
//! ```no_run
//! use ipmerge::{merge::TopLevelMerge, Database, Options, Value};
//!
//! let mut db = Database::open("GeoLite2-Country.mmdb", Options::default())?;
//!
//! // Add department data without losing the country data already there
//! db.insert_with(
//!     "56.0.0.0/16",
//!     &TopLevelMerge::new(Value::map([
//!         ("AcmeCorp.DeptName", Value::from("SRE")),
//!         ("AcmeCorp.Environments", Value::slice(["development", "staging", "production"])),
//!     ])),
//! )?;
//!
//! db.write_file("GeoLite2-Country-with-Department-Data.mmdb")?;
//! # Ok::<(), ipmerge::Error>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  ipmerge          Database, Options, Error   │
//! ├──────────────────────────────────────────────┤
//! │  ipmerge-format   MMDB reader and writer     │
//! ├──────────────────────────────────────────────┤
//! │  ipmerge-ip-trie  trie, insert, mergers      │
//! ├──────────────────────────────────────────────┤
//! │  ipmerge-data-format  values, data section   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Merging
//!
//! Every insert goes through a [`Merger`]. It is called once for each
//! distinct region the new network covers, with that region's current
//! value, so a short prefix inserted over finer-grained data merges into
//! each piece separately. Built-in strategies live in [`merge`]; any
//! closure `Fn(Option<&Value>) -> Result<MergeOutcome, _>` works too.
//!
//! # IPv4 in IPv6 databases
//!
//! IPv6 databases store IPv4 data under `::/96`. Unless disabled with
//! [`Options::disable_ipv4_aliasing`], the IPv4-mapped (`::ffff:0:0/96`),
//! Teredo (`2001::/32`) and 6to4 (`2002::/16`) networks are aliases of that
//! subtree and resolve to the same data.

#![warn(missing_docs)]

mod database;
mod error;
mod options;

pub use database::{Database, LookupResult};
pub use error::{Error, Result};
pub use options::Options;

pub use ipmerge_data_format::Value;
pub use ipmerge_format::Metadata;
pub use ipmerge_ip_trie::merge;
pub use ipmerge_ip_trie::{
    IntoNetwork, IpTreeError, IpVersion, MergeOutcome, MergeStrategy, Merger, MismatchPolicy,
    Network, RecordSize,
};
