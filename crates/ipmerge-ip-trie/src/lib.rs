//! Binary IP trie with merge-on-insert
//!
//! [`IpTrie`] maps IP networks to [`Value`](ipmerge_data_format::Value)s.
//! Inserting a network never blindly overwrites: a [`Merger`] decides what
//! each covered region holds afterwards, which makes it possible to enrich
//! an existing database without losing data from overlapping networks.
//!
//! IPv6 tries can alias the IPv4-equivalent IPv6 networks (IPv4-mapped,
//! Teredo, 6to4) onto the IPv4 subtree at `::/96`, so every representation
//! of an IPv4 address resolves to the same data.
//!
//! ```
//! use ipmerge_data_format::Value;
//! use ipmerge_ip_trie::merge::{Replace, TopLevelMerge};
//! use ipmerge_ip_trie::{IpTrie, IpVersion, Network};
//!
//! let mut trie = IpTrie::new(IpVersion::V6);
//! trie.enable_ipv4_aliasing();
//!
//! let net: Network = "10.0.0.0/8".parse().unwrap();
//! trie.insert(&net, &Replace(Value::map([("owner", "infra")]))).unwrap();
//!
//! let net: Network = "10.1.0.0/16".parse().unwrap();
//! trie.insert(&net, &TopLevelMerge::new(Value::map([("team", "sre")]))).unwrap();
//!
//! let hit = trie.lookup("::ffff:10.1.2.3".parse().unwrap()).unwrap();
//! assert_eq!(hit.value.get("owner"), Some(&Value::from("infra")));
//! assert_eq!(hit.value.get("team"), Some(&Value::from("sre")));
//! ```

#![warn(missing_docs)]

mod error;
mod insert;
pub mod merge;
mod network;
mod node;
mod record;
mod trie;
pub mod validation;

pub use error::IpTreeError;
pub use merge::{MergeOutcome, MergeStrategy, Merger, MismatchPolicy};
pub use network::{IntoNetwork, IpVersion, Network};
pub use node::{Node, NodeId};
pub use record::RecordSize;
pub use trie::{IpTrie, Networks, TrieMatch, IPV4_ALIAS_NETWORKS};
pub use validation::{
    validate_ip_tree, IpTreeStats, IpTreeValidationResult, DATA_SECTION_SEPARATOR_SIZE,
};
