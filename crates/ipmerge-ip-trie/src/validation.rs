//! Search tree validation for untrusted binary data
//!
//! Walks an on-disk search tree from the root and checks that every record
//! is a node index, the empty marker, or a pointer into the data section;
//! that no path revisits one of its own ancestors; and that every node is
//! reachable.

use crate::network::IpVersion;
use crate::record::RecordSize;
use rustc_hash::FxHashSet;

/// Size of the zero separator between search tree and data section
pub const DATA_SECTION_SEPARATOR_SIZE: u32 = 16;

/// Validation result for a search tree
#[derive(Debug, Clone)]
pub struct IpTreeValidationResult {
    /// Problems that make the tree unusable
    pub errors: Vec<String>,
    /// Statistics gathered during validation
    pub stats: IpTreeStats,
}

/// Statistics gathered during search tree validation
#[derive(Debug, Clone, Default)]
pub struct IpTreeStats {
    /// Number of nodes declared by the metadata
    pub node_count: u32,
    /// Distinct nodes reached from the root
    pub nodes_visited: u32,
    /// Nodes that exist but are unreachable from the root
    pub orphaned_count: u32,
    /// Nodes reached through more than one parent record
    pub shared_nodes: u32,
    /// Whether a path revisited one of its ancestors
    pub cycle_detected: bool,
    /// Records that point nowhere valid
    pub invalid_pointers: u32,
}

impl IpTreeValidationResult {
    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a search tree
///
/// `tree` must hold at least `node_count` nodes of `record_size`.
/// `data_len` is the length of the data section following the separator.
pub fn validate_ip_tree(
    tree: &[u8],
    node_count: u32,
    record_size: RecordSize,
    ip_version: IpVersion,
    data_len: usize,
) -> IpTreeValidationResult {
    let mut walker = TreeWalker {
        tree,
        node_count,
        record_size,
        max_depth: ip_version.bit_count(),
        data_len,
        path: FxHashSet::default(),
        visited: FxHashSet::default(),
        stats: IpTreeStats {
            node_count,
            ..Default::default()
        },
    };
    let mut errors = Vec::new();

    let needed = node_count as usize * record_size.node_bytes();
    if tree.len() < needed {
        errors.push(format!(
            "search tree needs {} bytes for {} nodes, found {}",
            needed,
            node_count,
            tree.len()
        ));
    } else if node_count > 0 {
        walker.visit(0, 0);
        walker.stats.nodes_visited = walker.visited.len() as u32;
        walker.stats.orphaned_count = node_count.saturating_sub(walker.stats.nodes_visited);
        if walker.stats.orphaned_count > 0 {
            errors.push(format!(
                "{} nodes are unreachable from the root",
                walker.stats.orphaned_count
            ));
        }
    }

    if walker.stats.cycle_detected {
        errors.push("search tree contains a cycle".to_string());
    }
    if walker.stats.invalid_pointers > 0 {
        errors.push(format!(
            "{} invalid records in search tree",
            walker.stats.invalid_pointers
        ));
    }

    IpTreeValidationResult {
        errors,
        stats: walker.stats,
    }
}

struct TreeWalker<'a> {
    tree: &'a [u8],
    node_count: u32,
    record_size: RecordSize,
    max_depth: usize,
    data_len: usize,
    path: FxHashSet<u32>,
    visited: FxHashSet<u32>,
    stats: IpTreeStats,
}

impl TreeWalker<'_> {
    fn visit(&mut self, index: u32, depth: usize) {
        if self.path.contains(&index) {
            self.stats.cycle_detected = true;
            return;
        }
        if !self.visited.insert(index) {
            // Shared subtree (IPv4 aliasing), already checked
            self.stats.shared_nodes += 1;
            return;
        }

        let (left, right) = match self.record_size.read_node(self.tree, index) {
            Some(records) => records,
            None => {
                self.stats.invalid_pointers += 1;
                return;
            }
        };

        self.path.insert(index);
        for record in [left, right] {
            self.check_record(record, depth);
        }
        self.path.remove(&index);
    }

    fn check_record(&mut self, record: u32, depth: usize) {
        if record < self.node_count {
            if depth + 1 >= self.max_depth {
                self.stats.invalid_pointers += 1;
            } else {
                self.visit(record, depth + 1);
            }
        } else if record > self.node_count {
            let offset = record as u64 - self.node_count as u64;
            if offset < DATA_SECTION_SEPARATOR_SIZE as u64
                || offset - DATA_SECTION_SEPARATOR_SIZE as u64 >= self.data_len as u64
            {
                self.stats.invalid_pointers += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_of(nodes: &[(u32, u32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        for &(l, r) in nodes {
            RecordSize::Bits24.write_node(&mut buf, l, r);
        }
        buf
    }

    #[test]
    fn test_validate_empty_tree() {
        let result = validate_ip_tree(&[], 0, RecordSize::Bits24, IpVersion::V4, 0);
        assert!(result.is_valid());
        assert_eq!(result.stats.node_count, 0);
    }

    #[test]
    fn test_validate_simple_tree() {
        // node 0 -> (node 1, data 0); node 1 -> (empty, empty)
        let tree = tree_of(&[(1, 2 + 16), (2, 2)]);
        let result = validate_ip_tree(&tree, 2, RecordSize::Bits24, IpVersion::V4, 4);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.stats.nodes_visited, 2);
    }

    #[test]
    fn test_validate_cycle() {
        let tree = tree_of(&[(1, 2), (0, 2)]);
        let result = validate_ip_tree(&tree, 2, RecordSize::Bits24, IpVersion::V4, 0);
        assert!(!result.is_valid());
        assert!(result.stats.cycle_detected);
    }

    #[test]
    fn test_validate_shared_node_is_not_a_cycle() {
        let tree = tree_of(&[(1, 1), (2, 2)]);
        let result = validate_ip_tree(&tree, 2, RecordSize::Bits24, IpVersion::V4, 0);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.stats.shared_nodes, 1);
    }

    #[test]
    fn test_validate_orphan() {
        let tree = tree_of(&[(2, 2), (2, 2)]);
        let result = validate_ip_tree(&tree, 2, RecordSize::Bits24, IpVersion::V4, 0);
        assert!(!result.is_valid());
        assert_eq!(result.stats.orphaned_count, 1);
    }

    #[test]
    fn test_validate_data_pointer_bounds() {
        // record 1 + 5 points into the separator
        let tree = tree_of(&[(1 + 5, 1)]);
        let result = validate_ip_tree(&tree, 1, RecordSize::Bits24, IpVersion::V4, 10);
        assert_eq!(result.stats.invalid_pointers, 1);

        let tree = tree_of(&[(1 + 16 + 10, 1)]);
        let result = validate_ip_tree(&tree, 1, RecordSize::Bits24, IpVersion::V4, 10);
        assert!(!result.is_valid());
    }

    #[test]
    fn test_validate_truncated_tree() {
        let tree = tree_of(&[(1, 1)]);
        let result = validate_ip_tree(&tree, 2, RecordSize::Bits24, IpVersion::V4, 0);
        assert!(!result.is_valid());
    }
}
