//! Arena-backed binary trie over address bits
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`]; removed
//! nodes go on a free list and are reused. A node is exclusively owned by
//! its parent, except that `Alias` nodes point (without owning) at another
//! subtree. Alias targets are pinned: compaction never frees them.

use crate::network::{bit_at, IpVersion, Network};
use crate::node::{Node, NodeId};
use crate::IpTreeError;
use ipmerge_data_format::Value;
use rustc_hash::FxHashSet;
use std::net::IpAddr;
use std::sync::Arc;

/// Networks that alias the IPv4 subtree (`::/96`) in an IPv6 trie:
/// IPv4-mapped, Teredo and 6to4.
pub const IPV4_ALIAS_NETWORKS: [(u128, usize); 3] = [
    (0xffff << 32, 96),
    (0x2001 << 112, 32),
    (0x2002 << 112, 16),
];

/// Result of a lookup
#[derive(Debug, Clone, PartialEq)]
pub struct TrieMatch<'a> {
    /// Value stored for the address
    pub value: &'a Arc<Value>,
    /// Number of address bits matched, in the queried address's family
    pub prefix_len: u8,
}

/// A binary trie mapping network prefixes to values
#[derive(Debug, Clone)]
pub struct IpTrie {
    pub(crate) nodes: Vec<Node>,
    pub(crate) free: Vec<NodeId>,
    pub(crate) root: NodeId,
    pub(crate) ip_version: IpVersion,
    pub(crate) pinned: FxHashSet<NodeId>,
}

impl IpTrie {
    /// Create an empty trie for `ip_version`
    pub fn new(ip_version: IpVersion) -> Self {
        Self {
            nodes: vec![Node::Empty],
            free: Vec::new(),
            root: NodeId(0),
            ip_version,
            pinned: FxHashSet::default(),
        }
    }

    /// Assemble a trie from pre-built nodes (used when loading a file)
    ///
    /// Every child and alias id must be in range, and alias targets must
    /// not themselves be aliases. Alias targets are pinned.
    pub fn from_nodes(
        ip_version: IpVersion,
        nodes: Vec<Node>,
        root: NodeId,
    ) -> Result<Self, IpTreeError> {
        let in_range = |id: NodeId| id.index() < nodes.len();
        if !in_range(root) {
            return Err(IpTreeError::Corrupt(format!(
                "root {} outside arena of {} nodes",
                root.index(),
                nodes.len()
            )));
        }
        let mut pinned = FxHashSet::default();
        for (index, node) in nodes.iter().enumerate() {
            match node {
                Node::Internal { left, right } => {
                    if !in_range(*left) || !in_range(*right) {
                        return Err(IpTreeError::Corrupt(format!(
                            "node {} has a child outside the arena",
                            index
                        )));
                    }
                }
                Node::Alias(target) => {
                    if !in_range(*target) || matches!(nodes[target.index()], Node::Alias(_)) {
                        return Err(IpTreeError::Corrupt(format!(
                            "node {} aliases an invalid target",
                            index
                        )));
                    }
                    pinned.insert(*target);
                }
                Node::Empty | Node::Leaf(_) => {}
            }
        }
        Ok(Self {
            nodes,
            free: Vec::new(),
            root,
            ip_version,
            pinned,
        })
    }

    /// Address family of this trie
    pub fn ip_version(&self) -> IpVersion {
        self.ip_version
    }

    /// Root node id
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Borrow a node
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Alias every IPv4-equivalent IPv6 network onto `::/96`.
    ///
    /// No-op for IPv4 tries. Data previously stored inside the alias
    /// networks is dropped; the alias view replaces it.
    pub fn enable_ipv4_aliasing(&mut self) {
        if self.ip_version != IpVersion::V6 {
            return;
        }
        let target = self.materialize(0, 96);
        self.pinned.insert(target);
        for (key, depth) in IPV4_ALIAS_NETWORKS {
            let id = self.materialize(key, depth);
            if id != target {
                self.release_subtree(id);
                self.nodes[id.index()] = Node::Alias(target);
            }
        }
        log::debug!("IPv4 aliasing enabled, target node {}", target.index());
    }

    /// Ensure a node exists exactly at (`key`, `depth`) and return it,
    /// splitting regions on the way. Aliases met on the way are replaced.
    fn materialize(&mut self, key: u128, depth: usize) -> NodeId {
        let mut node = self.root;
        for d in 0..depth {
            let current = self.nodes[node.index()].clone();
            let (left, right) = match current {
                Node::Internal { left, right } => (left, right),
                region => {
                    let region = match region {
                        Node::Alias(_) => Node::Empty,
                        other => other,
                    };
                    let left = self.alloc(region.clone());
                    let right = self.alloc(region);
                    self.nodes[node.index()] = Node::Internal { left, right };
                    (left, right)
                }
            };
            node = if bit_at(key, d) { right } else { left };
        }
        node
    }

    /// Look up the value for `addr`
    ///
    /// IPv4 addresses in an IPv6 trie are looked up under `::/96`; IPv6
    /// addresses in an IPv4 trie only resolve when IPv4-mapped.
    pub fn lookup(&self, addr: IpAddr) -> Option<TrieMatch<'_>> {
        let (key, family_offset) = match (self.ip_version, addr) {
            (IpVersion::V4, IpAddr::V4(v4)) => ((u32::from(v4) as u128) << 96, 0),
            (IpVersion::V4, IpAddr::V6(v6)) => {
                let v4 = v6.to_ipv4_mapped()?;
                ((u32::from(v4) as u128) << 96, 0)
            }
            (IpVersion::V6, IpAddr::V4(v4)) => (u32::from(v4) as u128, 96),
            (IpVersion::V6, IpAddr::V6(v6)) => (u128::from(v6), 0),
        };
        let max_depth = self.ip_version.bit_count();

        let mut node = self.root;
        let mut depth: usize = 0;
        let mut alias_hops = 0;
        loop {
            match self.node(node) {
                Node::Empty => return None,
                Node::Leaf(value) => {
                    return Some(TrieMatch {
                        value,
                        prefix_len: depth.saturating_sub(family_offset) as u8,
                    })
                }
                Node::Alias(target) => {
                    alias_hops += 1;
                    if alias_hops > 1 {
                        return None;
                    }
                    node = *target;
                }
                Node::Internal { left, right } => {
                    if depth >= max_depth {
                        return None;
                    }
                    alias_hops = 0;
                    node = if bit_at(key, depth) { *right } else { *left };
                    depth += 1;
                }
            }
        }
    }

    /// Iterate over every stored network in address order
    ///
    /// Alias nodes are skipped, so each region is reported once, under its
    /// canonical address.
    pub fn networks(&self) -> Networks<'_> {
        Networks {
            trie: self,
            stack: vec![(self.root, 0, 0)],
        }
    }

    /// Number of reachable internal nodes (aliases not followed)
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            if let Node::Internal { left, right } = self.node(id) {
                count += 1;
                stack.push(*left);
                stack.push(*right);
            }
        }
        count
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.index()] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId::from_index(self.nodes.len() - 1)
            }
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.nodes[id.index()] = Node::Empty;
        self.free.push(id);
    }

    /// Free every descendant of `id` (not `id` itself), skipping pinned nodes
    fn release_subtree(&mut self, id: NodeId) {
        if let Node::Internal { left, right } = self.nodes[id.index()].clone() {
            for child in [left, right] {
                self.release_subtree(child);
                if !self.pinned.contains(&child) {
                    self.free_node(child);
                }
            }
        }
    }

    /// Collapse `id` into a region if both children describe the same data.
    ///
    /// Returns true if the node was collapsed.
    pub(crate) fn try_collapse(&mut self, id: NodeId) -> bool {
        let (left, right) = match &self.nodes[id.index()] {
            Node::Internal { left, right } => (*left, *right),
            _ => return false,
        };
        if self.pinned.contains(&left) || self.pinned.contains(&right) {
            return false;
        }
        let (l, r) = (self.node(left), self.node(right));
        if !l.is_region() || !l.same_region(r) {
            return false;
        }
        let merged = l.clone();
        self.nodes[id.index()] = merged;
        self.free_node(left);
        self.free_node(right);
        true
    }

    /// Post-order compaction of the subtree at `id`
    pub(crate) fn compact_subtree(&mut self, id: NodeId) {
        if let Node::Internal { left, right } = self.nodes[id.index()] {
            self.compact_subtree(left);
            self.compact_subtree(right);
            self.try_collapse(id);
        }
    }
}

/// Iterator over `(Network, value)` pairs of a trie
#[derive(Debug)]
pub struct Networks<'a> {
    trie: &'a IpTrie,
    stack: Vec<(NodeId, u128, usize)>,
}

impl<'a> Iterator for Networks<'a> {
    type Item = (Network, &'a Arc<Value>);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, key, depth)) = self.stack.pop() {
            match self.trie.node(id) {
                Node::Leaf(value) => {
                    let network = Network::from_tree_position(self.trie.ip_version, key, depth);
                    return Some((network, value));
                }
                Node::Internal { left, right } => {
                    self.stack
                        .push((*right, key | (1u128 << (127 - depth)), depth + 1));
                    self.stack.push((*left, key, depth + 1));
                }
                Node::Empty | Node::Alias(_) => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(s: &str) -> Node {
        Node::Leaf(Arc::new(Value::from(s)))
    }

    #[test]
    fn test_empty_trie_lookup() {
        let trie = IpTrie::new(IpVersion::V6);
        assert!(trie.lookup("1.2.3.4".parse().unwrap()).is_none());
        assert_eq!(trie.node_count(), 0);
        assert_eq!(trie.networks().count(), 0);
    }

    #[test]
    fn test_from_nodes_rejects_bad_child() {
        let nodes = vec![Node::Internal {
            left: NodeId(1),
            right: NodeId(5),
        }];
        assert!(IpTrie::from_nodes(IpVersion::V4, nodes, NodeId(0)).is_err());
    }

    #[test]
    fn test_from_nodes_lookup() {
        // 0.0.0.0/1 -> "low", 128.0.0.0/1 -> "high"
        let nodes = vec![
            Node::Internal {
                left: NodeId(1),
                right: NodeId(2),
            },
            leaf("low"),
            leaf("high"),
        ];
        let trie = IpTrie::from_nodes(IpVersion::V4, nodes, NodeId(0)).unwrap();
        let hit = trie.lookup("200.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(**hit.value, Value::from("high"));
        assert_eq!(hit.prefix_len, 1);
        let hit = trie.lookup("::ffff:10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(**hit.value, Value::from("low"));
        assert!(trie.lookup("2001:db8::1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_aliasing_shares_ipv4_subtree() {
        let mut trie = IpTrie::new(IpVersion::V6);
        trie.enable_ipv4_aliasing();
        let target = trie.materialize(0, 96);
        trie.nodes[target.index()] = leaf("v4");

        let hit = trie.lookup("::ffff:1.2.3.4".parse().unwrap()).unwrap();
        assert_eq!(**hit.value, Value::from("v4"));
        assert_eq!(hit.prefix_len, 96);
        let hit = trie.lookup("2002:0102:0304::1".parse().unwrap()).unwrap();
        assert_eq!(**hit.value, Value::from("v4"));
        let hit = trie.lookup("1.2.3.4".parse().unwrap()).unwrap();
        assert_eq!(hit.prefix_len, 0);
        assert!(trie.lookup("2003::1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_networks_skip_aliases() {
        let mut trie = IpTrie::new(IpVersion::V6);
        trie.enable_ipv4_aliasing();
        let target = trie.materialize(0, 96);
        trie.nodes[target.index()] = leaf("v4");
        let nets: Vec<String> = trie.networks().map(|(n, _)| n.to_string()).collect();
        assert_eq!(nets, vec!["0.0.0.0/0"]);
    }

    #[test]
    fn test_collapse_equal_leaves() {
        let nodes = vec![
            Node::Internal {
                left: NodeId(1),
                right: NodeId(2),
            },
            leaf("same"),
            leaf("same"),
        ];
        let mut trie = IpTrie::from_nodes(IpVersion::V4, nodes, NodeId(0)).unwrap();
        trie.compact_subtree(trie.root());
        assert_eq!(trie.node_count(), 0);
        assert_eq!(trie.free.len(), 2);
        let hit = trie.lookup("8.8.8.8".parse().unwrap()).unwrap();
        assert_eq!(hit.prefix_len, 0);
    }
}
