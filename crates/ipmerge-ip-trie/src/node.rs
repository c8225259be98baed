use ipmerge_data_format::Value;
use std::sync::Arc;

/// Index of a node in the trie arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Arena slot of this node
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Node id for an arena slot
    #[inline]
    pub fn from_index(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "arena index must fit in 32 bits");
        NodeId(index as u32)
    }
}

/// A trie node.
///
/// `Internal` children follow the next address bit (0 = left, 1 = right).
/// `Alias` does not own its target; it tells lookups to continue in the
/// target's subtree without consuming a bit.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// No data for this region
    Empty,
    /// Every address in this region maps to the value
    Leaf(Arc<Value>),
    /// Region split on the next address bit
    Internal {
        /// Child for bit 0
        left: NodeId,
        /// Child for bit 1
        right: NodeId,
    },
    /// Read-side equivalence to another subtree
    Alias(NodeId),
}

impl Node {
    /// Value of a leaf, `None` for any other node
    #[inline]
    pub fn value(&self) -> Option<&Arc<Value>> {
        match self {
            Node::Leaf(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn is_region(&self) -> bool {
        matches!(self, Node::Empty | Node::Leaf(_))
    }

    /// Two region nodes describing the same data
    pub(crate) fn same_region(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Empty, Node::Empty) => true,
            (Node::Leaf(a), Node::Leaf(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_region() {
        let a = Arc::new(Value::from("x"));
        let b = Arc::new(Value::from("x"));
        assert!(Node::Leaf(a.clone()).same_region(&Node::Leaf(b)));
        assert!(Node::Leaf(a.clone()).same_region(&Node::Leaf(a.clone())));
        assert!(Node::Empty.same_region(&Node::Empty));
        assert!(!Node::Empty.same_region(&Node::Leaf(a)));
        let alias = Node::Alias(NodeId(1));
        assert!(!alias.same_region(&alias));
    }
}
