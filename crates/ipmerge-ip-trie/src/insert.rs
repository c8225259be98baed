//! Merge-on-insert
//!
//! An insert runs in two phases. The first walks to the network and calls
//! the merger for every region it covers without touching the trie, so a
//! failing merger leaves the trie exactly as it was. The second applies the
//! collected outcomes and cannot fail.

use crate::merge::{MergeOutcome, Merger};
use crate::network::{bit_at, Network};
use crate::node::{Node, NodeId};
use crate::trie::IpTrie;
use crate::IpTreeError;
use ipmerge_data_format::check_encodable;
use std::sync::Arc;

/// Changes computed by the read-only phase
enum Plan {
    /// The network lies strictly inside the region at `node`, which sits at
    /// `depth`; the region must be split down to the network
    Split {
        node: NodeId,
        depth: usize,
        update: Node,
    },
    /// Regions at or under the network's node, each with its new content
    Regions { top: NodeId, updates: Vec<(NodeId, Node)> },
}

impl IpTrie {
    /// Insert `network`, letting `merger` decide the new value of every
    /// region it covers.
    ///
    /// On error the trie is unchanged.
    pub fn insert(&mut self, network: &Network, merger: &dyn Merger) -> Result<(), IpTreeError> {
        let (key, depth) = network.tree_key(self.ip_version)?;

        // Ancestors of the landing node, for compaction afterwards. Reset on
        // an alias hop: nodes above an alias are not owned by the target.
        let mut path: Vec<NodeId> = Vec::with_capacity(depth);
        let mut node = self.root;
        let mut d = 0;
        let landing = loop {
            match self.node(node) {
                Node::Alias(target) => {
                    path.clear();
                    node = *target;
                }
                Node::Internal { left, right } if d < depth => {
                    path.push(node);
                    node = if bit_at(key, d) { *right } else { *left };
                    d += 1;
                }
                _ => break node,
            }
        };

        let plan = if d < depth {
            match updated_region(self.node(landing), merger)? {
                Some(update) => Plan::Split {
                    node: landing,
                    depth: d,
                    update,
                },
                None => return Ok(()),
            }
        } else {
            let mut updates = Vec::new();
            for region in self.regions_under(landing) {
                if let Some(update) = updated_region(self.node(region), merger)? {
                    updates.push((region, update));
                }
            }
            Plan::Regions {
                top: landing,
                updates,
            }
        };

        log::trace!("insert {} landed at depth {}", network, d);
        self.apply(plan, key, depth, path);
        Ok(())
    }

    /// Clear every address in `network`
    pub fn remove(&mut self, network: &Network) -> Result<(), IpTreeError> {
        self.insert(network, &crate::merge::Remove)
    }

    /// Region nodes (empty or leaf) in the subtree at `top`, skipping aliases
    fn regions_under(&self, top: NodeId) -> Vec<NodeId> {
        let mut regions = Vec::new();
        let mut stack = vec![top];
        while let Some(id) = stack.pop() {
            match self.node(id) {
                Node::Internal { left, right } => {
                    stack.push(*right);
                    stack.push(*left);
                }
                Node::Alias(_) => {}
                Node::Empty | Node::Leaf(_) => regions.push(id),
            }
        }
        regions
    }

    fn apply(&mut self, plan: Plan, key: u128, depth: usize, mut path: Vec<NodeId>) {
        match plan {
            Plan::Split {
                node,
                depth: from,
                update,
            } => {
                let old = self.node(node).clone();
                let mut current = node;
                for d in from..depth {
                    let on_path = self.alloc(Node::Empty);
                    let sibling = self.alloc(old.clone());
                    self.nodes[current.index()] = if bit_at(key, d) {
                        Node::Internal {
                            left: sibling,
                            right: on_path,
                        }
                    } else {
                        Node::Internal {
                            left: on_path,
                            right: sibling,
                        }
                    };
                    path.push(current);
                    current = on_path;
                }
                self.nodes[current.index()] = update;
            }
            Plan::Regions { top, updates } => {
                if updates.is_empty() {
                    return;
                }
                for (id, update) in updates {
                    self.nodes[id.index()] = update;
                }
                self.compact_subtree(top);
            }
        }

        while let Some(id) = path.pop() {
            if !self.try_collapse(id) {
                break;
            }
        }
    }
}

/// New content for a region, or `None` if it stays as it is
fn updated_region(current: &Node, merger: &dyn Merger) -> Result<Option<Node>, IpTreeError> {
    let existing = current.value().map(|v| v.as_ref());
    match merger.merge(existing)? {
        MergeOutcome::Unchanged => Ok(None),
        MergeOutcome::Remove => Ok(match current {
            Node::Empty => None,
            _ => Some(Node::Empty),
        }),
        MergeOutcome::Store(value) => {
            if existing == Some(&value) {
                return Ok(None);
            }
            check_encodable(&value)?;
            Ok(Some(Node::Leaf(Arc::new(value))))
        }
    }
}
