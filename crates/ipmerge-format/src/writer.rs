//! MMDB serializer
//!
//! Internal nodes are numbered in pre-order, left child first, without
//! following aliases. An alias record points at its target's node number, so
//! aliased subtrees are written once. Leaf values go through a deduplicating
//! [`DataEncoder`].

use crate::mmdb::types::{RecordSize, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
use crate::mmdb::Metadata;
use crate::FormatError;
use ipmerge_data_format::{encode_canonical, DataEncoder, Value};
use ipmerge_ip_trie::{IpTrie, Node, NodeId};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

/// Settings for writing a database
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Free-form database type
    pub database_type: String,
    /// Descriptions keyed by language code
    pub description: BTreeMap<String, String>,
    /// Locale codes the records may contain
    pub languages: Vec<String>,
    /// Build time, seconds since the Unix epoch
    pub build_epoch: u64,
    /// Fixed record size, or `None` to pick the smallest that fits
    pub record_size: Option<RecordSize>,
}

/// A search-tree record before node numbering is final
#[derive(Debug, Clone, Copy)]
enum Record {
    Empty,
    Node(u32),
    Data(u32),
}

/// Serialize `trie` into `out`
///
/// Returns the number of bytes written and the metadata that was written.
pub fn write_database<W: Write>(
    trie: &IpTrie,
    options: &WriteOptions,
    out: &mut W,
) -> Result<(usize, Metadata), FormatError> {
    let layout = TreeLayout::build(trie)?;
    let node_count = layout.nodes.len() as u32;

    let max_record = node_count as u64 + DATA_SECTION_SEPARATOR_SIZE as u64 + layout.data.len() as u64;
    let record_size = match options.record_size {
        Some(size) if max_record > size.max_value() => {
            return Err(FormatError::RecordTooLarge(format!(
                "{} nodes and {} data bytes need records wider than {} bits",
                node_count,
                layout.data.len(),
                size.bits()
            )))
        }
        Some(size) => size,
        None => RecordSize::smallest_fitting(max_record).ok_or_else(|| {
            FormatError::RecordTooLarge(format!(
                "{} nodes and {} data bytes exceed 32-bit records",
                node_count,
                layout.data.len()
            ))
        })?,
    };

    let resolve = |record: Record| -> u32 {
        match record {
            Record::Empty => node_count,
            Record::Node(n) => n,
            Record::Data(offset) => node_count + DATA_SECTION_SEPARATOR_SIZE + offset,
        }
    };
    let mut tree = Vec::with_capacity(layout.nodes.len() * record_size.node_bytes());
    for &(left, right) in &layout.nodes {
        record_size.write_node(&mut tree, resolve(left), resolve(right));
    }

    let metadata = Metadata {
        build_epoch: options.build_epoch,
        database_type: options.database_type.clone(),
        description: options.description.clone(),
        languages: options.languages.clone(),
        node_count,
        record_size,
        ..Metadata::new(trie.ip_version(), "")
    };
    let metadata_bytes = encode_canonical(&metadata.to_value())?;

    out.write_all(&tree)?;
    out.write_all(&[0u8; DATA_SECTION_SEPARATOR_SIZE as usize])?;
    out.write_all(&layout.data)?;
    out.write_all(METADATA_MARKER)?;
    out.write_all(&metadata_bytes)?;

    let written = tree.len()
        + DATA_SECTION_SEPARATOR_SIZE as usize
        + layout.data.len()
        + METADATA_MARKER.len()
        + metadata_bytes.len();
    log::debug!(
        "wrote {} nodes ({}-bit records), {} data bytes, {} bytes total",
        node_count,
        record_size.bits(),
        layout.data.len(),
        written
    );
    Ok((written, metadata))
}

/// Numbered nodes and encoded data section
struct TreeLayout {
    nodes: Vec<(Record, Record)>,
    data: Vec<u8>,
}

impl TreeLayout {
    fn build(trie: &IpTrie) -> Result<Self, FormatError> {
        let order = number_nodes(trie);
        let mut builder = LayoutBuilder {
            trie,
            numbers: order
                .iter()
                .enumerate()
                .map(|(n, id)| (*id, n as u32))
                .collect(),
            encoder: DataEncoder::new(),
            by_arc: FxHashMap::default(),
        };

        let nodes = if order.is_empty() {
            // Region root: one node with identical records
            let record = builder.record(trie.root())?;
            vec![(record, record)]
        } else {
            let mut nodes = Vec::with_capacity(order.len());
            for id in &order {
                if let Node::Internal { left, right } = trie.node(*id) {
                    nodes.push((builder.record(*left)?, builder.record(*right)?));
                }
            }
            nodes
        };
        Ok(Self {
            nodes,
            data: builder.encoder.into_bytes(),
        })
    }
}

/// Internal nodes in pre-order, left first, aliases not followed
fn number_nodes(trie: &IpTrie) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut stack = vec![trie.root()];
    while let Some(id) = stack.pop() {
        if let Node::Internal { left, right } = trie.node(id) {
            order.push(id);
            stack.push(*right);
            stack.push(*left);
        }
    }
    order
}

struct LayoutBuilder<'a> {
    trie: &'a IpTrie,
    numbers: FxHashMap<NodeId, u32>,
    encoder: DataEncoder,
    // Leaves split from one region share an Arc; skip re-encoding them
    by_arc: FxHashMap<*const Value, u32>,
}

impl LayoutBuilder<'_> {
    fn record(&mut self, id: NodeId) -> Result<Record, FormatError> {
        let id = match self.trie.node(id) {
            Node::Alias(target) => *target,
            _ => id,
        };
        match self.trie.node(id) {
            Node::Empty | Node::Alias(_) => Ok(Record::Empty),
            Node::Internal { .. } => self.numbers.get(&id).map(|n| Record::Node(*n)).ok_or_else(
                || FormatError::CorruptDatabase(format!("alias target {} unreachable", id.index())),
            ),
            Node::Leaf(value) => Ok(Record::Data(self.data_offset(value)?)),
        }
    }

    fn data_offset(&mut self, value: &Arc<Value>) -> Result<u32, FormatError> {
        let key = Arc::as_ptr(value);
        if let Some(&offset) = self.by_arc.get(&key) {
            return Ok(offset);
        }
        let offset = self.encoder.encode(value)?;
        self.by_arc.insert(key, offset);
        Ok(offset)
    }
}
