//! MMDB deserializer
//!
//! Loads a complete file into an [`IpTrie`]. Every structural property is
//! checked before the trie is built: tree records, reachability, cycles and
//! data pointers. A tree node referenced from more than one record becomes
//! an alias of its first (pre-order, left first) occurrence.

use crate::mmdb::types::{find_metadata_start, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
use crate::mmdb::Metadata;
use crate::FormatError;
use ipmerge_data_format::{validate_data_value_pointers, DataDecoder, Value};
use ipmerge_ip_trie::{validate_ip_tree, IpTrie, Node, NodeId, RecordSize};
use memmap2::Mmap;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// A database read from disk
#[derive(Debug, Clone)]
pub struct LoadedDatabase {
    /// Search tree and data
    pub trie: IpTrie,
    /// Metadata as found in the file
    pub metadata: Metadata,
}

/// Read a database from a file, memory-mapping it while loading
pub fn read_database_file(path: impl AsRef<Path>) -> Result<LoadedDatabase, FormatError> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| FormatError::Io {
            kind: e.kind(),
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;
    if file.metadata()?.len() == 0 {
        return Err(FormatError::CorruptDatabase(format!(
            "{} is empty",
            path.display()
        )));
    }

    // Everything is copied out of the map before it is dropped
    let mmap = unsafe { Mmap::map(&file) }
        .map_err(|e| FormatError::Io {
            kind: e.kind(),
            message: format!("Failed to mmap {}: {}", path.display(), e),
        })?;
    log::debug!("loading {} ({} bytes)", path.display(), mmap.len());
    read_database(&mmap)
}

/// Read a database from an in-memory buffer
pub fn read_database(data: &[u8]) -> Result<LoadedDatabase, FormatError> {
    let metadata_start = find_metadata_start(data)?;
    let marker_start = metadata_start - METADATA_MARKER.len();
    let metadata_value = DataDecoder::new(&data[metadata_start..], 0).decode(0)?;
    let metadata = Metadata::from_value(&metadata_value)?;

    if metadata.node_count == 0 {
        return Err(FormatError::CorruptDatabase(
            "search tree has no nodes".to_string(),
        ));
    }
    let tree_size = metadata.node_count as usize * metadata.record_size.node_bytes();
    let data_start = tree_size + DATA_SECTION_SEPARATOR_SIZE as usize;
    if data_start > marker_start {
        return Err(FormatError::CorruptDatabase(format!(
            "{} nodes of {} bytes do not fit before the metadata at {}",
            metadata.node_count,
            metadata.record_size.node_bytes(),
            marker_start
        )));
    }
    if data[tree_size..data_start].iter().any(|&b| b != 0) {
        return Err(FormatError::CorruptDatabase(
            "data section separator is not zero".to_string(),
        ));
    }

    let tree = &data[..tree_size];
    let data_section = &data[data_start..marker_start];
    let validation = validate_ip_tree(
        tree,
        metadata.node_count,
        metadata.record_size,
        metadata.ip_version,
        data_section.len(),
    );
    if !validation.is_valid() {
        return Err(FormatError::CorruptDatabase(validation.errors.join("; ")));
    }

    let mut loader = TrieLoader {
        tree,
        record_size: metadata.record_size,
        node_count: metadata.node_count,
        data_section,
        decoder: DataDecoder::new(data_section, 0),
        nodes: Vec::with_capacity(metadata.node_count as usize * 2 + 1),
        seen: FxHashMap::default(),
        values: FxHashMap::default(),
    };
    let trie = loader.load(&metadata)?;
    log::debug!(
        "loaded {} nodes, {} distinct values, {} shared subtrees",
        metadata.node_count,
        loader.values.len(),
        validation.stats.shared_nodes
    );
    Ok(LoadedDatabase { trie, metadata })
}

struct TrieLoader<'a> {
    tree: &'a [u8],
    record_size: RecordSize,
    node_count: u32,
    data_section: &'a [u8],
    decoder: DataDecoder<'a>,
    nodes: Vec<Node>,
    /// File node index -> arena id of its first occurrence
    seen: FxHashMap<u32, NodeId>,
    /// Data offset -> decoded value
    values: FxHashMap<u32, Arc<Value>>,
}

impl TrieLoader<'_> {
    fn load(&mut self, metadata: &Metadata) -> Result<IpTrie, FormatError> {
        let (left, right) = self.read_node(0)?;
        if metadata.node_count == 1 && left == right && left >= self.node_count {
            // Single node with identical records: the whole space is one region
            let root = self.region(left)?;
            self.nodes.push(root);
        } else {
            self.nodes.push(Node::Empty);
            self.seen.insert(0, NodeId::from_index(0));
            let mut stack = vec![(0u32, NodeId::from_index(0))];
            while let Some((index, arena)) = stack.pop() {
                let (left, right) = self.read_node(index)?;
                let mut queued = Vec::with_capacity(2);
                let left = self.child(left, &mut queued)?;
                let right = self.child(right, &mut queued)?;
                self.nodes[arena.index()] = Node::Internal { left, right };
                // left on top, so nodes are first seen in pre-order
                stack.extend(queued.into_iter().rev());
            }
        }
        let nodes = std::mem::take(&mut self.nodes);
        Ok(IpTrie::from_nodes(
            metadata.ip_version,
            nodes,
            NodeId::from_index(0),
        )?)
    }

    fn read_node(&self, index: u32) -> Result<(u32, u32), FormatError> {
        self.record_size.read_node(self.tree, index).ok_or_else(|| {
            FormatError::CorruptDatabase(format!("node {} past end of search tree", index))
        })
    }

    /// Arena node for a record, queueing unseen tree nodes
    fn child(
        &mut self,
        record: u32,
        queued: &mut Vec<(u32, NodeId)>,
    ) -> Result<NodeId, FormatError> {
        let node = if record < self.node_count {
            match self.seen.get(&record) {
                Some(&first) => Node::Alias(first),
                None => {
                    let id = self.push(Node::Empty);
                    self.seen.insert(record, id);
                    queued.push((record, id));
                    return Ok(id);
                }
            }
        } else {
            self.region(record)?
        };
        Ok(self.push(node))
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId::from_index(self.nodes.len() - 1)
    }

    /// Empty or leaf node for a non-node record
    fn region(&mut self, record: u32) -> Result<Node, FormatError> {
        if record == self.node_count {
            return Ok(Node::Empty);
        }
        let offset = record - self.node_count - DATA_SECTION_SEPARATOR_SIZE;
        if let Some(value) = self.values.get(&offset) {
            return Ok(Node::Leaf(Arc::clone(value)));
        }
        validate_data_value_pointers(self.data_section, offset as usize)?;
        let value = Arc::new(self.decoder.decode(offset)?);
        self.values.insert(offset, Arc::clone(&value));
        Ok(Node::Leaf(value))
    }
}
