//! Search-tree record packing
//!
//! Each node of the on-disk search tree is two records (left, right) packed
//! big-endian. 28-bit records share a middle byte: its high nibble holds
//! the top four bits of the left record, its low nibble those of the right.

/// Width of one search-tree record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordSize {
    /// 24-bit records, 6 bytes per node
    Bits24,
    /// 28-bit records, 7 bytes per node
    Bits28,
    /// 32-bit records, 8 bytes per node
    Bits32,
}

impl RecordSize {
    /// All sizes, smallest first
    pub const ALL: [RecordSize; 3] = [RecordSize::Bits24, RecordSize::Bits28, RecordSize::Bits32];

    /// Record width in bits
    pub fn bits(self) -> u16 {
        match self {
            RecordSize::Bits24 => 24,
            RecordSize::Bits28 => 28,
            RecordSize::Bits32 => 32,
        }
    }

    /// Bytes per node (two records)
    pub fn node_bytes(self) -> usize {
        self.bits() as usize / 4
    }

    /// Largest value a record can hold
    pub fn max_value(self) -> u64 {
        (1u64 << self.bits()) - 1
    }

    /// Parse the `record_size` metadata value
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            24 => Some(RecordSize::Bits24),
            28 => Some(RecordSize::Bits28),
            32 => Some(RecordSize::Bits32),
            _ => None,
        }
    }

    /// Smallest size that can hold `max_record`
    pub fn smallest_fitting(max_record: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|size| max_record <= size.max_value())
    }

    /// Append one node to `buf`
    pub fn write_node(self, buf: &mut Vec<u8>, left: u32, right: u32) {
        match self {
            RecordSize::Bits24 => {
                buf.extend_from_slice(&left.to_be_bytes()[1..]);
                buf.extend_from_slice(&right.to_be_bytes()[1..]);
            }
            RecordSize::Bits28 => {
                let l = left.to_be_bytes();
                let r = right.to_be_bytes();
                buf.extend_from_slice(&l[1..]);
                buf.push(((l[0] & 0x0f) << 4) | (r[0] & 0x0f));
                buf.extend_from_slice(&r[1..]);
            }
            RecordSize::Bits32 => {
                buf.extend_from_slice(&left.to_be_bytes());
                buf.extend_from_slice(&right.to_be_bytes());
            }
        }
    }

    /// Read node `index` from a search tree buffer
    ///
    /// Returns `None` when the node lies past the end of `tree`.
    pub fn read_node(self, tree: &[u8], index: u32) -> Option<(u32, u32)> {
        let node_bytes = self.node_bytes();
        let start = (index as usize).checked_mul(node_bytes)?;
        let b = tree.get(start..start.checked_add(node_bytes)?)?;
        let be24 = |s: &[u8]| (s[0] as u32) << 16 | (s[1] as u32) << 8 | s[2] as u32;
        Some(match self {
            RecordSize::Bits24 => (be24(&b[0..3]), be24(&b[3..6])),
            RecordSize::Bits28 => {
                let middle = b[3] as u32;
                (
                    ((middle >> 4) << 24) | be24(&b[0..3]),
                    ((middle & 0x0f) << 24) | be24(&b[4..7]),
                )
            }
            RecordSize::Bits32 => (
                u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
                u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
            ),
        })
    }
}
