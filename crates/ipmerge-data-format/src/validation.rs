//! Validation of data section pointer structure for untrusted files
//!
//! Walks a value without building it, checking that every pointer lands
//! inside the data section, that pointer chains do not loop back onto
//! themselves, and that nesting stays within [`MAX_TOTAL_DEPTH`].

use crate::value::type_id;
use rustc_hash::FxHashSet;

/// Maximum reasonable total nesting depth (arrays/maps + pointers)
pub const MAX_TOTAL_DEPTH: usize = 64;

/// Validation error types for data section pointer chains
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerValidationError {
    /// Cycle detected in pointer chain
    Cycle { offset: usize },
    /// Depth limit exceeded
    DepthExceeded { depth: usize },
    /// Invalid offset encountered
    InvalidOffset { offset: usize, reason: String },
    /// Invalid type ID
    InvalidType { offset: usize, type_id: u8 },
}

impl std::fmt::Display for PointerValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointerValidationError::Cycle { offset } => {
                write!(f, "Pointer cycle detected at offset {}", offset)
            }
            PointerValidationError::DepthExceeded { depth } => {
                write!(f, "Depth {} exceeds limit", depth)
            }
            PointerValidationError::InvalidOffset { offset, reason } => {
                write!(f, "Invalid offset {} ({})", offset, reason)
            }
            PointerValidationError::InvalidType { offset, type_id } => {
                write!(f, "Invalid type {} at offset {}", type_id, offset)
            }
        }
    }
}

impl std::error::Error for PointerValidationError {}

/// Validate the value at `offset` and every pointer it reaches
///
/// Returns the maximum nesting depth found. Values shared through pointers
/// (the normal result of deduplication) are fine; only a pointer that leads
/// back to one of its own ancestors is reported as a cycle.
pub fn validate_data_value_pointers(
    data_section: &[u8],
    offset: usize,
) -> Result<usize, PointerValidationError> {
    let mut path = FxHashSet::default();
    validate_value(data_section, offset, &mut path, 0)
}

fn validate_value(
    data: &[u8],
    offset: usize,
    path: &mut FxHashSet<usize>,
    depth: usize,
) -> Result<usize, PointerValidationError> {
    if depth > MAX_TOTAL_DEPTH {
        return Err(PointerValidationError::DepthExceeded { depth });
    }
    if !path.insert(offset) {
        return Err(PointerValidationError::Cycle { offset });
    }

    let ctrl = byte_at(data, offset, "Offset beyond data section")?;
    let mut cursor = offset + 1;
    let mut type_id = ctrl >> 5;
    if type_id == type_id::EXTENDED {
        type_id = 7 + byte_at(data, cursor, "Extended type truncated")?;
        cursor += 1;
    }

    let mut max_depth = depth;
    match type_id {
        type_id::POINTER => {
            let target = decode_pointer_offset(data, &mut cursor, ctrl & 0x1f)?;
            if target >= data.len() {
                return Err(PointerValidationError::InvalidOffset {
                    offset: target,
                    reason: "Pointer target beyond data section".to_string(),
                });
            }
            max_depth = validate_value(data, target, path, depth + 1)?;
        }
        type_id::MAP => {
            let count = decode_size(data, &mut cursor, ctrl & 0x1f)?;
            for _ in 0..count {
                max_depth = max_depth.max(validate_value(data, cursor, path, depth + 1)?);
                cursor = skip_data_value(data, cursor)?;
                max_depth = max_depth.max(validate_value(data, cursor, path, depth + 1)?);
                cursor = skip_data_value(data, cursor)?;
            }
        }
        type_id::ARRAY => {
            let count = decode_size(data, &mut cursor, ctrl & 0x1f)?;
            for _ in 0..count {
                max_depth = max_depth.max(validate_value(data, cursor, path, depth + 1)?);
                cursor = skip_data_value(data, cursor)?;
            }
        }
        type_id::STRING..=type_id::UINT32
        | type_id::INT32
        | type_id::UINT64
        | type_id::UINT128
        | type_id::BOOL
        | type_id::FLOAT => {
            // Scalars carry no pointers, but must fit in the section
            skip_data_value(data, offset)?;
        }
        _ => {
            path.remove(&offset);
            return Err(PointerValidationError::InvalidType { offset, type_id });
        }
    }

    path.remove(&offset);
    Ok(max_depth)
}

fn byte_at(data: &[u8], offset: usize, reason: &str) -> Result<u8, PointerValidationError> {
    data.get(offset)
        .copied()
        .ok_or_else(|| PointerValidationError::InvalidOffset {
            offset,
            reason: reason.to_string(),
        })
}

/// Decode the size field of a control byte
fn decode_size(
    data: &[u8],
    cursor: &mut usize,
    size_bits: u8,
) -> Result<usize, PointerValidationError> {
    let extra = match size_bits {
        0..=28 => return Ok(size_bits as usize),
        29 => 1,
        30 => 2,
        _ => 3,
    };
    let bytes = data
        .get(*cursor..*cursor + extra)
        .ok_or_else(|| PointerValidationError::InvalidOffset {
            offset: *cursor,
            reason: "Size bytes out of bounds".to_string(),
        })?;
    *cursor += extra;
    let raw = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok(match extra {
        1 => 29 + raw,
        2 => 285 + raw,
        _ => 65_821 + raw,
    })
}

/// Decode the target of a pointer whose control byte payload is `payload`
fn decode_pointer_offset(
    data: &[u8],
    cursor: &mut usize,
    payload: u8,
) -> Result<usize, PointerValidationError> {
    let size_bits = ((payload >> 3) & 0x3) as usize;
    let low_3_bits = (payload & 0x7) as usize;
    let bytes = data
        .get(*cursor..*cursor + size_bits + 1)
        .ok_or_else(|| PointerValidationError::InvalidOffset {
            offset: *cursor,
            reason: "Pointer data truncated".to_string(),
        })?;
    *cursor += size_bits + 1;
    let raw = bytes.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize);
    Ok(match size_bits {
        0 => (low_3_bits << 8) | raw,
        1 => 2048 + ((low_3_bits << 16) | raw),
        2 => 526_336 + ((low_3_bits << 24) | raw),
        _ => raw,
    })
}

/// Skip past a data value (returns offset after the value)
fn skip_data_value(data: &[u8], offset: usize) -> Result<usize, PointerValidationError> {
    let ctrl = byte_at(data, offset, "Offset beyond data")?;
    let mut cursor = offset + 1;
    let mut type_id = ctrl >> 5;
    if type_id == type_id::EXTENDED {
        type_id = 7 + byte_at(data, cursor, "Extended type truncated")?;
        cursor += 1;
    }
    if type_id == type_id::POINTER {
        let size_bits = ((ctrl >> 3) & 0x3) as usize;
        return Ok(cursor + size_bits + 1);
    }

    let size = decode_size(data, &mut cursor, ctrl & 0x1f)?;
    let end = match type_id {
        type_id::MAP => {
            for _ in 0..size {
                cursor = skip_data_value(data, cursor)?; // key
                cursor = skip_data_value(data, cursor)?; // value
            }
            cursor
        }
        type_id::ARRAY => {
            for _ in 0..size {
                cursor = skip_data_value(data, cursor)?;
            }
            cursor
        }
        // Size field carries the value itself
        type_id::BOOL => cursor,
        type_id::STRING..=type_id::UINT32
        | type_id::INT32
        | type_id::UINT64
        | type_id::UINT128
        | type_id::FLOAT => cursor + size,
        _ => return Err(PointerValidationError::InvalidType { offset, type_id }),
    };
    if end > data.len() {
        return Err(PointerValidationError::InvalidOffset {
            offset,
            reason: "Value runs past data section".to_string(),
        });
    }
    Ok(end)
}
