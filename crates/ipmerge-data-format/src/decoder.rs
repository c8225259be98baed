//! Data section decoder

use crate::validation::MAX_TOTAL_DEPTH;
use crate::value::{type_id, Value};
use crate::DataError;
use std::collections::BTreeMap;

/// Decoder over a data section (or metadata) buffer
///
/// Offsets passed to [`decode`](Self::decode) index into `buffer`. Pointer
/// targets are relative to `base_offset`, which is 0 for a standalone data
/// section.
#[derive(Debug, Clone, Copy)]
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
    base_offset: usize,
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder over `buffer` with pointers relative to `base_offset`
    pub fn new(buffer: &'a [u8], base_offset: usize) -> Self {
        Self {
            buffer,
            base_offset,
        }
    }

    /// Decode the value at `offset`, following pointers
    pub fn decode(&self, offset: u32) -> Result<Value, DataError> {
        let (value, _) = self.decode_at(offset as usize, 0, true)?;
        Ok(value)
    }

    /// Decode the value at `offset` without following a pointer stored there
    pub fn decode_raw(&self, offset: u32) -> Result<Value, DataError> {
        let (value, _) = self.decode_at(offset as usize, 0, false)?;
        Ok(value)
    }

    /// Decode the value at `offset` and return it with the offset just past it
    pub fn decode_with_next(&self, offset: usize) -> Result<(Value, usize), DataError> {
        self.decode_at(offset, 0, true)
    }

    fn decode_at(
        &self,
        offset: usize,
        depth: usize,
        follow: bool,
    ) -> Result<(Value, usize), DataError> {
        if depth > MAX_TOTAL_DEPTH {
            return Err(DataError::DepthExceeded(format!(
                "nesting deeper than {} at offset {}",
                MAX_TOTAL_DEPTH, offset
            )));
        }

        let ctrl = self.byte(offset)?;
        let mut cursor = offset + 1;
        let mut type_id = ctrl >> 5;
        if type_id == type_id::EXTENDED {
            type_id = 7 + self.byte(cursor)?;
            cursor += 1;
            if type_id <= type_id::MAP {
                return Err(DataError::InvalidType(format!(
                    "extended type {} at offset {} is not an extended type",
                    type_id, offset
                )));
            }
        }

        if type_id == type_id::POINTER {
            let (target, next) = self.read_pointer(ctrl, cursor)?;
            if !follow {
                return Ok((Value::Pointer(target as u32), next));
            }
            let target_offset = self.base_offset + target;
            // Pointers to pointers are invalid
            if self.byte(target_offset)? >> 5 == type_id::POINTER {
                return Err(DataError::InvalidType(format!(
                    "pointer at offset {} points to another pointer",
                    offset
                )));
            }
            let (value, _) = self.decode_at(target_offset, depth + 1, true)?;
            return Ok((value, next));
        }

        let size = self.read_size(ctrl & 0x1f, &mut cursor)?;
        match type_id {
            type_id::STRING => {
                let raw = self.slice(cursor, size)?;
                let s = std::str::from_utf8(raw).map_err(|e| {
                    DataError::InvalidUtf8(format!("string at offset {}: {}", offset, e))
                })?;
                Ok((Value::String(s.to_string()), cursor + size))
            }
            type_id::DOUBLE => {
                let raw = self.fixed::<8>(cursor, size, "double")?;
                Ok((Value::Float64(f64::from_be_bytes(raw)), cursor + 8))
            }
            type_id::BYTES => {
                let raw = self.slice(cursor, size)?;
                Ok((Value::Bytes(raw.to_vec()), cursor + size))
            }
            type_id::UINT16 => {
                let v = self.read_uint(cursor, size, 2)?;
                Ok((Value::Uint16(v as u16), cursor + size))
            }
            type_id::UINT32 => {
                let v = self.read_uint(cursor, size, 4)?;
                Ok((Value::Uint32(v as u32), cursor + size))
            }
            type_id::INT32 => {
                let v = self.read_uint(cursor, size, 4)?;
                Ok((Value::Int32(v as u32 as i32), cursor + size))
            }
            type_id::UINT64 => {
                let v = self.read_uint(cursor, size, 8)?;
                Ok((Value::Uint64(v as u64), cursor + size))
            }
            type_id::UINT128 => {
                let v = self.read_uint(cursor, size, 16)?;
                Ok((Value::Uint128(v), cursor + size))
            }
            type_id::MAP => {
                let mut entries = BTreeMap::new();
                for _ in 0..size {
                    let (key, next) = self.decode_at(cursor, depth + 1, true)?;
                    let key = match key {
                        Value::String(s) => s,
                        other => {
                            return Err(DataError::InvalidType(format!(
                                "map key at offset {} is a {}",
                                cursor,
                                other.type_name()
                            )))
                        }
                    };
                    let (value, next) = self.decode_at(next, depth + 1, true)?;
                    entries.insert(key, value);
                    cursor = next;
                }
                Ok((Value::Map(entries), cursor))
            }
            type_id::ARRAY => {
                // Cap the pre-allocation; `size` comes from untrusted input
                let mut items = Vec::with_capacity(size.min(1024));
                for _ in 0..size {
                    let (value, next) = self.decode_at(cursor, depth + 1, true)?;
                    items.push(value);
                    cursor = next;
                }
                Ok((Value::Slice(items), cursor))
            }
            type_id::BOOL => match size {
                0 | 1 => Ok((Value::Bool(size == 1), cursor)),
                _ => Err(DataError::InvalidType(format!(
                    "boolean at offset {} has size {}",
                    offset, size
                ))),
            },
            type_id::FLOAT => {
                let raw = self.fixed::<4>(cursor, size, "float")?;
                Ok((Value::Float32(f32::from_be_bytes(raw)), cursor + 4))
            }
            other => Err(DataError::InvalidType(format!(
                "type {} at offset {}",
                other, offset
            ))),
        }
    }

    fn byte(&self, offset: usize) -> Result<u8, DataError> {
        self.buffer.get(offset).copied().ok_or_else(|| {
            DataError::InvalidOffset(format!(
                "offset {} beyond buffer of {} bytes",
                offset,
                self.buffer.len()
            ))
        })
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], DataError> {
        offset
            .checked_add(len)
            .and_then(|end| self.buffer.get(offset..end))
            .ok_or_else(|| {
                DataError::InvalidOffset(format!(
                    "{} bytes at offset {} run past buffer of {} bytes",
                    len,
                    offset,
                    self.buffer.len()
                ))
            })
    }

    fn fixed<const N: usize>(
        &self,
        offset: usize,
        size: usize,
        what: &str,
    ) -> Result<[u8; N], DataError> {
        if size != N {
            return Err(DataError::InvalidType(format!(
                "{} at offset {} has size {}",
                what, offset, size
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(offset, N)?);
        Ok(out)
    }

    fn read_uint(&self, offset: usize, size: usize, max: usize) -> Result<u128, DataError> {
        if size > max {
            return Err(DataError::InvalidType(format!(
                "integer at offset {} has {} bytes (max {})",
                offset, size, max
            )));
        }
        Ok(self
            .slice(offset, size)?
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    fn read_size(&self, size_bits: u8, cursor: &mut usize) -> Result<usize, DataError> {
        let size = match size_bits {
            0..=28 => size_bits as usize,
            29 => {
                let b = self.slice(*cursor, 1)?;
                *cursor += 1;
                29 + b[0] as usize
            }
            30 => {
                let b = self.slice(*cursor, 2)?;
                *cursor += 2;
                285 + u16::from_be_bytes([b[0], b[1]]) as usize
            }
            _ => {
                let b = self.slice(*cursor, 3)?;
                *cursor += 3;
                65_821 + ((b[0] as usize) << 16 | (b[1] as usize) << 8 | b[2] as usize)
            }
        };
        Ok(size)
    }

    fn read_pointer(&self, ctrl: u8, cursor: usize) -> Result<(usize, usize), DataError> {
        let size_bits = (ctrl >> 3) & 0x3;
        let low = (ctrl & 0x7) as usize;
        let b = self.slice(cursor, size_bits as usize + 1)?;
        let target = match size_bits {
            0 => (low << 8) | b[0] as usize,
            1 => 2048 + ((low << 16) | (b[0] as usize) << 8 | b[1] as usize),
            2 => {
                526_336
                    + ((low << 24) | (b[0] as usize) << 16 | (b[1] as usize) << 8 | b[2] as usize)
            }
            _ => u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize,
        };
        Ok((target, cursor + size_bits as usize + 1))
    }
}
