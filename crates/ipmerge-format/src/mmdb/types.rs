//! MMDB layout constants

use crate::FormatError;
pub use ipmerge_ip_trie::{IpVersion, RecordSize, DATA_SECTION_SEPARATOR_SIZE};

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// The marker must start within this many bytes of the end of the file
pub const METADATA_SEARCH_WINDOW: usize = 128 * 1024;

/// Binary format major version written and accepted
pub const BINARY_FORMAT_MAJOR_VERSION: u16 = 2;

/// Binary format minor version written
pub const BINARY_FORMAT_MINOR_VERSION: u16 = 0;

/// Parse the `record_size` metadata value
pub fn record_size_from_bits(bits: u64) -> Result<RecordSize, FormatError> {
    u16::try_from(bits)
        .ok()
        .and_then(RecordSize::from_bits)
        .ok_or_else(|| {
            FormatError::CorruptDatabase(format!("invalid record size: {} bits", bits))
        })
}

/// Find the metadata marker and return the offset just past it
///
/// Only the last [`METADATA_SEARCH_WINDOW`] bytes are searched; the last
/// occurrence wins.
pub fn find_metadata_start(data: &[u8]) -> Result<usize, FormatError> {
    let window_start = data.len().saturating_sub(METADATA_SEARCH_WINDOW);
    data[window_start..]
        .windows(METADATA_MARKER.len())
        .rposition(|w| w == METADATA_MARKER)
        .map(|pos| window_start + pos + METADATA_MARKER.len())
        .ok_or_else(|| FormatError::CorruptDatabase("metadata marker not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_metadata_start() {
        let mut data = vec![0u8; 10];
        data.extend_from_slice(METADATA_MARKER);
        data.extend_from_slice(&[0xe0]);
        assert_eq!(find_metadata_start(&data).unwrap(), 10 + METADATA_MARKER.len());
    }

    #[test]
    fn test_marker_outside_window_not_found() {
        let mut data = METADATA_MARKER.to_vec();
        data.extend(std::iter::repeat(0u8).take(METADATA_SEARCH_WINDOW));
        assert!(find_metadata_start(&data).is_err());
    }

    #[test]
    fn test_truncated_marker() {
        let data = &METADATA_MARKER[..METADATA_MARKER.len() - 1];
        assert!(matches!(
            find_metadata_start(data),
            Err(FormatError::CorruptDatabase(_))
        ));
    }

    #[test]
    fn test_record_size_from_bits() {
        assert_eq!(record_size_from_bits(28).unwrap(), RecordSize::Bits28);
        assert!(record_size_from_bits(20).is_err());
        assert!(record_size_from_bits(1 << 20).is_err());
    }
}
