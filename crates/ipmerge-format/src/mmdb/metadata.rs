//! Database metadata map

use super::types::{
    record_size_from_bits, IpVersion, RecordSize, BINARY_FORMAT_MAJOR_VERSION,
    BINARY_FORMAT_MINOR_VERSION,
};
use crate::FormatError;
use ipmerge_data_format::Value;
use std::collections::BTreeMap;

/// Metadata stored after the marker at the end of an MMDB file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Always 2 for files this crate reads or writes
    pub binary_format_major_version: u16,
    /// Minor format version
    pub binary_format_minor_version: u16,
    /// Build time, seconds since the Unix epoch
    pub build_epoch: u64,
    /// Free-form database type, e.g. `GeoIP2-City`
    pub database_type: String,
    /// Descriptions keyed by language code
    pub description: BTreeMap<String, String>,
    /// Address family of the search tree
    pub ip_version: IpVersion,
    /// Locale codes the records may contain
    pub languages: Vec<String>,
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Search tree record width
    pub record_size: RecordSize,
}

impl Metadata {
    /// Metadata for a new file with an empty tree
    pub fn new(ip_version: IpVersion, database_type: impl Into<String>) -> Self {
        Self {
            binary_format_major_version: BINARY_FORMAT_MAJOR_VERSION,
            binary_format_minor_version: BINARY_FORMAT_MINOR_VERSION,
            build_epoch: 0,
            database_type: database_type.into(),
            description: BTreeMap::new(),
            ip_version,
            languages: Vec::new(),
            node_count: 0,
            record_size: RecordSize::Bits28,
        }
    }

    /// Metadata as the map written to disk
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert(
            "binary_format_major_version".to_string(),
            Value::Uint16(self.binary_format_major_version),
        );
        map.insert(
            "binary_format_minor_version".to_string(),
            Value::Uint16(self.binary_format_minor_version),
        );
        map.insert("build_epoch".to_string(), Value::Uint64(self.build_epoch));
        map.insert(
            "database_type".to_string(),
            Value::String(self.database_type.clone()),
        );
        map.insert(
            "description".to_string(),
            Value::map(self.description.iter().map(|(k, v)| (k.clone(), v.clone()))),
        );
        map.insert(
            "ip_version".to_string(),
            Value::Uint16(self.ip_version.as_u16()),
        );
        map.insert(
            "languages".to_string(),
            Value::slice(self.languages.iter().cloned()),
        );
        map.insert("node_count".to_string(), Value::Uint32(self.node_count));
        map.insert(
            "record_size".to_string(),
            Value::Uint16(self.record_size.bits()),
        );
        Value::Map(map)
    }

    /// Parse the decoded metadata map
    ///
    /// A major version other than 2 is reported as
    /// [`FormatError::UnsupportedFormatVersion`] before anything else is
    /// checked.
    pub fn from_value(value: &Value) -> Result<Self, FormatError> {
        let map = value
            .as_map()
            .ok_or_else(|| corrupt("metadata is not a map"))?;

        let major = uint(map, "binary_format_major_version")?;
        let minor = map
            .get("binary_format_minor_version")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if major != BINARY_FORMAT_MAJOR_VERSION as u64 {
            return Err(FormatError::UnsupportedFormatVersion {
                major: u16::try_from(major).unwrap_or(u16::MAX),
                minor: u16::try_from(minor).unwrap_or(u16::MAX),
            });
        }

        let ip_version = uint(map, "ip_version")?;
        let ip_version = u16::try_from(ip_version)
            .ok()
            .and_then(IpVersion::from_u16)
            .ok_or_else(|| corrupt(&format!("invalid ip_version {}", ip_version)))?;
        let node_count = uint(map, "node_count")?;
        let node_count = u32::try_from(node_count)
            .map_err(|_| corrupt(&format!("node_count {} out of range", node_count)))?;

        let description = match map.get("description") {
            None => BTreeMap::new(),
            Some(Value::Map(entries)) => entries
                .iter()
                .map(|(lang, text)| match text {
                    Value::String(s) => Ok((lang.clone(), s.clone())),
                    other => Err(corrupt(&format!(
                        "description for '{}' is {}",
                        lang,
                        other.type_name()
                    ))),
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(corrupt(&format!("description is {}", other.type_name())))
            }
        };

        let languages = match map.get("languages") {
            None => Vec::new(),
            Some(Value::Slice(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| corrupt("languages must be strings"))
                })
                .collect::<Result<_, _>>()?,
            Some(other) => return Err(corrupt(&format!("languages is {}", other.type_name()))),
        };

        Ok(Self {
            binary_format_major_version: BINARY_FORMAT_MAJOR_VERSION,
            binary_format_minor_version: minor as u16,
            build_epoch: map.get("build_epoch").and_then(Value::as_u64).unwrap_or(0),
            database_type: map
                .get("database_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            description,
            ip_version,
            languages,
            node_count,
            record_size: record_size_from_bits(uint(map, "record_size")?)?,
        })
    }
}

fn uint(map: &BTreeMap<String, Value>, key: &str) -> Result<u64, FormatError> {
    map.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| corrupt(&format!("missing or invalid {}", key)))
}

fn corrupt(msg: &str) -> FormatError {
    FormatError::CorruptDatabase(format!("metadata: {}", msg))
}
