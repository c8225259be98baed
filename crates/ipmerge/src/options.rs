//! Database configuration

use ipmerge_ip_trie::{IpVersion, MergeStrategy, RecordSize};
use std::collections::BTreeMap;

/// Options for creating or opening a [`Database`](crate::Database)
///
/// Descriptive fields left unset inherit the values stored in the file when
/// opening, and fall back to empty values for a new database.
///
/// ```
/// use ipmerge::{MergeStrategy, Options, RecordSize};
///
/// let options = Options::default()
///     .database_type("Acme-Enriched")
///     .description("en", "GeoLite2 with department data")
///     .languages(["en"])
///     .record_size(RecordSize::Bits28)
///     .merge_strategy(MergeStrategy::TopLevelMerge);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub(crate) disable_ipv4_aliasing: bool,
    pub(crate) record_size: Option<RecordSize>,
    pub(crate) languages: Option<Vec<String>>,
    pub(crate) description: Option<BTreeMap<String, String>>,
    pub(crate) ip_version: Option<IpVersion>,
    pub(crate) database_type: Option<String>,
    pub(crate) build_epoch: Option<u64>,
    pub(crate) merge_strategy: MergeStrategy,
}

impl Options {
    /// Do not alias the IPv4-equivalent IPv6 networks onto `::/96`
    ///
    /// Only affects IPv6 databases. A file opened with aliasing disabled
    /// keeps whatever aliases it already has.
    pub fn disable_ipv4_aliasing(mut self) -> Self {
        self.disable_ipv4_aliasing = true;
        self
    }

    /// Write with this record size instead of the smallest that fits
    pub fn record_size(mut self, size: RecordSize) -> Self {
        self.record_size = Some(size);
        self
    }

    /// Locale codes the records may contain
    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = Some(languages.into_iter().map(Into::into).collect());
        self
    }

    /// Add a description for `language`
    pub fn description(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.description
            .get_or_insert_with(BTreeMap::new)
            .insert(language.into(), text.into());
        self
    }

    /// Address family of a new database (default IPv6)
    ///
    /// Ignored when opening a file, which keeps its own.
    pub fn ip_version(mut self, version: IpVersion) -> Self {
        self.ip_version = Some(version);
        self
    }

    /// Free-form database type written to the metadata
    pub fn database_type(mut self, database_type: impl Into<String>) -> Self {
        self.database_type = Some(database_type.into());
        self
    }

    /// Build time, seconds since the Unix epoch (default: now, or the
    /// file's value when opening)
    pub fn build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = Some(epoch);
        self
    }

    /// Strategy used by [`Database::insert`](crate::Database::insert)
    pub fn merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }
}
