//! The public database handle

use crate::error::Result;
use crate::options::Options;
use ipmerge_data_format::Value;
use ipmerge_format::{read_database, read_database_file, write_database, LoadedDatabase};
use ipmerge_format::{Metadata, WriteOptions};
use ipmerge_ip_trie::{IntoNetwork, IpTrie, IpVersion, MergeStrategy, Merger, Network, RecordSize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::IpAddr;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Result of a successful lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupResult<'a> {
    /// Value stored for the address
    pub value: &'a Value,
    /// Number of leading address bits that matched, in the address's family
    pub prefix_len: u8,
}

/// An in-memory MMDB database that can be enriched and written out
///
/// ```
/// use ipmerge::{merge::TopLevelMerge, Database, Options, Value};
///
/// let mut db = Database::new(Options::default());
/// db.insert("56.0.0.0/16", Value::map([("AcmeCorp.DeptName", "SRE")]))?;
/// db.insert_with(
///     "56.0.1.0/24",
///     &TopLevelMerge::new(Value::map([("AcmeCorp.Ticket", "X")])),
/// )?;
///
/// let hit = db.lookup("56.0.1.1".parse().unwrap()).unwrap();
/// assert_eq!(hit.value.get("AcmeCorp.DeptName"), Some(&Value::from("SRE")));
/// assert_eq!(hit.value.get("AcmeCorp.Ticket"), Some(&Value::from("X")));
///
/// let bytes = db.to_bytes()?;
/// let reopened = Database::from_bytes(&bytes, Options::default())?;
/// assert_eq!(reopened.lookup("56.0.1.1".parse().unwrap()), Some(hit));
/// # Ok::<(), ipmerge::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    trie: IpTrie,
    metadata: Metadata,
    record_size: Option<RecordSize>,
    merge_strategy: MergeStrategy,
}

impl Database {
    /// Create an empty database
    pub fn new(options: Options) -> Self {
        let ip_version = options.ip_version.unwrap_or(IpVersion::V6);
        let mut trie = IpTrie::new(ip_version);
        if !options.disable_ipv4_aliasing {
            trie.enable_ipv4_aliasing();
        }

        let mut metadata = Metadata::new(ip_version, "");
        metadata.build_epoch = options.build_epoch.unwrap_or_else(now_epoch);
        Self::with_trie(trie, metadata, options)
    }

    /// Load a database from an MMDB file
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let loaded = read_database_file(path.as_ref())?;
        log::info!(
            "opened {} ({} nodes, IPv{})",
            path.as_ref().display(),
            loaded.metadata.node_count,
            loaded.metadata.ip_version.as_u16()
        );
        Ok(Self::from_loaded(loaded, options))
    }

    /// Load a database from MMDB bytes
    pub fn from_bytes(bytes: &[u8], options: Options) -> Result<Self> {
        let loaded = read_database(bytes)?;
        Ok(Self::from_loaded(loaded, options))
    }

    fn from_loaded(loaded: LoadedDatabase, options: Options) -> Self {
        let LoadedDatabase { mut trie, metadata } = loaded;
        if !options.disable_ipv4_aliasing {
            trie.enable_ipv4_aliasing();
        }
        Self::with_trie(trie, metadata, options)
    }

    fn with_trie(trie: IpTrie, mut metadata: Metadata, options: Options) -> Self {
        if let Some(database_type) = options.database_type {
            metadata.database_type = database_type;
        }
        if let Some(description) = options.description {
            metadata.description = description;
        }
        if let Some(languages) = options.languages {
            metadata.languages = languages;
        }
        if let Some(epoch) = options.build_epoch {
            metadata.build_epoch = epoch;
        }
        Self {
            trie,
            metadata,
            record_size: options.record_size,
            merge_strategy: options.merge_strategy,
        }
    }

    /// Insert `value` at `network` using the database's default strategy
    pub fn insert<N: IntoNetwork>(&mut self, network: N, value: impl Into<Value>) -> Result<()> {
        let merger = self.merge_strategy.merger(value.into());
        self.insert_with(network, merger.as_ref())
    }

    /// Insert at `network`, letting `merger` decide each covered region's
    /// new value
    ///
    /// On error the database is unchanged.
    pub fn insert_with<N: IntoNetwork>(&mut self, network: N, merger: &dyn Merger) -> Result<()> {
        let network = network.into_network()?;
        self.trie.insert(&network, merger)?;
        Ok(())
    }

    /// Remove all data for `network`
    pub fn remove<N: IntoNetwork>(&mut self, network: N) -> Result<()> {
        let network = network.into_network()?;
        self.trie.remove(&network)?;
        Ok(())
    }

    /// Value for `addr`, if any
    pub fn lookup(&self, addr: IpAddr) -> Option<LookupResult<'_>> {
        self.trie.lookup(addr).map(|hit| LookupResult {
            value: hit.value.as_ref(),
            prefix_len: hit.prefix_len,
        })
    }

    /// Every network with data, in address order
    pub fn networks(&self) -> impl Iterator<Item = (Network, &Value)> + '_ {
        self.trie.networks().map(|(net, value)| (net, value.as_ref()))
    }

    /// Address family of the search tree
    pub fn ip_version(&self) -> IpVersion {
        self.trie.ip_version()
    }

    /// Metadata to be written
    ///
    /// `node_count` and `record_size` describe the file this database was
    /// opened from (zero and the default for a new database); the written
    /// values are computed by [`write_to`](Self::write_to).
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Number of internal search tree nodes currently in use
    pub fn node_count(&self) -> usize {
        self.trie.node_count()
    }

    /// Serialize into `out`, returning the number of bytes written
    ///
    /// The whole file is built in memory first; on error nothing has been
    /// written unless `out` itself failed part way.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<usize> {
        let options = WriteOptions {
            database_type: self.metadata.database_type.clone(),
            description: self.metadata.description.clone(),
            languages: self.metadata.languages.clone(),
            build_epoch: self.metadata.build_epoch,
            record_size: self.record_size,
        };
        let mut buffer = Vec::new();
        let (written, _) = write_database(&self.trie, &options, &mut buffer)?;
        out.write_all(&buffer)?;
        Ok(written)
    }

    /// Serialize into a new byte vector
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Serialize into the file at `path`, replacing it
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut out = BufWriter::new(File::create(path)?);
        let written = self.write_to(&mut out)?;
        out.flush()?;
        log::info!("wrote {} ({} bytes)", path.display(), written);
        Ok(written)
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use ipmerge_ip_trie::merge::{DeepMerge, Remove};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_new_database_defaults() {
        let db = Database::new(Options::default().build_epoch(7));
        assert_eq!(db.ip_version(), IpVersion::V6);
        assert_eq!(db.metadata().build_epoch, 7);
        assert_eq!(db.networks().count(), 0);
        assert!(db.lookup(ip("1.1.1.1")).is_none());
    }

    #[test]
    fn test_insert_uses_default_strategy() {
        let mut db = Database::new(Options::default().merge_strategy(MergeStrategy::DeepMerge));
        db.insert("10.0.0.0/8", Value::map([("a", Value::map([("x", 1u32)]))]))
            .unwrap();
        db.insert("10.0.0.0/8", Value::map([("a", Value::map([("y", 2u32)]))]))
            .unwrap();
        let hit = db.lookup(ip("10.9.9.9")).unwrap();
        let inner = hit.value.get("a").unwrap();
        assert_eq!(inner.get("x"), Some(&Value::Uint32(1)));
        assert_eq!(inner.get("y"), Some(&Value::Uint32(2)));
    }

    #[test]
    fn test_insert_accepts_network_forms() {
        let mut db = Database::new(Options::default().ip_version(IpVersion::V4));
        db.insert("192.0.2.0/24", "a").unwrap();
        db.insert((ip("198.51.100.0"), 24), "b").unwrap();
        db.insert(ip("203.0.113.9"), "c").unwrap();
        assert_eq!(db.lookup(ip("198.51.100.1")).unwrap().value, &Value::from("b"));
        assert_eq!(db.lookup(ip("203.0.113.9")).unwrap().prefix_len, 32);
    }

    #[test]
    fn test_invalid_networks() {
        let mut db = Database::new(Options::default().ip_version(IpVersion::V4));
        assert!(matches!(
            db.insert("10.0.0.0/40", "x"),
            Err(Error::InvalidNetwork(_))
        ));
        assert!(matches!(
            db.insert("not-a-network", "x"),
            Err(Error::InvalidNetwork(_))
        ));
        assert!(matches!(
            db.insert("2001:db8::/32", "x"),
            Err(Error::InvalidNetwork(_))
        ));
    }

    #[test]
    fn test_remove() {
        let mut db = Database::new(Options::default());
        db.insert("10.0.0.0/8", "x").unwrap();
        db.remove("10.1.0.0/16").unwrap();
        assert!(db.lookup(ip("10.1.2.3")).is_none());
        assert!(db.lookup(ip("10.2.2.3")).is_some());
        db.insert_with("10.0.0.0/8", &Remove).unwrap();
        assert_eq!(db.networks().count(), 0);
    }

    #[test]
    fn test_strict_merge_error_leaves_database_unchanged() {
        let mut db = Database::new(Options::default());
        db.insert("10.0.0.0/8", "scalar").unwrap();
        let before = db.to_bytes().unwrap();
        let err = db
            .insert_with("10.0.0.0/8", &DeepMerge::new(Value::map([("a", "b")])).strict())
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
        assert_eq!(db.to_bytes().unwrap(), before);
    }

    #[test]
    fn test_options_override_file_metadata() {
        let db = Database::new(
            Options::default()
                .database_type("Original")
                .languages(["en"])
                .build_epoch(100),
        );
        let bytes = db.to_bytes().unwrap();

        let inherited = Database::from_bytes(&bytes, Options::default()).unwrap();
        assert_eq!(inherited.metadata().database_type, "Original");
        assert_eq!(inherited.metadata().build_epoch, 100);

        let overridden = Database::from_bytes(
            &bytes,
            Options::default().database_type("Enriched").build_epoch(200),
        )
        .unwrap();
        assert_eq!(overridden.metadata().database_type, "Enriched");
        assert_eq!(overridden.metadata().languages, vec!["en".to_string()]);
        assert_eq!(overridden.metadata().build_epoch, 200);
    }
}
