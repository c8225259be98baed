//! Merge strategies applied when an insert overlaps existing data
//!
//! A [`Merger`] is called once per previously distinct region that an insert
//! covers, with that region's current value (`None` when empty), and decides
//! what the region holds afterwards.
//!
//! ```
//! use ipmerge_data_format::Value;
//! use ipmerge_ip_trie::merge::{MergeOutcome, Merger, TopLevelMerge};
//!
//! let existing = Value::map([("country", "US")]);
//! let merger = TopLevelMerge::new(Value::map([("AcmeCorp.DeptName", "SRE")]));
//!
//! match merger.merge(Some(&existing)).unwrap() {
//!     MergeOutcome::Store(v) => {
//!         assert_eq!(v.get("country"), Some(&Value::from("US")));
//!         assert_eq!(v.get("AcmeCorp.DeptName"), Some(&Value::from("SRE")));
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use crate::IpTreeError;
use ipmerge_data_format::Value;
use std::collections::BTreeMap;

/// What a region holds after a merge
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Store this value
    Store(Value),
    /// Leave the region as it is
    Unchanged,
    /// Clear the region
    Remove,
}

/// Decides the new value of a region from its current value
pub trait Merger {
    /// Merge with the region's current value (`None` when empty)
    fn merge(&self, existing: Option<&Value>) -> Result<MergeOutcome, IpTreeError>;
}

impl<F> Merger for F
where
    F: Fn(Option<&Value>) -> Result<MergeOutcome, IpTreeError>,
{
    fn merge(&self, existing: Option<&Value>) -> Result<MergeOutcome, IpTreeError> {
        self(existing)
    }
}

/// How map-merging strategies treat a value that is not a map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Fall back to replacing the old value
    #[default]
    Replace,
    /// Fail with [`IpTreeError::TypeMismatch`]
    Error,
}

/// Built-in strategies, selectable as a database default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Ignore the old value
    #[default]
    Replace,
    /// Union top-level map keys, new value wins
    TopLevelMerge,
    /// Union map keys recursively, new value wins
    DeepMerge,
}

impl MergeStrategy {
    /// Build the merger for this strategy inserting `value`
    pub fn merger(self, value: Value) -> Box<dyn Merger> {
        match self {
            MergeStrategy::Replace => Box::new(Replace(value)),
            MergeStrategy::TopLevelMerge => Box::new(TopLevelMerge::new(value)),
            MergeStrategy::DeepMerge => Box::new(DeepMerge::new(value)),
        }
    }
}

/// Store the new value unconditionally
#[derive(Debug, Clone)]
pub struct Replace(pub Value);

impl Merger for Replace {
    fn merge(&self, _existing: Option<&Value>) -> Result<MergeOutcome, IpTreeError> {
        Ok(MergeOutcome::Store(self.0.clone()))
    }
}

/// Clear every covered region
#[derive(Debug, Clone, Copy, Default)]
pub struct Remove;

impl Merger for Remove {
    fn merge(&self, _existing: Option<&Value>) -> Result<MergeOutcome, IpTreeError> {
        Ok(MergeOutcome::Remove)
    }
}

/// Union the keys of the old and new maps; on a key collision the new
/// value wins. Nested maps are not merged.
#[derive(Debug, Clone)]
pub struct TopLevelMerge {
    value: Value,
    on_mismatch: MismatchPolicy,
}

impl TopLevelMerge {
    /// Merge `value` into existing maps, replacing non-map values
    pub fn new(value: Value) -> Self {
        Self {
            value,
            on_mismatch: MismatchPolicy::Replace,
        }
    }

    /// Fail instead of replacing when either side is not a map
    pub fn strict(mut self) -> Self {
        self.on_mismatch = MismatchPolicy::Error;
        self
    }
}

impl Merger for TopLevelMerge {
    fn merge(&self, existing: Option<&Value>) -> Result<MergeOutcome, IpTreeError> {
        let (old, new) = match maps_of(existing, &self.value, self.on_mismatch, "top-level")? {
            Some(pair) => pair,
            None => return Ok(MergeOutcome::Store(self.value.clone())),
        };
        let mut merged = old.clone();
        for (key, value) in new {
            merged.insert(key.clone(), value.clone());
        }
        Ok(MergeOutcome::Store(Value::Map(merged)))
    }
}

/// Union keys recursively through nested maps; wherever both sides are not
/// maps the new value wins (slices are replaced, not concatenated).
#[derive(Debug, Clone)]
pub struct DeepMerge {
    value: Value,
    on_mismatch: MismatchPolicy,
}

impl DeepMerge {
    /// Deep-merge `value` into existing maps, replacing non-map values
    pub fn new(value: Value) -> Self {
        Self {
            value,
            on_mismatch: MismatchPolicy::Replace,
        }
    }

    /// Fail instead of replacing when the top-level values are not maps
    pub fn strict(mut self) -> Self {
        self.on_mismatch = MismatchPolicy::Error;
        self
    }
}

impl Merger for DeepMerge {
    fn merge(&self, existing: Option<&Value>) -> Result<MergeOutcome, IpTreeError> {
        let (old, new) = match maps_of(existing, &self.value, self.on_mismatch, "deep")? {
            Some(pair) => pair,
            None => return Ok(MergeOutcome::Store(self.value.clone())),
        };
        Ok(MergeOutcome::Store(Value::Map(deep_merge_maps(old, new))))
    }
}

fn deep_merge_maps(
    old: &BTreeMap<String, Value>,
    new: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut merged = old.clone();
    for (key, value) in new {
        let combined = match (merged.get(key), value) {
            (Some(Value::Map(o)), Value::Map(n)) => Value::Map(deep_merge_maps(o, n)),
            _ => value.clone(),
        };
        merged.insert(key.clone(), combined);
    }
    merged
}

/// Both sides as maps, or `None` when the new value should simply be
/// stored. Errors under [`MismatchPolicy::Error`].
fn maps_of<'a>(
    existing: Option<&'a Value>,
    new: &'a Value,
    policy: MismatchPolicy,
    strategy: &str,
) -> Result<Option<(&'a BTreeMap<String, Value>, &'a BTreeMap<String, Value>)>, IpTreeError> {
    let existing = match existing {
        Some(v) => v,
        None => return Ok(None),
    };
    match (existing, new) {
        (Value::Map(o), Value::Map(n)) => Ok(Some((o, n))),
        (o, n) => match policy {
            MismatchPolicy::Replace => Ok(None),
            MismatchPolicy::Error => Err(IpTreeError::TypeMismatch(format!(
                "{} merge needs two maps, found existing {} and new {}",
                strategy,
                o.type_name(),
                n.type_name()
            ))),
        },
    }
}
