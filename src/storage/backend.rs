//! Backing store contract shared by all storage implementations

use std::collections::BTreeMap;
use std::path::Path;
use serde_json::Value;
use crate::{Error, Result};

/// Graph selected when no working graph has been configured
pub const DEFAULT_GRAPH: &str = "default";

/// Default bound on the length of a reference chain, shared by store-side
/// expansion and the resolver
pub const DEFAULT_MAX_HOPS: usize = 64;

/// A stored record.
///
/// `properties` is the flat map used for filtering; `document` is the full
/// JSON body, in which reference nodes (`{"uri": ...}`) point at other
/// records.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub uri: String,
    pub type_name: String,
    pub properties: BTreeMap<String, String>,
    pub document: Value,
}

/// Exact-match property filter. Keys not present are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyFilter(BTreeMap<String, String>);

impl PropertyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Whether a record's properties satisfy every constraint
    pub fn matches(&self, properties: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(k, v)| properties.get(k) == Some(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for PropertyFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pairs: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", pairs.join(", "))
    }
}

/// How many levels of reference nodes `find` expands inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecursionDepth {
    /// Expand every reachable reference, within the store's hop bound
    Unlimited,
    /// Expand at most this many levels; `Limited(0)` leaves references as-is
    Limited(u32),
}

impl RecursionDepth {
    /// Depth remaining after expanding one level, `None` when exhausted
    fn descend(self) -> Option<Self> {
        match self {
            RecursionDepth::Unlimited => Some(RecursionDepth::Unlimited),
            RecursionDepth::Limited(0) => None,
            RecursionDepth::Limited(n) => Some(RecursionDepth::Limited(n - 1)),
        }
    }
}

/// Uniform query/write interface over a persistent record collection.
///
/// Implementations are configured per instance: the working graph and the
/// database path select which collection subsequent calls target.
pub trait BackingStore {
    /// All records of `type_name` matching `filter`, ordered by URI, with
    /// reference nodes expanded up to `depth`.
    fn find(&self, type_name: &str, filter: &PropertyFilter, depth: RecursionDepth) -> Result<Vec<Record>>;

    /// Point lookup by URI, failing with `RecordNotFound`
    fn get(&self, uri: &str) -> Result<Record>;

    /// Write all records as one atomic unit
    fn commit(&mut self, records: &[Record]) -> Result<()>;

    fn set_working_graph(&mut self, name: &str);

    fn set_working_db_path(&mut self, path: &Path) -> Result<()>;

    fn working_graph(&self) -> &str;

    /// Longest reference chain an expansion may follow before failing with
    /// `ReferenceCycleExceeded`
    fn set_max_hops(&mut self, max_hops: usize);
}

/// If `value` is a reference node, its target URI
pub fn reference_target(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get("uri").and_then(Value::as_str),
        _ => None,
    }
}

/// Replace reference nodes inside `document` with the documents they point
/// at, up to `depth` levels.
///
/// `path` holds the URIs being expanded above this point; a reference back
/// into it stays a reference. A reference reached through more than
/// `max_hops` expansions fails with `ReferenceCycleExceeded`. References
/// whose target `load` cannot find are left in place.
pub fn expand_references<F>(
    document: &mut Value,
    depth: RecursionDepth,
    max_hops: usize,
    path: &mut Vec<String>,
    load: &mut F,
) -> Result<()>
where
    F: FnMut(&str) -> Result<Option<Value>>,
{
    if let Some(target) = reference_target(document) {
        let Some(next) = depth.descend() else {
            return Ok(());
        };
        if path.iter().any(|p| p == target) {
            return Ok(());
        }
        if path.len() > max_hops {
            return Err(Error::ReferenceCycleExceeded {
                uri: target.to_string(),
                limit: max_hops,
            });
        }
        let target = target.to_string();
        match load(&target)? {
            Some(mut resolved) => {
                path.push(target);
                expand_references(&mut resolved, next, max_hops, path, load)?;
                path.pop();
                *document = resolved;
            }
            None => tracing::warn!("Reference {} has no stored record; left unexpanded", target),
        }
        return Ok(());
    }

    match document {
        Value::Object(map) => {
            for child in map.values_mut() {
                expand_references(child, depth, max_hops, path, load)?;
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                expand_references(child, depth, max_hops, path, load)?;
            }
        }
        _ => {}
    }
    Ok(())
}
