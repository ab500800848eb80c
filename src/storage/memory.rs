//! In-memory storage implementation
//!
//! Same contract as the SQLite store. Collections are keyed by database path
//! and graph name so that switching either selects a separate collection.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use serde_json::Value;
use crate::{Error, Result};
use super::backend::{
    BackingStore, PropertyFilter, Record, RecursionDepth, DEFAULT_GRAPH, DEFAULT_MAX_HOPS, expand_references,
};

type Collection = BTreeMap<String, Record>;

#[derive(Debug)]
pub struct MemoryStore {
    collections: HashMap<(PathBuf, String), Collection>,
    path: PathBuf,
    graph: String,
    max_hops: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: HashMap::new(),
            path: PathBuf::new(),
            graph: DEFAULT_GRAPH.to_string(),
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    fn collection(&self) -> Option<&Collection> {
        self.collections.get(&(self.path.clone(), self.graph.clone()))
    }

    fn load_document(&self, uri: &str) -> Option<Value> {
        self.collection().and_then(|c| c.get(uri)).map(|r| r.document.clone())
    }

    /// Number of records in the working collection
    pub fn len(&self) -> usize {
        self.collection().map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every record in the working collection, ordered by URI
    #[cfg(test)]
    pub(crate) fn records(&self) -> Vec<Record> {
        self.collection().map(|c| c.values().cloned().collect()).unwrap_or_default()
    }
}

impl BackingStore for MemoryStore {
    fn find(&self, type_name: &str, filter: &PropertyFilter, depth: RecursionDepth) -> Result<Vec<Record>> {
        let Some(collection) = self.collection() else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for record in collection.values() {
            if record.type_name != type_name || !filter.matches(&record.properties) {
                continue;
            }
            let mut record = record.clone();
            let mut path = vec![record.uri.clone()];
            expand_references(&mut record.document, depth, self.max_hops, &mut path, &mut |uri: &str| {
                Ok(self.load_document(uri))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn get(&self, uri: &str) -> Result<Record> {
        self.collection()
            .and_then(|c| c.get(uri))
            .cloned()
            .ok_or_else(|| Error::RecordNotFound(uri.to_string()))
    }

    fn commit(&mut self, records: &[Record]) -> Result<()> {
        // nothing below can fail, so the batch lands whole
        let collection = self
            .collections
            .entry((self.path.clone(), self.graph.clone()))
            .or_default();
        for record in records {
            collection.insert(record.uri.clone(), record.clone());
        }
        tracing::info!("Committed {} records to graph '{}'", records.len(), self.graph);
        Ok(())
    }

    fn set_working_graph(&mut self, name: &str) {
        self.graph = name.to_string();
    }

    fn set_working_db_path(&mut self, path: &Path) -> Result<()> {
        self.path = path.to_path_buf();
        Ok(())
    }

    fn working_graph(&self) -> &str {
        &self.graph
    }

    fn set_max_hops(&mut self, max_hops: usize) {
        self.max_hops = max_hops;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(uri: &str, document: Value) -> Record {
        Record {
            uri: uri.to_string(),
            type_name: "ComponentModel".to_string(),
            properties: [("uri".to_string(), uri.to_string())].into_iter().collect(),
            document,
        }
    }

    #[test]
    fn test_commit_find_get() {
        let mut store = MemoryStore::new();
        store
            .commit(&[
                record("b", json!({ "uri": "b", "n": 2 })),
                record("a", json!({ "uri": "a", "part": { "uri": "b" } })),
            ])
            .unwrap();

        assert_eq!(store.len(), 2);
        let all = store.find("ComponentModel", &PropertyFilter::new(), RecursionDepth::Unlimited).unwrap();
        assert_eq!(all[0].uri, "a");
        assert_eq!(all[0].document["part"]["n"], 2);

        let shallow = store
            .find("ComponentModel", &PropertyFilter::new().with("uri", "a"), RecursionDepth::Limited(0))
            .unwrap();
        assert_eq!(shallow[0].document["part"], json!({ "uri": "b" }));
        assert!(matches!(store.get("zzz"), Err(Error::RecordNotFound(_))));
    }

    #[test]
    fn test_long_chain_fails_at_hop_bound() {
        let mut store = MemoryStore::new();
        let chain: Vec<Record> = (0..8)
            .map(|i| record(&format!("n{}", i), json!({ "uri": format!("n{}", i), "next": { "uri": format!("n{}", i + 1) } })))
            .collect();
        store.commit(&chain).unwrap();
        store.set_max_hops(4);

        let filter = PropertyFilter::new().with("uri", "n0");
        let err = store.find("ComponentModel", &filter, RecursionDepth::Unlimited).unwrap_err();
        assert!(matches!(err, Error::ReferenceCycleExceeded { limit: 4, .. }));

        // the last hop points at a record that does not exist
        store.set_max_hops(8);
        let found = store.find("ComponentModel", &filter, RecursionDepth::Unlimited).unwrap();
        assert_eq!(found[0].document["next"]["next"]["uri"], "n2");
    }

    #[test]
    fn test_graph_and_path_select_collections() {
        let mut store = MemoryStore::new();
        store.commit(&[record("a", json!({}))]).unwrap();

        store.set_working_graph("other");
        assert!(store.is_empty());
        store.set_working_graph(DEFAULT_GRAPH);
        assert_eq!(store.len(), 1);

        store.set_working_db_path(Path::new("/tmp/elsewhere")).unwrap();
        assert!(store.is_empty());
        assert!(store.get("a").is_err());
    }
}
