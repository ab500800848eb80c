//! Storage Layer - backing stores for model records
//!
//! System of record is SQLite with tables:
//! - records(graph, uri, type_name, document)
//! - record_properties(graph, uri, key, value)
//!
//! An in-memory store with the same contract is provided for tests and
//! embedding.

pub mod backend;
pub mod schema;
pub mod sqlite;
pub mod memory;

pub use backend::{BackingStore, PropertyFilter, Record, RecursionDepth, DEFAULT_GRAPH, DEFAULT_MAX_HOPS};
pub use sqlite::{SqliteStore, StoreStats};
pub use memory::MemoryStore;
