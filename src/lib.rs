//! # cmstore - Component Model Store
//!
//! Persistence and retrieval of versioned component models identified by a
//! (domain, name, version) triple.
//!
//! cmstore provides:
//! - Deterministic model URIs used as reference keys between models
//! - A static property schema shared by validation and editors
//! - A backing store abstraction with SQLite and in-memory implementations
//! - A reference resolver that materializes referenced sub-models
//! - A repository API: list, versions, fetch, store

pub mod uri;
pub mod property;
pub mod model;
pub mod storage;
pub mod resolver;
pub mod repository;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use uri::ModelUri;
pub use property::{PropertyDecl, PropertySchema};
pub use model::{ComponentModel, ModelUnit, ModelVersion, SubModel};
pub use storage::{BackingStore, MemoryStore, PropertyFilter, Record, RecursionDepth, SqliteStore};
pub use resolver::{ModelLookup, ReferenceResolver, ResolvedTree};
pub use repository::{ModelRepository, ModelSummary};

/// Result type alias for cmstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cmstore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Invalid property '{name}': {reason}")]
    InvalidProperty { name: String, reason: String },

    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    #[error("Ambiguous reference: {uri} matched {matches} records")]
    AmbiguousReference { uri: String, matches: usize },

    #[error("Reference chain exceeded {limit} hops at {uri}")]
    ReferenceCycleExceeded { uri: String, limit: usize },

    #[error("Store failure: {0}")]
    StoreFailure(#[source] Box<Error>),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for an `InvalidProperty` error
    pub fn invalid_property(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidProperty {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
