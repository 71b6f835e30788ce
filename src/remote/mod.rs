//! Remote document store abstraction.
//!
//! Documents live in named collections and are addressed by a store-assigned
//! string id. The store only needs four operations: insert (returning the
//! new id), update by id (merging the given fields), delete by id, and query
//! with a conjunction of equality filters.
//!
//! Implementations:
//! - `MemoryDocumentStore` - in-process, for tests and offline use
//! - `SqliteDocumentStore` - JSON documents in a local SQLite database
//! - `FirestoreStore` - the hosted Firestore REST API

mod firestore;
mod memory;
mod sqlite;

pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::{Call, MemoryDocumentStore, Operation};
pub use sqlite::SqliteDocumentStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Collection holding places.
pub const PLACES_COLLECTION: &str = "lieux";
/// Collection holding tags.
pub const TAGS_COLLECTION: &str = "tags";

/// Field map of a document.
pub type Fields = serde_json::Map<String, Value>;

/// A stored document: its id plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    /// Build a document from a JSON value. Non-object values yield no fields.
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Equality filter on a single top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

/// True if every filter matches.
pub fn matches_all(filters: &[Filter], fields: &Fields) -> bool {
    filters.iter().all(|f| f.matches(fields))
}

/// Errors reported by a remote document store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        RemoteError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, RemoteError::PermissionDenied(_))
    }
}

/// A network-reachable document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document and return its assigned id.
    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, RemoteError>;

    /// Merge `fields` into an existing document. Fails with `NotFound` if the
    /// document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), RemoteError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError>;

    /// All documents in `collection` matching every filter.
    async fn query(&self, collection: &str, filters: &[Filter])
        -> Result<Vec<Document>, RemoteError>;
}
