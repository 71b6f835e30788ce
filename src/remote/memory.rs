use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{matches_all, Document, DocumentStore, Fields, Filter, RemoteError};

/// Kind of remote operation, for the call log and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Query,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub operation: Operation,
    pub collection: String,
    pub id: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, Vec<Document>>,
    calls: Vec<Call>,
    faults: HashMap<Operation, Vec<RemoteError>>,
}

/// In-process document store.
///
/// Records every call and can be told to fail upcoming operations, which
/// makes it the backend of choice for exercising store behavior.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<Inner>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a document directly, bypassing the call log.
    pub fn seed(&self, collection: &str, fields: serde_json::Value) -> String {
        let id = new_id();
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(Document::new(id.clone(), fields));
        id
    }

    /// Make the next `operation` fail with `error`. Queued faults are
    /// consumed in order.
    pub fn fail_next(&self, operation: Operation, error: RemoteError) {
        self.lock().faults.entry(operation).or_default().push(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id).cloned())
    }

    /// Log the call and return the queued fault, if any.
    fn record(
        &self,
        operation: Operation,
        collection: &str,
        id: Option<&str>,
    ) -> Result<MutexGuard<'_, Inner>, RemoteError> {
        let mut inner = self.lock();
        inner.calls.push(Call {
            operation,
            collection: collection.to_string(),
            id: id.map(str::to_string),
        });
        if let Some(queue) = inner.faults.get_mut(&operation) {
            if !queue.is_empty() {
                return Err(queue.remove(0));
            }
        }
        Ok(inner)
    }
}

fn new_id() -> String {
    // Same length as hosted auto-ids.
    Uuid::new_v4().simple().to_string()[..20].to_string()
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: &str, fields: Fields) -> Result<String, RemoteError> {
        let mut inner = self.record(Operation::Insert, collection, None)?;
        let id = new_id();
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(Document {
                id: id.clone(),
                fields,
            });
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), RemoteError> {
        let mut inner = self.record(Operation::Update, collection, Some(id))?;
        let doc = inner
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| RemoteError::not_found(collection, id))?;
        doc.fields.extend(fields);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        let mut inner = self.record(Operation::Delete, collection, Some(id))?;
        if let Some(docs) = inner.collections.get_mut(collection) {
            docs.retain(|d| d.id != id);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        filters: &[Filter],
    ) -> Result<Vec<Document>, RemoteError> {
        let inner = self.record(Operation::Query, collection, None)?;
        Ok(inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| matches_all(filters, &d.fields))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
