use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::data_set::DocumentPath;
use crate::error::RemoteError;
use crate::repository::remote_store::{
    merge_fields, DocumentSnapshot, DocumentSubscription, RemoteDocumentStore, SubscriberHub,
};

/// A write the store accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub path: DocumentPath,
    pub partial: Map<String, Value>,
    pub at: Instant,
}

/// Remote document store kept in process memory.
///
/// Behaves like the cloud store as seen by one client: every accepted write
/// is echoed to all subscribers of the document, including the writer's
/// own. Writes can be made to fail and remote-side changes can be pushed,
/// which is what the sync tests drive it with.
pub struct InMemoryDocumentStore {
    documents: Mutex<HashMap<DocumentPath, Map<String, Value>>>,
    hub: Arc<SubscriberHub>,
    writes: Mutex<Vec<WriteRecord>>,
    failure: Mutex<Option<String>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            hub: SubscriberHub::new(),
            writes: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    pub fn document(&self, path: &DocumentPath) -> Option<Map<String, Value>> {
        self.documents.lock().get(path).cloned()
    }

    /// The `value` field of a document, the only field the sync layer uses.
    pub fn value_at(&self, path: &DocumentPath) -> Option<Value> {
        self.documents
            .lock()
            .get(path)
            .and_then(|doc| doc.get("value").cloned())
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.writes.lock().clone()
    }

    pub fn writes_to(&self, path: &DocumentPath) -> Vec<WriteRecord> {
        self.writes
            .lock()
            .iter()
            .filter(|write| &write.path == path)
            .cloned()
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    /// Rejects every following write until [`Self::clear_failure`].
    pub fn fail_writes_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    /// Replaces a document as if another device had written it.
    pub fn push_remote(&self, path: &DocumentPath, data: Map<String, Value>) {
        let mut documents = self.documents.lock();
        documents.insert(path.clone(), data.clone());
        self.hub.notify(path, &DocumentSnapshot::with_data(data));
    }

    pub fn delete_document(&self, path: &DocumentPath) {
        let mut documents = self.documents.lock();
        if documents.remove(path).is_some() {
            self.hub.notify(path, &DocumentSnapshot::missing());
        }
    }

    /// Delivers a subscription error to everyone watching `path`.
    pub fn fail_subscriptions(&self, path: &DocumentPath, message: &str) {
        self.hub.notify_error(path, message);
    }

    pub fn active_subscriptions(&self, path: &DocumentPath) -> usize {
        self.hub.active(path)
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteDocumentStore for InMemoryDocumentStore {
    fn subscribe(&self, path: &DocumentPath) -> DocumentSubscription {
        // Holding the document lock keeps the initial snapshot and
        // registration atomic with respect to writes.
        let documents = self.documents.lock();
        let (pending, subscription) = self.hub.open(path);
        let snapshot = match documents.get(path) {
            Some(data) => DocumentSnapshot::with_data(data.clone()),
            None => DocumentSnapshot::missing(),
        };
        pending.send(Ok(snapshot));
        self.hub.register(pending);
        subscription
    }

    async fn merge_write(
        &self,
        path: &DocumentPath,
        partial: Map<String, Value>,
    ) -> Result<(), RemoteError> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(RemoteError::Rejected {
                path: path.clone(),
                reason,
            });
        }

        let mut documents = self.documents.lock();
        let document = documents.entry(path.clone()).or_default();
        merge_fields(document, partial.clone());
        let snapshot = DocumentSnapshot::with_data(document.clone());

        self.writes.lock().push(WriteRecord {
            path: path.clone(),
            partial,
            at: Instant::now(),
        });
        debug!(path = %path, "Document written");
        self.hub.notify(path, &snapshot);
        Ok(())
    }
}
