use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::data_set::DocumentPath;
use crate::error::RemoteError;

/// State of one remote document as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentSnapshot {
    pub data: Option<Map<String, Value>>,
}

impl DocumentSnapshot {
    pub fn missing() -> Self {
        Self { data: None }
    }

    pub fn with_data(data: Map<String, Value>) -> Self {
        Self { data: Some(data) }
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(name))
    }
}

pub type SnapshotResult = Result<DocumentSnapshot, RemoteError>;

/// A live subscription to one document. The first item is the document's
/// state at subscription time; every later change follows in order.
/// Dropping it unsubscribes.
pub struct DocumentSubscription {
    receiver: mpsc::UnboundedReceiver<SnapshotResult>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl DocumentSubscription {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<SnapshotResult>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Resolves to `None` once the store closes the subscription.
    pub async fn next(&mut self) -> Option<SnapshotResult> {
        self.receiver.recv().await
    }
}

impl Drop for DocumentSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for DocumentSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSubscription").finish_non_exhaustive()
    }
}

/// The per-user cloud document store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    fn subscribe(&self, path: &DocumentPath) -> DocumentSubscription;

    /// Overwrites the top-level fields present in `partial`, creating the
    /// document when needed. Fields not mentioned are kept.
    async fn merge_write(
        &self,
        path: &DocumentPath,
        partial: Map<String, Value>,
    ) -> Result<(), RemoteError>;
}

pub(crate) fn merge_fields(target: &mut Map<String, Value>, partial: Map<String, Value>) {
    for (field, value) in partial {
        target.insert(field, value);
    }
}

/// Sender half of a subscription that has not been registered yet.
pub(crate) struct PendingSubscriber {
    id: u64,
    path: DocumentPath,
    sender: mpsc::UnboundedSender<SnapshotResult>,
}

impl PendingSubscriber {
    pub(crate) fn send(&self, snapshot: SnapshotResult) {
        let _ = self.sender.send(snapshot);
    }
}

/// Fan-out of document changes to subscribers, shared by the store
/// implementations.
#[derive(Default)]
pub(crate) struct SubscriberHub {
    next_id: Mutex<u64>,
    subscribers: Mutex<HashMap<DocumentPath, Vec<(u64, mpsc::UnboundedSender<SnapshotResult>)>>>,
}

impl SubscriberHub {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates the channel for a subscription. Changes are only delivered
    /// after [`SubscriberHub::register`], which lets the store send the
    /// initial snapshot first.
    pub(crate) fn open(self: &Arc<Self>, path: &DocumentPath) -> (PendingSubscriber, DocumentSubscription) {
        let id = {
            let mut next_id = self.next_id.lock();
            *next_id += 1;
            *next_id
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        let hub = Arc::downgrade(self);
        let unsubscribe_path = path.clone();
        let subscription = DocumentSubscription::new(receiver, move || {
            if let Some(hub) = hub.upgrade() {
                hub.remove(&unsubscribe_path, id);
            }
        });
        (
            PendingSubscriber {
                id,
                path: path.clone(),
                sender,
            },
            subscription,
        )
    }

    pub(crate) fn register(&self, pending: PendingSubscriber) {
        // Already dropped by the subscriber.
        if pending.sender.is_closed() {
            return;
        }
        self.subscribers
            .lock()
            .entry(pending.path)
            .or_default()
            .push((pending.id, pending.sender));
    }

    fn remove(&self, path: &DocumentPath, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if let Some(list) = subscribers.get_mut(path) {
            list.retain(|(existing, _)| *existing != id);
            if list.is_empty() {
                subscribers.remove(path);
            }
        }
    }

    pub(crate) fn notify(&self, path: &DocumentPath, snapshot: &DocumentSnapshot) {
        if let Some(list) = self.subscribers.lock().get_mut(path) {
            list.retain(|(_, sender)| sender.send(Ok(snapshot.clone())).is_ok());
        }
    }

    pub(crate) fn notify_error(&self, path: &DocumentPath, message: &str) {
        if let Some(list) = self.subscribers.lock().get_mut(path) {
            list.retain(|(_, sender)| {
                sender
                    .send(Err(RemoteError::Unavailable {
                        message: message.to_string(),
                    }))
                    .is_ok()
            });
        }
    }

    pub(crate) fn active(&self, path: &DocumentPath) -> usize {
        self.subscribers.lock().get(path).map(Vec::len).unwrap_or(0)
    }
}
