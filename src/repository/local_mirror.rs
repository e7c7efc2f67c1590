use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::data_set::DataSetName;
use crate::domain::user::{UserId, ANONYMOUS};
use crate::repository::storage::StorageBackend;

/// Synchronous, never-failing access to device-local values, namespaced by
/// user and data-set name.
///
/// Clones share one identity: a clone's writes are "own" writes and are
/// not reported back through [`LocalMirrorStore::subscribe_external_changes`].
#[derive(Clone)]
pub struct LocalMirrorStore {
    namespace: String,
    backend: Arc<dyn StorageBackend>,
    instance_id: Uuid,
}

impl LocalMirrorStore {
    pub fn new(namespace: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            namespace: namespace.into(),
            backend,
            instance_id: Uuid::new_v4(),
        }
    }

    /// `{namespace}_{user or "anon"}_{name}`
    pub fn key(&self, user: Option<&UserId>, name: &DataSetName) -> String {
        format!("{}{}", self.user_prefix(user), name)
    }

    fn user_prefix(&self, user: Option<&UserId>) -> String {
        format!(
            "{}_{}_",
            self.namespace,
            user.map(UserId::as_str).unwrap_or(ANONYMOUS)
        )
    }

    pub fn read<T: DeserializeOwned>(&self, user: Option<&UserId>, name: &DataSetName, initial: T) -> T {
        let key = self.key(user, name);
        let raw = match self.backend.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return initial,
            Err(e) => {
                warn!(key = %key, error = %e, "Local storage read failed, using initial value");
                return initial;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Malformed local entry, using initial value");
                initial
            }
        }
    }

    pub fn write<T: Serialize>(&self, user: Option<&UserId>, name: &DataSetName, value: &T) {
        let key = self.key(user, name);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Could not serialize local entry");
                return;
            }
        };

        if let Err(e) = self.backend.set(&key, &raw, self.instance_id) {
            warn!(key = %key, error = %e, "Local storage write failed");
        }
    }

    pub fn remove(&self, user: Option<&UserId>, name: &DataSetName) {
        let key = self.key(user, name);
        if let Err(e) = self.backend.remove(&key, self.instance_id) {
            warn!(key = %key, error = %e, "Local storage remove failed");
        }
    }

    /// Calls `callback(name, new_value)` whenever another store instance
    /// changes one of `user`'s entries. `new_value` is `None` on removal.
    /// Entries that are not valid JSON are logged and skipped.
    ///
    /// The listener runs on the current tokio runtime until the returned
    /// guard is dropped.
    pub fn subscribe_external_changes<F>(
        &self,
        user: Option<&UserId>,
        mut callback: F,
    ) -> ExternalChangeSubscription
    where
        F: FnMut(&DataSetName, Option<serde_json::Value>) + Send + 'static,
    {
        let prefix = self.user_prefix(user);
        let own_id = self.instance_id;
        let mut changes = self.backend.changes();

        let handle = tokio::spawn(async move {
            loop {
                let event = match changes.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "External change listener fell behind");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if event.writer == own_id {
                    continue;
                }
                let Some(name) = event.key.strip_prefix(&prefix) else {
                    continue;
                };
                let Ok(name) = DataSetName::new(name) else {
                    continue;
                };

                let value = match event.value.as_deref().map(serde_json::from_str::<serde_json::Value>) {
                    None => None,
                    Some(Ok(value)) => Some(value),
                    Some(Err(e)) => {
                        warn!(key = %event.key, error = %e, "Ignoring malformed external change");
                        continue;
                    }
                };

                debug!(data_set = %name, "External local change");
                callback(&name, value);
            }
        });

        ExternalChangeSubscription { handle }
    }
}

/// Keeps an external-change listener alive; dropping it unregisters.
pub struct ExternalChangeSubscription {
    handle: JoinHandle<()>,
}

impl Drop for ExternalChangeSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
