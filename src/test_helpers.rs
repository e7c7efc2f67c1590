// Test helpers for integration testing

use std::sync::Arc;

use crate::domain::data_set::{DataSetName, DocumentPath};
use crate::domain::user::UserId;
use crate::repository::local_mirror::LocalMirrorStore;
use crate::repository::memory_store::InMemoryDocumentStore;
use crate::repository::storage::{MemoryStorage, StorageBackend};
use crate::services::sync_channel::{SyncChannel, SyncTimings};
use crate::services::write_governor::{GovernorPolicy, WriteGovernor};

pub struct TestContext {
    pub store: Arc<InMemoryDocumentStore>,
    pub governor: WriteGovernor,
    pub channel: SyncChannel,
    pub storage: Arc<MemoryStorage>,
    pub mirror: LocalMirrorStore,
    pub user: UserId,
}

impl TestContext {
    pub fn new_for_test() -> Self {
        Self::with_settings(SyncTimings::default(), GovernorPolicy::default())
    }

    pub fn with_settings(timings: SyncTimings, policy: GovernorPolicy) -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let governor = WriteGovernor::new(policy);
        let channel = SyncChannel::new(store.clone(), governor.clone(), timings);
        let storage = Arc::new(MemoryStorage::new());
        let mirror = LocalMirrorStore::new("tally", storage.clone());
        Self {
            store,
            governor,
            channel,
            storage,
            mirror,
            user: UserId::new("test-user").expect("valid test user id"),
        }
    }

    /// A second local mirror over the same storage, like another window.
    pub fn other_window(&self) -> LocalMirrorStore {
        let backend: Arc<dyn StorageBackend> = self.storage.clone();
        LocalMirrorStore::new("tally", backend)
    }

    pub fn path(&self, data_set: &str) -> DocumentPath {
        DocumentPath::new(&self.user, &DataSetName::new(data_set).expect("valid data set"))
    }

    pub fn data_set(&self, name: &str) -> DataSetName {
        DataSetName::new(name).expect("valid data set")
    }
}

/// Lets spawned sync tasks run to their next await point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
