pub mod auth;
pub mod database;
pub mod local_mirror;
pub mod memory_store;
pub mod remote_store;
pub mod sqlite_store;
pub mod storage;

pub use auth::{AuthProvider, LocalAuthProvider};
pub use local_mirror::{ExternalChangeSubscription, LocalMirrorStore};
pub use memory_store::InMemoryDocumentStore;
pub use remote_store::{DocumentSnapshot, DocumentSubscription, RemoteDocumentStore};
pub use sqlite_store::SqliteDocumentStore;
pub use storage::{DisabledStorage, FileStorage, MemoryStorage, StorageBackend};
