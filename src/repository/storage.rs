use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::StorageError;

const CHANGE_FEED_CAPACITY: usize = 256;

/// A change committed to a storage backend, tagged with the store instance
/// that made it so that instance can ignore its own echo.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub key: String,
    /// `None` when the entry was removed.
    pub value: Option<String>,
    pub writer: Uuid,
}

/// Synchronous string key-value storage on the device.
///
/// Several mirror stores may share one backend, standing in for several
/// windows over the same on-device storage; `changes` lets each of them see
/// what the others wrote.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str, writer: Uuid) -> Result<(), StorageError>;

    fn remove(&self, key: &str, writer: Uuid) -> Result<(), StorageError>;

    fn changes(&self) -> broadcast::Receiver<StorageEvent>;
}

/// Process-memory storage with an optional byte quota.
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
    feed: broadcast::Sender<StorageEvent>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_quota(None)
    }

    pub fn with_quota(quota_bytes: Option<usize>) -> Self {
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes,
            feed,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Writes a raw entry without going through a mirror store, the way a
    /// corrupted or foreign entry would appear.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str, writer: Uuid) -> Result<(), StorageError> {
        {
            let mut entries = self.entries.lock();
            if let Some(limit) = self.quota_bytes {
                let others: usize = entries
                    .iter()
                    .filter(|(k, _)| k.as_str() != key)
                    .map(|(k, v)| k.len() + v.len())
                    .sum();
                let requested = others + key.len() + value.len();
                if requested > limit {
                    return Err(StorageError::QuotaExceeded { limit, requested });
                }
            }
            entries.insert(key.to_string(), value.to_string());
        }

        // No receivers is fine.
        let _ = self.feed.send(StorageEvent {
            key: key.to_string(),
            value: Some(value.to_string()),
            writer,
        });
        Ok(())
    }

    fn remove(&self, key: &str, writer: Uuid) -> Result<(), StorageError> {
        let removed = self.entries.lock().remove(key).is_some();
        if removed {
            let _ = self.feed.send(StorageEvent {
                key: key.to_string(),
                value: None,
                writer,
            });
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StorageEvent> {
        self.feed.subscribe()
    }
}

/// One JSON file per key inside a directory.
///
/// Change notifications only reach stores in this process that share the
/// same `FileStorage` value.
pub struct FileStorage {
    dir: PathBuf,
    feed: broadcast::Sender<StorageEvent>,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self { dir, feed })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_file_name(key)))
    }
}

/// Keeps file names portable: anything outside `[A-Za-z0-9_.-]` is
/// percent-encoded.
fn encode_file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' => out.push(byte as char),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

impl StorageBackend for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.file_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str, writer: Uuid) -> Result<(), StorageError> {
        let path = self.file_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })?;
        debug!(key = %key, path = %path.display(), "Stored local entry");

        let _ = self.feed.send(StorageEvent {
            key: key.to_string(),
            value: Some(value.to_string()),
            writer,
        });
        Ok(())
    }

    fn remove(&self, key: &str, writer: Uuid) -> Result<(), StorageError> {
        match std::fs::remove_file(self.file_for(key)) {
            Ok(()) => {
                let _ = self.feed.send(StorageEvent {
                    key: key.to_string(),
                    value: None,
                    writer,
                });
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn changes(&self) -> broadcast::Receiver<StorageEvent> {
        self.feed.subscribe()
    }
}

/// Storage that the runtime environment has switched off.
pub struct DisabledStorage {
    feed: broadcast::Sender<StorageEvent>,
}

impl DisabledStorage {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(1);
        Self { feed }
    }

    fn unavailable() -> StorageError {
        StorageError::Unavailable {
            reason: "storage disabled".to_string(),
        }
    }
}

impl Default for DisabledStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for DisabledStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(Self::unavailable())
    }

    fn set(&self, _key: &str, _value: &str, _writer: Uuid) -> Result<(), StorageError> {
        Err(Self::unavailable())
    }

    fn remove(&self, _key: &str, _writer: Uuid) -> Result<(), StorageError> {
        Err(Self::unavailable())
    }

    fn changes(&self) -> broadcast::Receiver<StorageEvent> {
        self.feed.subscribe()
    }
}
