use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::data_set::DocumentPath;
use crate::error::RemoteError;
use crate::repository::remote_store::{
    merge_fields, DocumentSnapshot, DocumentSubscription, RemoteDocumentStore, SubscriberHub,
};

/// Document store on a local SQLite file: the all-local fallback when no
/// cloud store is configured.
///
/// Subscribers are notified in-process after each committed write. Writes
/// and initial subscription reads are serialized so a subscriber never sees
/// an older snapshot after a newer one.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    hub: Arc<SubscriberHub>,
    sequencer: Arc<Mutex<()>>,
}

impl SqliteDocumentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            hub: SubscriberHub::new(),
            sequencer: Arc::new(Mutex::new(())),
        }
    }

    pub async fn get(&self, path: &DocumentPath) -> Result<DocumentSnapshot, RemoteError> {
        fetch(&self.pool, path).await
    }
}

async fn fetch(pool: &SqlitePool, path: &DocumentPath) -> Result<DocumentSnapshot, RemoteError> {
    let row = sqlx::query("SELECT data FROM documents WHERE path = ?")
        .bind(path.as_str())
        .fetch_optional(pool)
        .await
        .map_err(|source| RemoteError::Database {
            operation: format!("read {}", path),
            source,
        })?;

    let Some(row) = row else {
        return Ok(DocumentSnapshot::missing());
    };

    match serde_json::from_str::<Value>(row.get("data"))? {
        Value::Object(data) => Ok(DocumentSnapshot::with_data(data)),
        _ => Err(RemoteError::MalformedDocument { path: path.clone() }),
    }
}

#[async_trait]
impl RemoteDocumentStore for SqliteDocumentStore {
    fn subscribe(&self, path: &DocumentPath) -> DocumentSubscription {
        let (pending, subscription) = self.hub.open(path);
        let pool = self.pool.clone();
        let hub = self.hub.clone();
        let sequencer = self.sequencer.clone();
        let path = path.clone();

        tokio::spawn(async move {
            let _turn = sequencer.lock().await;
            let initial = fetch(&pool, &path).await;
            if let Err(e) = &initial {
                warn!(path = %path, error = %e, "Initial document read failed");
            }
            pending.send(initial);
            hub.register(pending);
        });

        subscription
    }

    async fn merge_write(
        &self,
        path: &DocumentPath,
        partial: Map<String, Value>,
    ) -> Result<(), RemoteError> {
        let _turn = self.sequencer.lock().await;

        let mut document = match fetch(&self.pool, path).await? {
            DocumentSnapshot { data: Some(data) } => data,
            DocumentSnapshot { data: None } => Map::new(),
        };
        merge_fields(&mut document, partial);
        let encoded = serde_json::to_string(&document)?;

        sqlx::query(
            r#"
            INSERT INTO documents (path, data, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(path.as_str())
        .bind(&encoded)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|source| RemoteError::Database {
            operation: format!("write {}", path),
            source,
        })?;

        debug!(path = %path, bytes = encoded.len(), "Document stored");
        self.hub.notify(path, &DocumentSnapshot::with_data(document));
        Ok(())
    }
}
