use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tally::domain::data_set::{DataSetName, DocumentPath};
use tally::domain::user::UserId;
use tally::repository::database::{init_database, init_test_database};
use tally::repository::{RemoteDocumentStore, SqliteDocumentStore};
use tally::services::{GovernorPolicy, HabitTracker, SyncChannel, SyncTimings, WriteGovernor};
use tempfile::TempDir;

/// Polls `condition` until it holds or two seconds pass.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn user() -> UserId {
    UserId::new("local").unwrap()
}

fn channel(store: SqliteDocumentStore) -> SyncChannel {
    SyncChannel::new(
        Arc::new(store),
        WriteGovernor::new(GovernorPolicy::default()),
        SyncTimings::immediate(),
    )
}

#[tokio::test]
async fn test_binding_round_trips_through_sqlite() {
    let pool = init_test_database().await.unwrap();
    let store = SqliteDocumentStore::new(pool);
    let channel = channel(store.clone());

    let binding = channel.bind(
        Some(user()),
        DataSetName::new("habits").unwrap(),
        Vec::<String>::new(),
    );
    assert!(eventually(|| !binding.loading()).await);

    binding.set(vec!["read".to_string()]);
    let path = DocumentPath::new(&user(), &DataSetName::new("habits").unwrap());
    let mut stored = None;
    for _ in 0..200 {
        stored = store.get(&path).await.unwrap().field("value").cloned();
        if stored.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stored, Some(json!(["read"])));

    // A second binding starts from the stored document.
    let second = channel.bind(
        Some(user()),
        DataSetName::new("habits").unwrap(),
        Vec::<String>::new(),
    );
    assert!(eventually(|| second.value() == vec!["read".to_string()]).await);
}

#[tokio::test]
async fn test_merge_write_keeps_other_fields() {
    let pool = init_test_database().await.unwrap();
    let store = SqliteDocumentStore::new(pool);
    let path = DocumentPath::new(&user(), &DataSetName::new("settings").unwrap());

    store
        .merge_write(&path, json!({"value": 1, "owner": "me"}).as_object().unwrap().clone())
        .await
        .unwrap();
    store
        .merge_write(&path, json!({"value": 2}).as_object().unwrap().clone())
        .await
        .unwrap();

    let snapshot = store.get(&path).await.unwrap();
    assert_eq!(snapshot.field("value"), Some(&json!(2)));
    assert_eq!(snapshot.field("owner"), Some(&json!("me")));
}

#[tokio::test]
async fn test_habits_survive_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tally.db");
    let db_path = db_path.to_str().unwrap();

    {
        let store = SqliteDocumentStore::new(init_database(db_path).await.unwrap());
        let tracker = HabitTracker::new(&channel(store.clone()), Some(user()));
        assert!(eventually(|| !tracker.loading()).await);
        tracker.add_habit("Walk").unwrap();

        let path = DocumentPath::new(&user(), &DataSetName::new("habits").unwrap());
        let mut written = false;
        for _ in 0..200 {
            if store.get(&path).await.unwrap().exists() {
                written = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(written);
    }

    let store = SqliteDocumentStore::new(init_database(db_path).await.unwrap());
    let tracker = HabitTracker::new(&channel(store), Some(user()));
    assert!(eventually(|| tracker.habits().len() == 1).await);
    assert_eq!(tracker.habits()[0].name, "Walk");
}

#[tokio::test]
async fn test_concurrent_writes_are_serialized() {
    let pool = init_test_database().await.unwrap();
    let store = SqliteDocumentStore::new(pool);
    let path = DocumentPath::new(&user(), &DataSetName::new("notes").unwrap());

    // Each write sets its own field; none may be lost to a read-modify-write race.
    let writes = (0..10).map(|i| {
        let store = store.clone();
        let path = path.clone();
        async move {
            let mut partial = serde_json::Map::new();
            partial.insert(format!("field{}", i), json!(i));
            store.merge_write(&path, partial).await
        }
    });
    for result in futures::future::join_all(writes).await {
        result.unwrap();
    }

    let snapshot = store.get(&path).await.unwrap();
    for i in 0..10 {
        assert_eq!(snapshot.field(&format!("field{}", i)), Some(&json!(i)));
    }
}
