use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tally::config::SyncConfig;
use tally::domain::user::{AuthUser, UserId};
use tally::repository::database::init_database;
use tally::repository::{
    AuthProvider, FileStorage, LocalAuthProvider, LocalMirrorStore, SqliteDocumentStore, StorageBackend,
};
use tally::services::{DailyTaskList, HabitTracker, NotesBook, Stopwatch, SyncChannel, WriteGovernor};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tally=info")))
        .init();

    let config = SyncConfig::load()?;

    // Offline mode: the document store is a local SQLite file.
    let pool = init_database(&config.database_path).await?;
    let store = Arc::new(SqliteDocumentStore::new(pool));
    let channel = SyncChannel::new(store, WriteGovernor::new(config.governor_policy()), config.timings());

    let storage_dir = match &config.local_storage_dir {
        Some(dir) => dir.clone(),
        None => dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine local data directory"))?
            .join("tally")
            .join("local"),
    };
    let backend: Arc<dyn StorageBackend> = Arc::new(FileStorage::open(&storage_dir)?);
    let mirror = LocalMirrorStore::new(config.app_namespace.clone(), backend);

    let auth = LocalAuthProvider::new(AuthUser::new(UserId::new("local")?));
    auth.resolve(None);
    let user = auth.sign_in_with_google().await?;
    info!(uid = %user.uid, "Running offline");

    let uid = Some(user.uid.clone());
    let habits = HabitTracker::new(&channel, uid.clone());
    let tasks = DailyTaskList::new(&channel, uid.clone());
    let stopwatch = Stopwatch::new(&channel, mirror.clone(), uid.clone());
    let notes = NotesBook::new(mirror, uid);

    let mut waited = Duration::ZERO;
    while (habits.loading() || tasks.loading() || stopwatch.loading()) && waited < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }

    let today = Local::now().date_naive();
    println!("Tally for {}", today);

    let done = habits.completed_on(today);
    for habit in habits.active_habits() {
        println!(
            "  [{}] {} (streak {})",
            if done.contains(&habit.id) { "x" } else { " " },
            habit.name,
            habits.current_streak(habit.id, today)
        );
    }

    for task in tasks.tasks_on(today) {
        println!("  - [{}] {}", if task.done { "x" } else { " " }, task.title);
    }

    println!(
        "  Focus today: {} min",
        stopwatch.total_focus_ms_on(today) / 60_000
    );
    if let Some(note) = notes.note_for(today) {
        println!("  Note: {}", note);
    }

    Ok(())
}
