use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::time::Duration;
use tally::domain::settings::Settings;
use tally::domain::user::{AuthUser, UserId};
use tally::error::DomainError;
use tally::repository::{AuthProvider, LocalAuthProvider};
use tally::services::{
    CustomHabits, DailyTaskList, GovernorPolicy, HabitTracker, NotesBook, SettingsStore, Stopwatch,
    SyncTimings,
};
use tally::test_helpers::{settle, TestContext};
use tokio::sync::mpsc;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn immediate_context() -> TestContext {
    TestContext::with_settings(SyncTimings::immediate(), GovernorPolicy::default())
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_habit_tracker_syncs_habits_and_completions() {
    let ctx = immediate_context();
    let tracker = HabitTracker::new(&ctx.channel, Some(ctx.user.clone()));
    settle().await;
    assert!(!tracker.loading());

    let read = tracker.add_habit("  Read  ").unwrap();
    assert_eq!(read.name, "Read");
    let run = tracker.add_habit("Run").unwrap();

    assert!(tracker.toggle_completion(read.id, day(4)).unwrap());
    assert!(tracker.toggle_completion(read.id, day(5)).unwrap());
    assert!(tracker.toggle_completion(run.id, day(5)).unwrap());
    assert_eq!(tracker.current_streak(read.id, day(5)), 2);
    assert_eq!(tracker.completed_on(day(5)).len(), 2);

    tokio::time::sleep(Duration::from_millis(100)).await;

    let remote_habits = ctx.store.value_at(&ctx.path("habits")).unwrap();
    assert_eq!(remote_habits.as_array().unwrap().len(), 2);
    let remote_completions = ctx.store.value_at(&ctx.path("completions")).unwrap();
    assert_eq!(remote_completions["2024-03-04"], json!([read.id]));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_habit_tracker_validation_and_removal() {
    let ctx = immediate_context();
    let tracker = HabitTracker::new(&ctx.channel, Some(ctx.user.clone()));
    settle().await;

    assert!(matches!(
        tracker.add_habit("   "),
        Err(DomainError::ValidationError { .. })
    ));

    let habit = tracker.add_habit("Stretch").unwrap();
    tracker.toggle_completion(habit.id, day(1)).unwrap();
    tracker.rename_habit(habit.id, "Morning stretch").unwrap();
    assert_eq!(tracker.habits()[0].name, "Morning stretch");

    tracker.archive_habit(habit.id).unwrap();
    assert!(tracker.active_habits().is_empty());
    assert_eq!(tracker.habits().len(), 1);

    tracker.remove_habit(habit.id).unwrap();
    assert!(tracker.habits().is_empty());
    assert!(!tracker.is_completed(habit.id, day(1)));
    assert_eq!(
        tracker.toggle_completion(habit.id, day(2)),
        Err(DomainError::HabitNotFound { id: habit.id })
    );
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_habit_tracker_follows_other_device() {
    let ctx = immediate_context();
    let phone = HabitTracker::new(&ctx.channel, Some(ctx.user.clone()));
    let laptop = HabitTracker::new(&ctx.channel, Some(ctx.user.clone()));
    settle().await;

    let mut changes = laptop.watch_habits();
    let habit = phone.add_habit("Journal").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(changes.has_changed().unwrap());
    assert_eq!(laptop.habits(), vec![habit]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_signed_out_operations_are_rejected() {
    let ctx = immediate_context();
    let tracker = HabitTracker::new(&ctx.channel, None);
    let tasks = DailyTaskList::new(&ctx.channel, None);

    assert_eq!(tracker.add_habit("Read"), Err(DomainError::SignedOut));
    assert_eq!(tasks.add_task(day(1), "Laundry").err(), Some(DomainError::SignedOut));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(ctx.store.write_count(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_auth_sign_out_resets_services() {
    let ctx = immediate_context();
    let auth = LocalAuthProvider::new(AuthUser::new(ctx.user.clone()));
    auth.resolve(None);
    let tracker = HabitTracker::new(&ctx.channel, auth.current().uid().cloned());
    assert!(tracker.habits().is_empty());

    auth.sign_in_with_google().await.unwrap();
    tracker.set_user(auth.current().uid().cloned());
    settle().await;
    tracker.add_habit("Meditate").unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    auth.sign_out().await.unwrap();
    tracker.set_user(auth.current().uid().cloned());
    assert!(tracker.habits().is_empty());
    assert!(!tracker.loading());

    // Signing back in restores the synced state.
    auth.sign_in_with_google().await.unwrap();
    tracker.set_user(auth.current().uid().cloned());
    settle().await;
    assert_eq!(tracker.habits().len(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_custom_habit_range_rules() {
    let ctx = immediate_context();
    let habits = CustomHabits::new(&ctx.channel, Some(ctx.user.clone()));
    settle().await;

    assert!(matches!(
        habits.add("Backwards", day(10), day(1)),
        Err(DomainError::ValidationError { .. })
    ));

    let challenge = habits.add("No sugar", day(1), day(7)).unwrap();
    assert!(habits.toggle(challenge.id, day(3)).unwrap());
    assert_eq!(
        habits.toggle(challenge.id, day(8)),
        Err(DomainError::OutsideHabitRange {
            id: challenge.id,
            date: day(8)
        })
    );
    assert_eq!(habits.active_on(day(5)).len(), 1);
    assert!(habits.active_on(day(9)).is_empty());
    assert_eq!(habits.all()[0].completed_dates.len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let remote = ctx.store.value_at(&ctx.path("customHabits")).unwrap();
    assert_eq!(remote[0]["completedDates"], json!(["2024-03-03"]));

    habits.remove(challenge.id).unwrap();
    assert!(habits.all().is_empty());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_daily_task_subtask_cascade() {
    let ctx = immediate_context();
    let tasks = DailyTaskList::new(&ctx.channel, Some(ctx.user.clone()));
    settle().await;

    let task = tasks.add_task(day(2), "Clean kitchen").unwrap();
    let dishes = tasks.add_subtask(day(2), task.id, "Dishes").unwrap();
    let floor = tasks.add_subtask(day(2), task.id, "Floor").unwrap();

    assert!(tasks.toggle_subtask(day(2), task.id, dishes.id).unwrap());
    assert!(!tasks.tasks_on(day(2))[0].done);
    assert!(tasks.toggle_subtask(day(2), task.id, floor.id).unwrap());
    assert!(tasks.tasks_on(day(2))[0].done);

    // Reopening the task reopens its subtasks.
    assert!(!tasks.toggle_task(day(2), task.id).unwrap());
    assert!(tasks.tasks_on(day(2))[0].subtasks.iter().all(|s| !s.done));

    assert!(tasks.toggle_task(day(2), task.id).unwrap());
    assert!(tasks.tasks_on(day(2))[0].subtasks.iter().all(|s| s.done));

    tasks.remove_task(day(2), task.id).unwrap();
    assert!(tasks.tasks_on(day(2)).is_empty());
    assert_eq!(
        tasks.remove_task(day(2), task.id),
        Err(DomainError::TaskNotFound { id: task.id })
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctx.store.value_at(&ctx.path("dailyTasks")), Some(json!({})));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn test_stopwatch_session_lifecycle() {
    let ctx = immediate_context();
    let stopwatch = Stopwatch::new(&ctx.channel, ctx.mirror.clone(), Some(ctx.user.clone()));
    settle().await;

    let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
    stopwatch.start("Writing", start).unwrap();
    assert!(matches!(
        stopwatch.start("Again", start),
        Err(DomainError::InvalidTimerTransition { from: "running", .. })
    ));

    stopwatch.pause(start + ChronoDuration::minutes(20)).unwrap();
    assert_eq!(stopwatch.elapsed_ms(start + ChronoDuration::minutes(45)), 20 * 60_000);

    // The running timer survives a reload of this device.
    let reloaded = Stopwatch::new(&ctx.channel, ctx.mirror.clone(), Some(ctx.user.clone()));
    assert_eq!(reloaded.active(), stopwatch.active());

    stopwatch.resume(start + ChronoDuration::minutes(30)).unwrap();
    let session = stopwatch.stop(start + ChronoDuration::minutes(40)).unwrap();
    assert_eq!(session.duration_ms, 30 * 60_000);
    assert!(stopwatch.active().is_none());
    assert_eq!(
        stopwatch.pause(start),
        Err(DomainError::InvalidTimerTransition {
            from: "idle",
            to: "paused"
        })
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stopwatch.history(), vec![session.clone()]);
    assert_eq!(stopwatch.total_focus_ms_on(session.started_on()), 30 * 60_000);
    assert_eq!(reloaded.history(), vec![session]);
    assert_eq!(
        ctx.store
            .value_at(&ctx.path("stopwatchHistory"))
            .unwrap()
            .as_array()
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_notes_are_local_and_shared_between_windows() {
    let ctx = TestContext::new_for_test();
    let notes = NotesBook::new(ctx.mirror.clone(), Some(ctx.user.clone()));
    let other = NotesBook::new(ctx.other_window(), Some(ctx.user.clone()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = notes.on_external_change(move |all| {
        let _ = tx.send(all);
    });

    notes.set_note(day(1), "Slept badly");
    assert_eq!(other.note_for(day(1)), Some("Slept badly".to_string()));

    other.set_note(day(2), "Great run");
    let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen.len(), 2);

    notes.set_note(day(1), "   ");
    assert_eq!(notes.note_for(day(1)), None);
    assert_eq!(notes.all().len(), 1);
    assert_eq!(ctx.store.write_count(), 0);
}

#[tokio::test]
async fn test_settings_defaults_and_updates() {
    let ctx = TestContext::new_for_test();
    let settings = SettingsStore::new(ctx.mirror.clone(), Some(ctx.user.clone()));
    let other = SettingsStore::new(ctx.other_window(), Some(ctx.user.clone()));
    assert_eq!(settings.get(), Settings::default());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _subscription = settings.on_external_change(move |changed| {
        let _ = tx.send(changed);
    });

    let updated = other.update(|s| {
        s.sound_enabled = false;
        s.daily_goal_minutes = 90;
    });
    let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen, updated);
    assert_eq!(settings.get().daily_goal_minutes, 90);

    // Another user starts from defaults.
    settings.set_user(Some(UserId::new("someone-else").unwrap()));
    assert!(settings.get().sound_enabled);
}
