pub mod custom_habits;
pub mod daily_tasks;
pub mod habit_tracker;
pub mod notes;
pub mod settings_store;
pub mod stopwatch;
pub mod sync_channel;
pub mod write_governor;

pub use custom_habits::CustomHabits;
pub use daily_tasks::DailyTaskList;
pub use habit_tracker::HabitTracker;
pub use notes::NotesBook;
pub use settings_store::SettingsStore;
pub use stopwatch::Stopwatch;
pub use sync_channel::{SyncBinding, SyncChannel, SyncTimings};
pub use write_governor::{GovernorPolicy, WriteGovernor};
