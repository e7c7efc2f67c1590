pub mod custom_habit;
pub mod daily_task;
pub mod data_set;
pub mod focus_session;
pub mod habit;
pub mod settings;
pub mod user;
