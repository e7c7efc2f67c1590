use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Device-local preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub week_starts_on: Weekday,
    pub sound_enabled: bool,
    pub daily_goal_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            week_starts_on: Weekday::Mon,
            sound_enabled: true,
            daily_goal_minutes: 120,
        }
    }
}
