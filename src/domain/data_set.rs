use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::user::UserId;
use crate::error::DomainError;

/// Name of a logical data set, e.g. `habits` or `completions`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataSetName(String);

impl DataSetName {
    pub const HABITS: &'static str = "habits";
    pub const COMPLETIONS: &'static str = "completions";
    pub const CUSTOM_HABITS: &'static str = "customHabits";
    pub const DAILY_TASKS: &'static str = "dailyTasks";
    pub const STOPWATCH_HISTORY: &'static str = "stopwatchHistory";
    pub const ACTIVE_TIMER: &'static str = "activeTimer";
    pub const NOTES: &'static str = "notes";
    pub const SETTINGS: &'static str = "settings";

    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DomainError::validation("data_set", "must not be empty"));
        }
        if raw.contains('/') {
            return Err(DomainError::validation("data_set", "must not contain '/'"));
        }
        // Local mirror keys end in `_{name}`; the last `_` must always
        // separate the user segment from the name.
        if raw.contains('_') {
            return Err(DomainError::validation("data_set", "must not contain '_'"));
        }
        Ok(Self(raw))
    }

    /// For the built-in names above, which are known to be valid.
    pub(crate) fn builtin(raw: &'static str) -> Self {
        Self(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataSetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of one data set's document in the remote store:
/// `users/{userId}/data/{dataSetName}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(String);

impl DocumentPath {
    pub fn new(user: &UserId, data_set: &DataSetName) -> Self {
        Self(format!("users/{}/data/{}", user, data_set))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_path_is_deterministic() {
        let user = UserId::new("abc").unwrap();
        let habits = DataSetName::new("habits").unwrap();

        assert_eq!(DocumentPath::new(&user, &habits).as_str(), "users/abc/data/habits");
        assert_eq!(DocumentPath::new(&user, &habits), DocumentPath::new(&user, &habits));
    }

    #[test]
    fn test_data_set_validation() {
        assert!(DataSetName::new("").is_err());
        assert!(DataSetName::new("a/b").is_err());
        assert!(DataSetName::new("b_notes").is_err());
        assert_eq!(DataSetName::builtin(DataSetName::CUSTOM_HABITS).as_str(), "customHabits");
    }
}
