use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::error::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
}

impl Habit {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = validate_name(name.into())?;
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            created_at: Utc::now(),
            archived: false,
        })
    }
}

pub(crate) fn validate_name(name: String) -> Result<String, DomainError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("name", "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Which habits were completed on which day.
///
/// Days with no completions are never stored, so two logically equal
/// histories always compare equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Completions(BTreeMap<NaiveDate, BTreeSet<Uuid>>);

impl Completions {
    pub fn is_completed(&self, habit_id: Uuid, date: NaiveDate) -> bool {
        self.0
            .get(&date)
            .is_some_and(|done| done.contains(&habit_id))
    }

    /// Flips the completion mark and returns the new state.
    pub fn toggle(&mut self, habit_id: Uuid, date: NaiveDate) -> bool {
        let done = self.0.entry(date).or_default();
        let completed = if done.remove(&habit_id) {
            false
        } else {
            done.insert(habit_id);
            true
        };
        if done.is_empty() {
            self.0.remove(&date);
        }
        completed
    }

    pub fn completed_on(&self, date: NaiveDate) -> BTreeSet<Uuid> {
        self.0.get(&date).cloned().unwrap_or_default()
    }

    pub fn remove_habit(&mut self, habit_id: Uuid) {
        self.0.retain(|_, done| {
            done.remove(&habit_id);
            !done.is_empty()
        });
    }

    /// Consecutive completed days ending today, or ending yesterday when
    /// today has not been checked off yet.
    pub fn current_streak(&self, habit_id: Uuid, today: NaiveDate) -> u32 {
        let mut day = if self.is_completed(habit_id, today) {
            today
        } else {
            today - Duration::days(1)
        };

        let mut streak = 0;
        while self.is_completed(habit_id, day) {
            streak += 1;
            day -= Duration::days(1);
        }
        streak
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
