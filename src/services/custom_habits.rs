use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::custom_habit::CustomHabit;
use crate::domain::data_set::DataSetName;
use crate::domain::user::UserId;
use crate::error::DomainError;
use crate::services::sync_channel::{SyncBinding, SyncChannel};

/// Date-ranged habits such as 30-day challenges.
pub struct CustomHabits {
    habits: SyncBinding<Vec<CustomHabit>>,
}

impl CustomHabits {
    pub fn new(channel: &SyncChannel, user: Option<UserId>) -> Self {
        Self {
            habits: channel.bind(user, DataSetName::builtin(DataSetName::CUSTOM_HABITS), Vec::new()),
        }
    }

    pub fn set_user(&self, user: Option<UserId>) {
        self.habits.set_user(user);
    }

    pub fn loading(&self) -> bool {
        self.habits.loading()
    }

    pub fn all(&self) -> Vec<CustomHabit> {
        self.habits.value()
    }

    pub fn active_on(&self, date: NaiveDate) -> Vec<CustomHabit> {
        self.habits.value().into_iter().filter(|h| h.covers(date)).collect()
    }

    pub fn add(&self, name: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Result<CustomHabit, DomainError> {
        if self.habits.user().is_none() {
            return Err(DomainError::SignedOut);
        }
        let habit = CustomHabit::new(name, start_date, end_date)?;
        let added = habit.clone();
        self.habits.update(move |habits| {
            let mut next = habits.clone();
            next.push(added);
            next
        });
        Ok(habit)
    }

    pub fn remove(&self, id: Uuid) -> Result<(), DomainError> {
        self.find(id)?;
        self.habits
            .update(|habits| habits.iter().filter(|h| h.id != id).cloned().collect());
        Ok(())
    }

    /// Flips completion of `date`; the date must lie within the habit's
    /// range.
    pub fn toggle(&self, id: Uuid, date: NaiveDate) -> Result<bool, DomainError> {
        // Validate against a copy first so errors leave the binding alone.
        let completed = self.find(id)?.toggle(date)?;
        self.habits.update(|habits| {
            let mut next = habits.clone();
            if let Some(habit) = next.iter_mut().find(|h| h.id == id) {
                let _ = habit.toggle(date);
            }
            next
        });
        Ok(completed)
    }

    fn find(&self, id: Uuid) -> Result<CustomHabit, DomainError> {
        if self.habits.user().is_none() {
            return Err(DomainError::SignedOut);
        }
        self.habits
            .value()
            .into_iter()
            .find(|h| h.id == id)
            .ok_or(DomainError::HabitNotFound { id })
    }
}
