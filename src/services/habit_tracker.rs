use chrono::NaiveDate;
use std::collections::BTreeSet;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::data_set::DataSetName;
use crate::domain::habit::{validate_name, Completions, Habit};
use crate::domain::user::UserId;
use crate::error::DomainError;
use crate::services::sync_channel::{SyncBinding, SyncChannel};

/// Recurring daily habits and their completion marks, both synced.
pub struct HabitTracker {
    habits: SyncBinding<Vec<Habit>>,
    completions: SyncBinding<Completions>,
}

impl HabitTracker {
    pub fn new(channel: &SyncChannel, user: Option<UserId>) -> Self {
        Self {
            habits: channel.bind(user.clone(), DataSetName::builtin(DataSetName::HABITS), Vec::new()),
            completions: channel.bind(
                user,
                DataSetName::builtin(DataSetName::COMPLETIONS),
                Completions::default(),
            ),
        }
    }

    pub fn set_user(&self, user: Option<UserId>) {
        self.habits.set_user(user.clone());
        self.completions.set_user(user);
    }

    pub fn loading(&self) -> bool {
        self.habits.loading() || self.completions.loading()
    }

    pub fn habits(&self) -> Vec<Habit> {
        self.habits.value()
    }

    pub fn active_habits(&self) -> Vec<Habit> {
        self.habits.value().into_iter().filter(|h| !h.archived).collect()
    }

    pub fn watch_habits(&self) -> watch::Receiver<Vec<Habit>> {
        self.habits.watch()
    }

    fn require_user(&self) -> Result<(), DomainError> {
        match self.habits.user() {
            Some(_) => Ok(()),
            None => Err(DomainError::SignedOut),
        }
    }

    fn require_habit(&self, id: Uuid) -> Result<(), DomainError> {
        self.require_user()?;
        if self.habits.value().iter().any(|h| h.id == id) {
            Ok(())
        } else {
            Err(DomainError::HabitNotFound { id })
        }
    }

    pub fn add_habit(&self, name: impl Into<String>) -> Result<Habit, DomainError> {
        self.require_user()?;
        let habit = Habit::new(name)?;
        let added = habit.clone();
        self.habits.update(move |habits| {
            let mut next = habits.clone();
            next.push(added);
            next
        });
        Ok(habit)
    }

    pub fn rename_habit(&self, id: Uuid, name: impl Into<String>) -> Result<(), DomainError> {
        self.require_habit(id)?;
        let name = validate_name(name.into())?;
        self.edit_habit(id, move |habit| habit.name = name);
        Ok(())
    }

    pub fn archive_habit(&self, id: Uuid) -> Result<(), DomainError> {
        self.require_habit(id)?;
        self.edit_habit(id, |habit| habit.archived = true);
        Ok(())
    }

    fn edit_habit(&self, id: Uuid, edit: impl FnOnce(&mut Habit)) {
        self.habits.update(move |habits| {
            let mut next = habits.clone();
            if let Some(habit) = next.iter_mut().find(|h| h.id == id) {
                edit(habit);
            }
            next
        });
    }

    /// Deletes the habit together with its completion history.
    pub fn remove_habit(&self, id: Uuid) -> Result<(), DomainError> {
        self.require_habit(id)?;
        self.habits
            .update(|habits| habits.iter().filter(|h| h.id != id).cloned().collect());
        self.completions.update(|completions| {
            let mut next = completions.clone();
            next.remove_habit(id);
            next
        });
        Ok(())
    }

    /// Returns whether the habit is completed on `date` afterwards.
    pub fn toggle_completion(&self, id: Uuid, date: NaiveDate) -> Result<bool, DomainError> {
        self.require_habit(id)?;
        let mut completed = false;
        self.completions.update(|completions| {
            let mut next = completions.clone();
            completed = next.toggle(id, date);
            next
        });
        Ok(completed)
    }

    pub fn is_completed(&self, id: Uuid, date: NaiveDate) -> bool {
        self.completions.value().is_completed(id, date)
    }

    pub fn completed_on(&self, date: NaiveDate) -> BTreeSet<Uuid> {
        self.completions.value().completed_on(date)
    }

    pub fn current_streak(&self, id: Uuid, today: NaiveDate) -> u32 {
        self.completions.value().current_streak(id, today)
    }
}
