use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::habit::validate_name;
use crate::error::DomainError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subtask {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyTask {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
}

impl DailyTask {
    pub fn new(title: impl Into<String>) -> Result<Self, DomainError> {
        Ok(Self {
            id: Uuid::new_v4(),
            title: validate_name(title.into())?,
            done: false,
            subtasks: Vec::new(),
        })
    }

    /// Marks the task and every subtask with the same state.
    pub fn set_done(&mut self, done: bool) {
        self.done = done;
        for subtask in &mut self.subtasks {
            subtask.done = done;
        }
    }

    pub fn toggle_subtask(&mut self, subtask_id: Uuid) -> Result<bool, DomainError> {
        let subtask = self
            .subtasks
            .iter_mut()
            .find(|s| s.id == subtask_id)
            .ok_or(DomainError::SubtaskNotFound { id: subtask_id })?;
        subtask.done = !subtask.done;
        let now_done = subtask.done;

        // The parent follows its subtasks once it has any.
        self.done = self.subtasks.iter().all(|s| s.done);
        Ok(now_done)
    }
}

/// Daily task lists keyed by day.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct DailyTasks(BTreeMap<NaiveDate, Vec<DailyTask>>);

impl DailyTasks {
    pub fn on(&self, date: NaiveDate) -> &[DailyTask] {
        self.0.get(&date).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn push(&mut self, date: NaiveDate, task: DailyTask) {
        self.0.entry(date).or_default().push(task);
    }

    pub fn find_mut(&mut self, date: NaiveDate, task_id: Uuid) -> Result<&mut DailyTask, DomainError> {
        self.0
            .get_mut(&date)
            .and_then(|tasks| tasks.iter_mut().find(|t| t.id == task_id))
            .ok_or(DomainError::TaskNotFound { id: task_id })
    }

    pub fn remove(&mut self, date: NaiveDate, task_id: Uuid) -> Result<DailyTask, DomainError> {
        let tasks = self
            .0
            .get_mut(&date)
            .ok_or(DomainError::TaskNotFound { id: task_id })?;
        let index = tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or(DomainError::TaskNotFound { id: task_id })?;
        let removed = tasks.remove(index);
        if tasks.is_empty() {
            self.0.remove(&date);
        }
        Ok(removed)
    }
}
