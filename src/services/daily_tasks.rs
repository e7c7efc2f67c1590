use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::daily_task::{DailyTask, DailyTasks, Subtask};
use crate::domain::data_set::DataSetName;
use crate::domain::habit::validate_name;
use crate::domain::user::UserId;
use crate::error::DomainError;
use crate::services::sync_channel::{SyncBinding, SyncChannel};

pub struct DailyTaskList {
    tasks: SyncBinding<DailyTasks>,
}

impl DailyTaskList {
    pub fn new(channel: &SyncChannel, user: Option<UserId>) -> Self {
        Self {
            tasks: channel.bind(user, DataSetName::builtin(DataSetName::DAILY_TASKS), DailyTasks::default()),
        }
    }

    pub fn set_user(&self, user: Option<UserId>) {
        self.tasks.set_user(user);
    }

    pub fn loading(&self) -> bool {
        self.tasks.loading()
    }

    pub fn tasks_on(&self, date: NaiveDate) -> Vec<DailyTask> {
        self.tasks.value().on(date).to_vec()
    }

    /// Runs `edit` on a copy first so a failing edit never reaches the
    /// binding, then applies it for real.
    fn edit<R>(&self, edit: impl Fn(&mut DailyTasks) -> Result<R, DomainError>) -> Result<R, DomainError> {
        if self.tasks.user().is_none() {
            return Err(DomainError::SignedOut);
        }
        let mut preview = self.tasks.value();
        let result = edit(&mut preview)?;
        self.tasks.update(|tasks| {
            let mut next = tasks.clone();
            match edit(&mut next) {
                Ok(_) => next,
                Err(_) => tasks.clone(),
            }
        });
        Ok(result)
    }

    pub fn add_task(&self, date: NaiveDate, title: impl Into<String>) -> Result<DailyTask, DomainError> {
        let task = DailyTask::new(title)?;
        self.edit(|tasks| {
            tasks.push(date, task.clone());
            Ok(())
        })?;
        Ok(task)
    }

    pub fn toggle_task(&self, date: NaiveDate, task_id: Uuid) -> Result<bool, DomainError> {
        self.edit(|tasks| {
            let task = tasks.find_mut(date, task_id)?;
            let done = !task.done;
            task.set_done(done);
            Ok(done)
        })
    }

    pub fn remove_task(&self, date: NaiveDate, task_id: Uuid) -> Result<(), DomainError> {
        self.edit(|tasks| tasks.remove(date, task_id).map(|_| ()))
    }

    pub fn add_subtask(&self, date: NaiveDate, task_id: Uuid, title: impl Into<String>) -> Result<Subtask, DomainError> {
        let subtask = Subtask {
            id: Uuid::new_v4(),
            title: validate_name(title.into())?,
            done: false,
        };
        self.edit(|tasks| {
            let task = tasks.find_mut(date, task_id)?;
            task.subtasks.push(subtask.clone());
            // A new open subtask reopens the task.
            task.done = false;
            Ok(())
        })?;
        Ok(subtask)
    }

    pub fn toggle_subtask(&self, date: NaiveDate, task_id: Uuid, subtask_id: Uuid) -> Result<bool, DomainError> {
        self.edit(|tasks| tasks.find_mut(date, task_id)?.toggle_subtask(subtask_id))
    }
}
