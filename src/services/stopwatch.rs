use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::domain::data_set::DataSetName;
use crate::domain::focus_session::{ActiveTimer, FocusSession};
use crate::domain::user::UserId;
use crate::error::DomainError;
use crate::repository::local_mirror::LocalMirrorStore;
use crate::services::sync_channel::{SyncBinding, SyncChannel};

/// Focus stopwatch: the running timer lives in the local mirror so it
/// survives reloads on this device, finished sessions go to the synced
/// history.
pub struct Stopwatch {
    mirror: LocalMirrorStore,
    history: SyncBinding<Vec<FocusSession>>,
}

impl Stopwatch {
    pub fn new(channel: &SyncChannel, mirror: LocalMirrorStore, user: Option<UserId>) -> Self {
        Self {
            mirror,
            history: channel.bind(user, DataSetName::builtin(DataSetName::STOPWATCH_HISTORY), Vec::new()),
        }
    }

    pub fn set_user(&self, user: Option<UserId>) {
        self.history.set_user(user);
    }

    fn timer_name() -> DataSetName {
        DataSetName::builtin(DataSetName::ACTIVE_TIMER)
    }

    pub fn active(&self) -> Option<ActiveTimer> {
        self.mirror.read(self.history.user().as_ref(), &Self::timer_name(), None)
    }

    fn store_active(&self, timer: Option<&ActiveTimer>) {
        let user = self.history.user();
        match timer {
            Some(timer) => self.mirror.write(user.as_ref(), &Self::timer_name(), timer),
            None => self.mirror.remove(user.as_ref(), &Self::timer_name()),
        }
    }

    pub fn start(&self, label: impl Into<String>, now: DateTime<Utc>) -> Result<ActiveTimer, DomainError> {
        if let Some(current) = self.active() {
            return Err(DomainError::InvalidTimerTransition {
                from: if current.is_running() { "running" } else { "paused" },
                to: "running",
            });
        }
        let timer = ActiveTimer::start(label, now);
        self.store_active(Some(&timer));
        Ok(timer)
    }

    pub fn pause(&self, now: DateTime<Utc>) -> Result<ActiveTimer, DomainError> {
        let mut timer = self.require_active("paused")?;
        timer.pause(now)?;
        self.store_active(Some(&timer));
        Ok(timer)
    }

    pub fn resume(&self, now: DateTime<Utc>) -> Result<ActiveTimer, DomainError> {
        let mut timer = self.require_active("running")?;
        timer.resume(now)?;
        self.store_active(Some(&timer));
        Ok(timer)
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        self.active().map(|timer| timer.elapsed_ms(now)).unwrap_or(0)
    }

    /// Ends the session, appends it to the synced history and clears the
    /// local timer. Signed out, the session is returned but not recorded.
    pub fn stop(&self, now: DateTime<Utc>) -> Result<FocusSession, DomainError> {
        let timer = self.require_active("stopped")?;
        let session = timer.finish(now);
        info!(label = %session.label, duration_ms = session.duration_ms, "Focus session finished");

        let recorded = session.clone();
        self.history.update(move |history| {
            let mut next = history.clone();
            next.push(recorded);
            next
        });
        self.store_active(None);
        Ok(session)
    }

    fn require_active(&self, to: &'static str) -> Result<ActiveTimer, DomainError> {
        self.active()
            .ok_or(DomainError::InvalidTimerTransition { from: "idle", to })
    }

    pub fn history(&self) -> Vec<FocusSession> {
        self.history.value()
    }

    pub fn loading(&self) -> bool {
        self.history.loading()
    }

    pub fn total_focus_ms_on(&self, date: NaiveDate) -> i64 {
        self.history
            .value()
            .iter()
            .filter(|session| session.started_on() == date)
            .map(|session| session.duration_ms)
            .sum()
    }
}
