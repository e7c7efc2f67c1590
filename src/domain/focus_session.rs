use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// A finished stopwatch run, kept in the synced history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: Uuid,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl FocusSession {
    pub fn started_on(&self) -> NaiveDate {
        self.started_at.date_naive()
    }
}

/// The stopwatch currently ticking on this device. Lives in the local
/// mirror only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimer {
    pub label: String,
    pub started_at: DateTime<Utc>,
    /// Time banked before the current run segment.
    pub accumulated_ms: i64,
    /// Start of the current run segment, `None` while paused.
    pub running_since: Option<DateTime<Utc>>,
}

impl ActiveTimer {
    pub fn start(label: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            started_at: now,
            accumulated_ms: 0,
            running_since: Some(now),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        let current = self
            .running_since
            .map(|since| (now - since).num_milliseconds().max(0))
            .unwrap_or(0);
        self.accumulated_ms + current
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_running() {
            return Err(DomainError::InvalidTimerTransition {
                from: "paused",
                to: "paused",
            });
        }
        self.accumulated_ms = self.elapsed_ms(now);
        self.running_since = None;
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.is_running() {
            return Err(DomainError::InvalidTimerTransition {
                from: "running",
                to: "running",
            });
        }
        self.running_since = Some(now);
        Ok(())
    }

    pub fn finish(self, now: DateTime<Utc>) -> FocusSession {
        FocusSession {
            id: Uuid::new_v4(),
            duration_ms: self.elapsed_ms(now),
            label: self.label,
            started_at: self.started_at,
            ended_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_pause_banks_elapsed_time() {
        let t0 = Utc::now();
        let mut timer = ActiveTimer::start("Deep work", t0);

        timer.pause(t0 + Duration::seconds(30)).unwrap();
        assert_eq!(timer.elapsed_ms(t0 + Duration::hours(1)), 30_000);

        timer.resume(t0 + Duration::seconds(100)).unwrap();
        assert_eq!(timer.elapsed_ms(t0 + Duration::seconds(110)), 40_000);

        let session = timer.finish(t0 + Duration::seconds(130));
        assert_eq!(session.duration_ms, 60_000);
        assert_eq!(session.label, "Deep work");
    }

    #[test]
    fn test_invalid_transitions() {
        let t0 = Utc::now();
        let mut timer = ActiveTimer::start("x", t0);
        assert!(timer.resume(t0).is_err());
        timer.pause(t0).unwrap();
        assert!(timer.pause(t0).is_err());
    }
}
