use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::data_set::DataSetName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorPolicy {
    /// Writes admitted per data set within one window
    pub max_writes: u32,
    pub window: Duration,
}

impl Default for GovernorPolicy {
    fn default() -> Self {
        Self {
            max_writes: 20,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Normal,
    Tripped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GovernorStatus {
    pub writes_in_window: u32,
    pub window_started_at: Instant,
    pub state: BreakerState,
}

/// Circuit breaker bounding remote writes per data-set name.
///
/// One governor is shared by every binding in the process. Counters are
/// keyed by data-set name only, so all users writing `habits` draw from the
/// same budget, and nothing is reset on sign-out. Windows are fixed, opened
/// by the first attempt seen for a name.
#[derive(Clone)]
pub struct WriteGovernor {
    policy: GovernorPolicy,
    windows: Arc<Mutex<HashMap<DataSetName, GovernorStatus>>>,
}

impl WriteGovernor {
    pub fn new(policy: GovernorPolicy) -> Self {
        Self {
            policy,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> GovernorPolicy {
        self.policy
    }

    /// Asks to perform one write for `data_set`; `false` means the write
    /// must be dropped.
    pub fn attempt_write(&self, data_set: &DataSetName) -> bool {
        self.attempt_write_at(data_set, Instant::now())
    }

    pub fn attempt_write_at(&self, data_set: &DataSetName, now: Instant) -> bool {
        let mut windows = self.windows.lock();
        let status = windows.entry(data_set.clone()).or_insert(GovernorStatus {
            writes_in_window: 0,
            window_started_at: now,
            state: BreakerState::Normal,
        });

        if now.saturating_duration_since(status.window_started_at) >= self.policy.window {
            if status.state == BreakerState::Tripped {
                info!(data_set = %data_set, "Write circuit breaker reset");
            }
            *status = GovernorStatus {
                writes_in_window: 0,
                window_started_at: now,
                state: BreakerState::Normal,
            };
        }

        match status.state {
            BreakerState::Tripped => {
                debug!(data_set = %data_set, "Write refused, circuit breaker open");
                false
            }
            BreakerState::Normal if status.writes_in_window >= self.policy.max_writes => {
                status.state = BreakerState::Tripped;
                warn!(
                    data_set = %data_set,
                    max_writes = self.policy.max_writes,
                    window_secs = self.policy.window.as_secs(),
                    "Write circuit breaker tripped"
                );
                false
            }
            BreakerState::Normal => {
                status.writes_in_window += 1;
                true
            }
        }
    }

    pub fn status(&self, data_set: &DataSetName) -> Option<GovernorStatus> {
        self.windows.lock().get(data_set).copied()
    }

    /// Forgets every window. Only meant for tests.
    pub fn reset(&self) {
        self.windows.lock().clear();
    }
}

impl Default for WriteGovernor {
    fn default() -> Self {
        Self::new(GovernorPolicy::default())
    }
}
