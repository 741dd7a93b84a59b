//! Time source for idle accounting.

use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use tuivision_common::mutex_lock_or_recover;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = mutex_lock_or_recover(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *mutex_lock_or_recover(&self.now)
    }
}

/// True once strictly more than `idle_timeout` has passed since
/// `last_activity`. A `last_activity` in the future counts as fresh.
pub(crate) fn is_stale(last_activity: Instant, now: Instant, idle_timeout: Duration) -> bool {
    now.saturating_duration_since(last_activity) > idle_timeout
}
