//! Session manager configuration.

use std::env;
use std::time::Duration;

use tracing::warn;

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_MAX_SESSIONS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    idle_timeout: Duration,
    sweep_interval: Duration,
    max_sessions: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl ManagerConfig {
    pub fn from_env() -> Self {
        Self {
            idle_timeout: Duration::from_secs(parse_env_u64(
                "TUIVISION_IDLE_TIMEOUT",
                DEFAULT_IDLE_TIMEOUT_SECS,
            )),
            sweep_interval: Duration::from_secs(parse_env_u64(
                "TUIVISION_SWEEP_INTERVAL",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )),
            max_sessions: parse_env_usize("TUIVISION_MAX_SESSIONS", DEFAULT_MAX_SESSIONS),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return default,
    };
    if value.trim().is_empty() {
        return default;
    }
    match value.trim().parse::<usize>() {
        Ok(parsed) if parsed > 0 => parsed,
        _ => {
            warn!(value = %value, key, "Invalid numeric config; using default");
            default
        }
    }
}

fn parse_env_u64(key: &str, default: u64) -> u64 {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return default,
    };
    if value.trim().is_empty() {
        return default;
    }
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => parsed,
        _ => {
            warn!(value = %value, key, "Invalid numeric config; using default");
            default
        }
    }
}
