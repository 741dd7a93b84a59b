//! Shared helpers for tests that drive real child processes.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tuivision_session::ManagerConfig;
use tuivision_session::SessionManager;
use tuivision_session::SpawnOptions;
use tuivision_session::SpawnedSession;
use tuivision_session::TextMatcher;
use tuivision_session::wait_for_text;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn manager() -> Arc<SessionManager> {
    Arc::new(SessionManager::new(ManagerConfig::default()))
}

/// Spawns `sh -c <script>`. Returns `None` where the sandbox cannot allocate
/// a PTY so callers can bail out instead of failing.
pub fn spawn_sh(manager: &SessionManager, script: &str) -> Option<SpawnedSession> {
    manager
        .spawn(SpawnOptions::new("sh").args(["-c", script]))
        .ok()
}

pub fn wait_text(manager: &SessionManager, id: &str, pattern: &str) -> bool {
    let session = manager.require(id).unwrap();
    let matcher = TextMatcher::new(pattern, None).unwrap();
    wait_for_text(session.as_ref(), &matcher, WAIT).found
}
