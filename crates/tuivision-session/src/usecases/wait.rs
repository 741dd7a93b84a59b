use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::SessionError;
use crate::manager::SessionManager;
use crate::session::SessionExit;
use crate::wait::DEFAULT_CHANGE_TIMEOUT;
use crate::wait::DEFAULT_STABLE;
use crate::wait::DEFAULT_TEXT_TIMEOUT;
use crate::wait::TextMatcher;
use crate::wait::wait_for_screen_change;
use crate::wait::wait_for_text;

fn default_text_timeout_ms() -> u64 {
    millis(DEFAULT_TEXT_TIMEOUT)
}

fn default_change_timeout_ms() -> u64 {
    millis(DEFAULT_CHANGE_TIMEOUT)
}

fn default_stable_ms() -> u64 {
    millis(DEFAULT_STABLE)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WaitForTextInput {
    pub session_id: String,
    pub pattern: String,
    /// Regex flags in JavaScript notation, e.g. `"im"`.
    pub flags: Option<String>,
    #[serde(default = "default_text_timeout_ms")]
    pub timeout_ms: u64,
}

impl WaitForTextInput {
    pub fn new(session_id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            pattern: pattern.into(),
            flags: None,
            timeout_ms: default_text_timeout_ms(),
        }
    }
}

/// How a wait ended, flattened for callers that speak JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExitSummary {
    pub exited: bool,
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<u32>,
}

impl From<Option<SessionExit>> for ExitSummary {
    fn from(exit: Option<SessionExit>) -> Self {
        match exit {
            None => Self::default(),
            Some(exit) => Self {
                exited: true,
                closed: exit.is_closed(),
                exit_code: exit.code(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitForTextOutput {
    pub found: bool,
    pub elapsed_ms: u64,
    pub screen_text: String,
    #[serde(flatten)]
    pub exit: ExitSummary,
}

pub struct WaitForTextUseCase {
    manager: Arc<SessionManager>,
}

impl WaitForTextUseCase {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    #[tracing::instrument(skip(self, input), fields(session = %input.session_id, pattern = %input.pattern))]
    pub fn execute(&self, input: WaitForTextInput) -> Result<WaitForTextOutput, SessionError> {
        let matcher = TextMatcher::new(&input.pattern, input.flags.as_deref())?;
        let session = self.manager.require(&input.session_id)?;

        let outcome = wait_for_text(
            session.as_ref(),
            &matcher,
            Duration::from_millis(input.timeout_ms),
        );
        tracing::debug!(found = outcome.found, elapsed = ?outcome.elapsed, "Text wait finished");

        Ok(WaitForTextOutput {
            found: outcome.found,
            elapsed_ms: millis(outcome.elapsed),
            screen_text: outcome.screen_text,
            exit: outcome.exit.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WaitForChangeInput {
    pub session_id: String,
    #[serde(default = "default_change_timeout_ms")]
    pub timeout_ms: u64,
    /// How long the screen must stay quiet after a change.
    #[serde(default = "default_stable_ms")]
    pub stable_ms: u64,
}

impl WaitForChangeInput {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            timeout_ms: default_change_timeout_ms(),
            stable_ms: default_stable_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitForChangeOutput {
    pub changed: bool,
    pub elapsed_ms: u64,
    pub screen_text: String,
    #[serde(flatten)]
    pub exit: ExitSummary,
}

pub struct WaitForChangeUseCase {
    manager: Arc<SessionManager>,
}

impl WaitForChangeUseCase {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    #[tracing::instrument(skip(self, input), fields(session = %input.session_id))]
    pub fn execute(&self, input: WaitForChangeInput) -> Result<WaitForChangeOutput, SessionError> {
        let session = self.manager.require(&input.session_id)?;

        let outcome = wait_for_screen_change(
            session.as_ref(),
            Duration::from_millis(input.timeout_ms),
            Duration::from_millis(input.stable_ms),
        );

        Ok(WaitForChangeOutput {
            changed: outcome.changed,
            elapsed_ms: millis(outcome.elapsed),
            screen_text: outcome.screen_text,
            exit: outcome.exit.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;

    #[test]
    fn test_input_defaults() {
        let input: WaitForTextInput =
            serde_json::from_str(r#"{"session_id":"a","pattern":"\\$ $"}"#).unwrap();
        assert_eq!(input.timeout_ms, 10_000);
        assert_eq!(input.flags, None);

        let input: WaitForChangeInput = serde_json::from_str(r#"{"session_id":"a"}"#).unwrap();
        assert_eq!(input.timeout_ms, 5_000);
        assert_eq!(input.stable_ms, 300);
    }

    #[test]
    fn test_pattern_is_checked_before_session_lookup() {
        let manager = Arc::new(SessionManager::new(ManagerConfig::default()));
        let usecase = WaitForTextUseCase::new(manager);

        let err = usecase
            .execute(WaitForTextInput::new("missing", "(unclosed"))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidPattern { .. }));

        let err = usecase
            .execute(WaitForTextInput::new("missing", "ok"))
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[test]
    fn test_exit_summary_flattening() {
        let output = WaitForTextOutput {
            found: false,
            elapsed_ms: 12,
            screen_text: String::new(),
            exit: Some(SessionExit::Exited(Some(3))).into(),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["exited"], true);
        assert_eq!(json["closed"], false);
        assert_eq!(json["exit_code"], 3);

        let running = WaitForChangeOutput {
            changed: true,
            elapsed_ms: 0,
            screen_text: "x".into(),
            exit: ExitSummary::default(),
        };
        let json = serde_json::to_value(&running).unwrap();
        assert_eq!(json["exited"], false);
        assert!(json.get("exit_code").is_none());
    }

    #[test]
    fn test_closed_without_code() {
        let summary = ExitSummary::from(Some(SessionExit::Closed(None)));
        assert!(summary.exited);
        assert!(summary.closed);
        assert_eq!(summary.exit_code, None);
    }
}
