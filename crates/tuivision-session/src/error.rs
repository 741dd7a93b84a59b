//! Errors surfaced by session operations.
//!
//! Every error carries a stable numeric code and a category so a controller
//! can react without parsing messages.

use serde_json::{Value, json};
use thiserror::Error;
use tuivision_terminal::PtyError;
use tuivision_terminal::RenderError;
use tuivision_terminal::SpawnErrorKind;

pub mod codes {
    //! Numeric codes in the JSON-RPC server-error range.

    pub const SESSION_NOT_FOUND: i32 = -32001;
    pub const INVALID_KEY: i32 = -32005;
    pub const SESSION_LIMIT: i32 = -32006;
    pub const PTY_ERROR: i32 = -32008;
    pub const RENDER_FAILED: i32 = -32009;
    pub const COMMAND_NOT_FOUND: i32 = -32014;
    pub const PERMISSION_DENIED: i32 = -32015;
    pub const INVALID_PARAMS: i32 = -32602;
}

/// Error category for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Resource not found (session)
    NotFound,
    /// Invalid input parameters
    InvalidInput,
    /// Resource exhausted
    Busy,
    /// External dependency failure (PTY, process)
    External,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Busy => "busy",
            ErrorCategory::External => "external",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("Invalid dimensions {cols}x{rows}: cols must be 1-{max_cols}, rows 1-{max_rows}")]
    InvalidDimensions {
        cols: u32,
        rows: u32,
        max_cols: u16,
        max_rows: u16,
    },
    #[error("Unknown key: {0}")]
    InvalidKey(String),
    #[error("No input provided. Specify text, a key or a list of keys")]
    EmptyInput,
    #[error("Session limit reached: maximum {0} sessions allowed")]
    LimitReached(usize),
    #[error("PTY error: {0}")]
    Pty(#[from] PtyError),
    #[error("Screenshot failed: {0}")]
    Render(#[from] RenderError),
}

impl SessionError {
    pub fn code(&self) -> i32 {
        match self {
            SessionError::NotFound(_) => codes::SESSION_NOT_FOUND,
            SessionError::InvalidPattern { .. }
            | SessionError::InvalidDimensions { .. }
            | SessionError::EmptyInput => codes::INVALID_PARAMS,
            SessionError::InvalidKey(_) => codes::INVALID_KEY,
            SessionError::LimitReached(_) => codes::SESSION_LIMIT,
            SessionError::Pty(PtyError::Spawn { kind, .. }) => match kind {
                SpawnErrorKind::NotFound => codes::COMMAND_NOT_FOUND,
                SpawnErrorKind::PermissionDenied => codes::PERMISSION_DENIED,
                SpawnErrorKind::Other => codes::PTY_ERROR,
            },
            SessionError::Pty(_) => codes::PTY_ERROR,
            SessionError::Render(_) => codes::RENDER_FAILED,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::NotFound(_) => ErrorCategory::NotFound,
            SessionError::InvalidPattern { .. }
            | SessionError::InvalidDimensions { .. }
            | SessionError::InvalidKey(_)
            | SessionError::EmptyInput => ErrorCategory::InvalidInput,
            SessionError::LimitReached(_) => ErrorCategory::Busy,
            SessionError::Pty(_) | SessionError::Render(_) => ErrorCategory::External,
        }
    }

    /// Structured details about the failure.
    pub fn context(&self) -> Value {
        match self {
            SessionError::NotFound(id) => json!({ "session_id": id }),
            SessionError::InvalidPattern { pattern, reason } => {
                json!({ "pattern": pattern, "reason": reason })
            }
            SessionError::InvalidDimensions { cols, rows, .. } => {
                json!({ "cols": cols, "rows": rows })
            }
            SessionError::InvalidKey(key) => json!({ "key": key }),
            SessionError::EmptyInput => json!({}),
            SessionError::LimitReached(max) => json!({ "max_sessions": max }),
            SessionError::Pty(pty_err) => {
                json!({ "operation": pty_err.operation(), "reason": pty_err.reason() })
            }
            SessionError::Render(err) => json!({ "operation": "screenshot", "reason": err.to_string() }),
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            SessionError::NotFound(_) => {
                "List sessions to see the live ids, or spawn a new session.".to_string()
            }
            SessionError::InvalidPattern { .. } => {
                "Check the regular expression syntax. Supported flags are i, m and s.".to_string()
            }
            SessionError::InvalidDimensions { .. } => {
                "Pick a size within the allowed bounds.".to_string()
            }
            SessionError::InvalidKey(_) => format!(
                "Known keys: {}. Modifiers: ctrl+<letter>, alt+<key>, shift+tab.",
                tuivision_terminal::KEY_NAMES.join(", ")
            ),
            SessionError::EmptyInput => {
                "Pass raw text, a key name, or a list of keys.".to_string()
            }
            SessionError::LimitReached(_) => {
                "Close unused sessions or raise TUIVISION_MAX_SESSIONS.".to_string()
            }
            SessionError::Pty(pty_err) => pty_err.suggestion(),
            SessionError::Render(RenderError::TooLarge { .. }) => {
                "Use a smaller font size or request the SVG format.".to_string()
            }
            SessionError::Render(_) => "Request the SVG format instead.".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Pty(pty_err) => pty_err.is_retryable(),
            SessionError::LimitReached(_) => true,
            _ => false,
        }
    }
}
