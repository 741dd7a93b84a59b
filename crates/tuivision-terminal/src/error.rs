//! PTY and rendering errors with enough context for a controller to decide
//! what to do next.

use std::io;

use thiserror::Error;

/// Why the OS refused to start the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnErrorKind {
    NotFound,
    PermissionDenied,
    Other,
}

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open PTY: {reason}")]
    Open {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("Failed to spawn process: {reason}")]
    Spawn {
        reason: String,
        kind: SpawnErrorKind,
    },
    #[error("Failed to write to PTY: {reason}")]
    Write {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
    #[error("Failed to resize PTY: {reason}")]
    Resize { reason: String },
    #[error("Failed to terminate process: {reason}")]
    Kill {
        reason: String,
        #[source]
        source: Option<io::Error>,
    },
}

impl PtyError {
    pub(crate) fn open(reason: impl Into<String>) -> Self {
        PtyError::Open {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn write(err: io::Error) -> Self {
        PtyError::Write {
            reason: err.to_string(),
            source: Some(err),
        }
    }

    /// Returns the operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            PtyError::Open { .. } => "open",
            PtyError::Spawn { .. } => "spawn",
            PtyError::Write { .. } => "write",
            PtyError::Resize { .. } => "resize",
            PtyError::Kill { .. } => "kill",
        }
    }

    /// Returns the underlying reason for the error.
    pub fn reason(&self) -> &str {
        match self {
            PtyError::Open { reason, .. }
            | PtyError::Spawn { reason, .. }
            | PtyError::Write { reason, .. }
            | PtyError::Resize { reason }
            | PtyError::Kill { reason, .. } => reason,
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            PtyError::Open { .. } => {
                "PTY allocation failed. Check system resource limits (ulimit -n) or try again."
                    .to_string()
            }
            PtyError::Spawn { kind, .. } => match kind {
                SpawnErrorKind::NotFound => {
                    "Command not found. Check if the command exists and is in PATH.".to_string()
                }
                SpawnErrorKind::PermissionDenied => {
                    "Permission denied. Check file permissions.".to_string()
                }
                SpawnErrorKind::Other => {
                    "Process spawn failed. Check command syntax and permissions.".to_string()
                }
            },
            PtyError::Write { .. } => {
                "Failed to send input to the terminal. The process may have exited; list sessions to check."
                    .to_string()
            }
            PtyError::Resize { .. } => {
                "Failed to resize the terminal. Try again or restart the session.".to_string()
            }
            PtyError::Kill { .. } => {
                "The process could not be signalled. It may already have exited.".to_string()
            }
        }
    }

    /// Returns whether this error is potentially transient and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PtyError::Write { .. })
    }
}

/// Failure to rasterise a screen snapshot.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Cannot render a {cols}x{rows} screen")]
    EmptyScreen { cols: u16, rows: u16 },
    #[error("Image of {width}x{height} pixels exceeds the renderer limit")]
    TooLarge { width: u32, height: u32 },
    #[error("Failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}
