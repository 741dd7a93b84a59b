//! Session identifier and terminal size bounds.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use serde::Serialize;
use uuid::Uuid;

use crate::error::SessionError;

pub const MIN_COLS: u16 = 1;
pub const MAX_COLS: u16 = 500;
pub const MIN_ROWS: u16 = 1;
pub const MAX_ROWS: u16 = 200;

pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string()[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for SessionId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Checks caller-supplied dimensions before they reach the PTY.
pub fn validate_dimensions(cols: u32, rows: u32) -> Result<(u16, u16), SessionError> {
    let in_bounds = (u32::from(MIN_COLS)..=u32::from(MAX_COLS)).contains(&cols)
        && (u32::from(MIN_ROWS)..=u32::from(MAX_ROWS)).contains(&rows);
    if !in_bounds {
        return Err(SessionError::InvalidDimensions {
            cols,
            rows,
            max_cols: MAX_COLS,
            max_rows: MAX_ROWS,
        });
    }
    // Bounds above fit in u16.
    Ok((cols as u16, rows as u16))
}
