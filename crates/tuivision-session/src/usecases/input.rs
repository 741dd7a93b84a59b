use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tuivision_terminal::key_to_escape_sequence;

use crate::error::SessionError;
use crate::manager::SessionManager;

/// Input for one write. Parts are sent in this order: `key`, `input`,
/// then each entry of `keys`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendInput {
    pub session_id: String,
    /// Raw text, sent as-is.
    pub input: Option<String>,
    /// A single named key. Unknown names are rejected.
    pub key: Option<String>,
    /// Named keys or raw text; entries that are not key names are sent as text.
    pub keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendInputOutput {
    pub success: bool,
    /// What was written, with control characters shown as `\xNN`.
    pub sent: String,
}

impl SendInput {
    fn to_bytes(&self) -> Result<Vec<u8>, SessionError> {
        let mut bytes = Vec::new();

        if let Some(key) = &self.key {
            let seq =
                key_to_escape_sequence(key).ok_or_else(|| SessionError::InvalidKey(key.clone()))?;
            bytes.extend(seq);
        }
        if let Some(text) = &self.input {
            bytes.extend_from_slice(text.as_bytes());
        }
        for entry in self.keys.iter().flatten() {
            match key_to_escape_sequence(entry) {
                Some(seq) => bytes.extend(seq),
                None => bytes.extend_from_slice(entry.as_bytes()),
            }
        }

        if bytes.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        Ok(bytes)
    }
}

pub struct SendInputUseCase {
    manager: Arc<SessionManager>,
}

impl SendInputUseCase {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    #[tracing::instrument(skip(self, input), fields(session = %input.session_id))]
    pub fn execute(&self, input: SendInput) -> Result<SendInputOutput, SessionError> {
        let bytes = input.to_bytes()?;
        self.manager.send_input(&input.session_id, &bytes)?;
        Ok(SendInputOutput {
            success: true,
            sent: escape_control_chars(&String::from_utf8_lossy(&bytes)),
        })
    }
}

/// Renders C0 control characters as `\xNN` so echoed input stays readable.
pub fn escape_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch < '\u{20}' {
            out.push_str(&format!("\\x{:02x}", ch as u32));
        } else {
            out.push(ch);
        }
    }
    out
}
