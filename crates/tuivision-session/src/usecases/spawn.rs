use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::error::SessionError;
use crate::manager::SessionManager;
use crate::manager::SpawnOptions;
use crate::types::DEFAULT_COLS;
use crate::types::DEFAULT_ROWS;
use crate::types::SessionId;
use crate::types::validate_dimensions;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpawnInput {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cols: Option<u32>,
    pub rows: Option<u32>,
    pub env: Option<HashMap<String, String>>,
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub use_script: bool,
    #[serde(default = "default_answer_queries")]
    pub answer_queries: bool,
}

fn default_answer_queries() -> bool {
    true
}

impl SpawnInput {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cols: None,
            rows: None,
            env: None,
            cwd: None,
            use_script: false,
            answer_queries: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpawnOutput {
    pub session_id: SessionId,
    pub pid: Option<u32>,
    pub cols: u16,
    pub rows: u16,
}

pub struct SpawnUseCase {
    manager: Arc<SessionManager>,
}

impl SpawnUseCase {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    #[tracing::instrument(skip(self, input), fields(command = %input.command))]
    pub fn execute(&self, input: SpawnInput) -> Result<SpawnOutput, SessionError> {
        let (cols, rows) = validate_dimensions(
            input.cols.unwrap_or(u32::from(DEFAULT_COLS)),
            input.rows.unwrap_or(u32::from(DEFAULT_ROWS)),
        )?;

        let mut options = SpawnOptions::new(input.command)
            .args(input.args)
            .size(cols, rows)
            .use_script(input.use_script)
            .answer_queries(input.answer_queries);
        if let Some(env) = input.env {
            options = options.env(env);
        }
        if let Some(cwd) = input.cwd {
            options = options.cwd(cwd);
        }

        let spawned = self.manager.spawn(options)?;
        Ok(SpawnOutput {
            session_id: spawned.id,
            pid: spawned.pid,
            cols: spawned.cols,
            rows: spawned.rows,
        })
    }
}
