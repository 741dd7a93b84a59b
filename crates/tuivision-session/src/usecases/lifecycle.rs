use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::SessionError;
use crate::manager::SessionManager;
use crate::types::SessionId;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloseInput {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseOutput {
    pub success: bool,
    pub message: String,
}

pub struct CloseUseCase {
    manager: Arc<SessionManager>,
}

impl CloseUseCase {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    #[tracing::instrument(skip(self, input), fields(session = %input.session_id))]
    pub fn execute(&self, input: CloseInput) -> Result<CloseOutput, SessionError> {
        self.manager.close(&input.session_id)?;
        Ok(CloseOutput {
            success: true,
            message: format!("Session {} closed", input.session_id),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedSession {
    pub id: SessionId,
    pub pid: Option<u32>,
    pub command: String,
    pub created_at: DateTime<Utc>,
    pub age_seconds: i64,
    pub running: bool,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<u32>,
    pub cols: u16,
    pub rows: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListOutput {
    pub sessions: Vec<ListedSession>,
}

pub struct ListUseCase {
    manager: Arc<SessionManager>,
}

impl ListUseCase {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    pub fn execute(&self) -> ListOutput {
        let now = Utc::now();
        let sessions = self
            .manager
            .list()
            .into_iter()
            .map(|info| ListedSession {
                age_seconds: (now - info.created_at).num_seconds().max(0),
                id: info.id,
                pid: info.pid,
                command: info.command,
                created_at: info.created_at,
                running: info.running,
                status: info.status,
                exit_code: info.exit_code,
                cols: info.cols,
                rows: info.rows,
            })
            .collect();
        ListOutput { sessions }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResizeInput {
    pub session_id: String,
    pub cols: u32,
    pub rows: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResizeOutput {
    pub success: bool,
    pub cols: u32,
    pub rows: u32,
}

pub struct ResizeUseCase {
    manager: Arc<SessionManager>,
}

impl ResizeUseCase {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    #[tracing::instrument(skip(self, input), fields(session = %input.session_id, cols = input.cols, rows = input.rows))]
    pub fn execute(&self, input: ResizeInput) -> Result<ResizeOutput, SessionError> {
        self.manager
            .resize(&input.session_id, input.cols, input.rows)?;
        Ok(ResizeOutput {
            success: true,
            cols: input.cols,
            rows: input.rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;

    fn manager() -> Arc<SessionManager> {
        Arc::new(SessionManager::new(ManagerConfig::default()))
    }

    #[test]
    fn test_close_unknown_session() {
        let usecase = CloseUseCase::new(manager());
        let err = usecase
            .execute(CloseInput {
                session_id: "gone".into(),
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Session not found: gone");
    }

    #[test]
    fn test_list_empty() {
        let usecase = ListUseCase::new(manager());
        let json = serde_json::to_value(usecase.execute()).unwrap();
        assert_eq!(json, serde_json::json!({ "sessions": [] }));
    }

    #[test]
    fn test_resize_bounds_checked_first() {
        let usecase = ResizeUseCase::new(manager());
        for (cols, rows) in [(0, 10), (501, 10), (80, 0), (80, 201)] {
            let result = usecase.execute(ResizeInput {
                session_id: "any".into(),
                cols,
                rows,
            });
            assert!(matches!(
                result,
                Err(SessionError::InvalidDimensions { .. })
            ));
        }
    }
}
