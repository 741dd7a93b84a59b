use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;

use crossbeam_channel as channel;
use tracing::{debug, info, warn};

use tuivision_common::mutex_lock_or_recover;
use tuivision_common::rwlock_read_or_recover;
use tuivision_common::rwlock_write_or_recover;
use tuivision_terminal::PtyHandle;
use tuivision_terminal::VirtualTerminal;

use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::config::ManagerConfig;
use crate::error::SessionError;
use crate::session::Session;
use crate::session::SessionInfo;
use crate::types::DEFAULT_COLS;
use crate::types::DEFAULT_ROWS;
use crate::types::SessionId;
use crate::types::validate_dimensions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
    pub command: String,
    pub args: Vec<String>,
    pub cols: u16,
    pub rows: u16,
    pub env: Option<HashMap<String, String>>,
    pub cwd: Option<PathBuf>,
    /// Run the command under `script(1)` for programs that insist on a
    /// controlling terminal of their own.
    pub use_script: bool,
    pub answer_queries: bool,
}

impl SpawnOptions {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            env: None,
            cwd: None,
            use_script: false,
            answer_queries: true,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn use_script(mut self, use_script: bool) -> Self {
        self.use_script = use_script;
        self
    }

    pub fn answer_queries(mut self, answer_queries: bool) -> Self {
        self.answer_queries = answer_queries;
        self
    }

    /// The program and argument vector actually executed.
    fn program(&self) -> (String, Vec<String>) {
        if self.use_script {
            let inner = if self.args.is_empty() {
                self.command.clone()
            } else {
                let mut words = vec![self.command.as_str()];
                words.extend(self.args.iter().map(String::as_str));
                shell_words::join(words)
            };
            return (
                "script".to_string(),
                vec!["-q".into(), "-c".into(), inner, "/dev/null".into()],
            );
        }

        if self.args.is_empty() {
            if let Ok(mut words) = shell_words::split(&self.command) {
                if words.len() > 1 {
                    let program = words.remove(0);
                    return (program, words);
                }
            }
        }
        (self.command.clone(), self.args.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnedSession {
    pub id: SessionId,
    pub pid: Option<u32>,
    pub cols: u16,
    pub rows: u16,
}

struct Sweeper {
    shutdown_tx: channel::Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// Owns every live session.
///
/// Lock ordering: the registry lock is never held while a session's own
/// locks are taken, so sessions can be closed from any thread.
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    config: ManagerConfig,
    clock: Arc<dyn Clock>,
    disposed: AtomicBool,
    sweeper: Mutex<Option<Sweeper>>,
}

impl SessionManager {
    /// A manager without a background sweep; call
    /// [`SessionManager::close_idle_sessions`] to reclaim idle sessions.
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: ManagerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            clock,
            disposed: AtomicBool::new(false),
            sweeper: Mutex::new(None),
        }
    }

    /// A manager that closes idle sessions every `sweep_interval`.
    pub fn start(config: ManagerConfig) -> Arc<Self> {
        Self::start_with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn start_with_clock(config: ManagerConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let manager = Arc::new(Self::with_clock(config, clock));
        manager.spawn_sweeper();
        manager
    }

    fn spawn_sweeper(self: &Arc<Self>) {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.sweep_interval();

        let spawned = thread::Builder::new()
            .name("session-sweeper".to_string())
            .spawn(move || {
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(channel::RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(channel::RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(manager) = weak.upgrade() else {
                        break;
                    };
                    manager.close_idle_sessions();
                }
                debug!("Session sweeper stopped");
            });

        match spawned {
            Ok(handle) => {
                *mutex_lock_or_recover(&self.sweeper) = Some(Sweeper {
                    shutdown_tx,
                    handle,
                });
            }
            Err(err) => {
                warn!(error = %err, "Failed to start session sweeper; idle sessions will not be reclaimed");
            }
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn spawn(&self, options: SpawnOptions) -> Result<SpawnedSession, SessionError> {
        let (cols, rows) = validate_dimensions(u32::from(options.cols), u32::from(options.rows))?;

        let max_sessions = self.config.max_sessions();
        if self.session_count() >= max_sessions {
            return Err(SessionError::LimitReached(max_sessions));
        }

        let (program, args) = options.program();
        let pty = PtyHandle::spawn(
            &program,
            &args,
            options.cwd.as_deref(),
            options.env.as_ref(),
            cols,
            rows,
        )?;

        let id = SessionId::generate();
        let session = Session::start(
            id.clone(),
            options.command.clone(),
            pty,
            Box::new(VirtualTerminal::new(cols, rows)),
            options.answer_queries,
            Arc::clone(&self.clock),
        )?;
        let pid = session.pid();

        {
            let mut sessions = rwlock_write_or_recover(&self.sessions);
            if sessions.len() >= max_sessions {
                drop(sessions);
                session.shutdown();
                return Err(SessionError::LimitReached(max_sessions));
            }
            sessions.insert(id.clone(), session);
        }

        info!(session_id = %id, pid = ?pid, command = %options.command, cols, rows, "Session spawned");

        Ok(SpawnedSession {
            id,
            pid,
            cols,
            rows,
        })
    }

    /// Looks up a live session. A missing id is not an error here.
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        rwlock_read_or_recover(&self.sessions)
            .get(session_id)
            .cloned()
    }

    pub fn require(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        self.get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    pub fn send_input(&self, session_id: &str, data: &[u8]) -> Result<(), SessionError> {
        let session = self.require(session_id)?;
        session.write(data)?;
        Ok(())
    }

    pub fn resize(&self, session_id: &str, cols: u32, rows: u32) -> Result<(), SessionError> {
        let (cols, rows) = validate_dimensions(cols, rows)?;
        let session = self.require(session_id)?;
        session.resize(cols, rows)?;
        debug!(session_id, cols, rows, "Session resized");
        Ok(())
    }

    /// Removes the session and stops its process. A second close of the same
    /// id reports `NotFound`.
    pub fn close(&self, session_id: &str) -> Result<(), SessionError> {
        let session = rwlock_write_or_recover(&self.sessions)
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.shutdown();
        info!(session_id, "Session closed");
        Ok(())
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = rwlock_read_or_recover(&self.sessions)
            .values()
            .cloned()
            .collect();
        let mut infos: Vec<SessionInfo> = sessions.iter().map(|s| s.info()).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        infos
    }

    pub fn session_count(&self) -> usize {
        rwlock_read_or_recover(&self.sessions).len()
    }

    /// Closes every session idle for longer than the configured timeout.
    /// Returns how many were closed.
    pub fn close_idle_sessions(&self) -> usize {
        let now = self.clock.now();
        let idle_timeout = self.config.idle_timeout();
        let stale: Vec<SessionId> = rwlock_read_or_recover(&self.sessions)
            .iter()
            .filter(|(_, session)| session.is_idle(now, idle_timeout))
            .map(|(id, _)| id.clone())
            .collect();

        let mut closed = 0;
        for id in stale {
            // A concurrent close may have won; that is not an error here.
            if self.close(&id).is_ok() {
                closed += 1;
            }
        }
        if closed > 0 {
            info!(closed, "Closed idle sessions");
        }
        closed
    }

    /// Stops the sweep and closes every session. Safe to call repeatedly.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(sweeper) = mutex_lock_or_recover(&self.sweeper).take() {
            let _ = sweeper.shutdown_tx.send(());
            // The sweeper itself may drop the last reference.
            if sweeper.handle.thread().id() != thread::current().id() {
                let _ = sweeper.handle.join();
            }
        }

        let ids: Vec<SessionId> = rwlock_read_or_recover(&self.sessions)
            .keys()
            .cloned()
            .collect();
        for id in ids {
            let _ = self.close(&id);
        }
        debug!("Session manager disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
