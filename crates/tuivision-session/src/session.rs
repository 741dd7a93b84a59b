//! One live child process, its screen model and its event stream.
//!
//! Output is processed on a dedicated pump thread per session. The pump is the
//! only place that feeds the renderer, publishes events and answers terminal
//! queries, so listeners always observe output in arrival order and the exit
//! notification after the last chunk of output.

use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use bytes::Bytes;
use chrono::DateTime;
use chrono::Utc;
use crossbeam_channel as channel;
use serde::Serialize;
use tracing::{debug, info, warn};

use tuivision_common::mutex_lock_or_recover;
use tuivision_terminal::ChildExit;
use tuivision_terminal::CursorPosition;
use tuivision_terminal::PtyError;
use tuivision_terminal::PtyHandle;
use tuivision_terminal::QueryResponder;
use tuivision_terminal::ReadEvent;
use tuivision_terminal::Renderer;
use tuivision_terminal::ScreenState;

use crate::clock::Clock;
use crate::clock::is_stale;
use crate::events::EventBus;
use crate::events::SessionEvent;
use crate::events::Subscription;
use crate::types::SessionId;

/// How long buffered output is drained after the child exits.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(50);
/// How long teardown waits for a killed child to be reaped.
const KILL_REAP_GRACE: Duration = Duration::from_secs(2);
const PUMP_COMMAND_CHANNEL_CAPACITY: usize = 4;

/// Why a session stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "code", rename_all = "snake_case")]
pub enum SessionExit {
    /// The process exited on its own. `None` when no status could be read.
    Exited(Option<u32>),
    /// The caller closed the session. Carries the exit code if the process
    /// was reaped afterwards.
    Closed(Option<u32>),
}

impl SessionExit {
    pub fn code(&self) -> Option<u32> {
        match self {
            SessionExit::Exited(code) | SessionExit::Closed(code) => *code,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionExit::Closed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Exited { code: Option<u32> },
    Closed { code: Option<u32> },
}

impl SessionStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionStatus::Running)
    }

    pub fn exit(&self) -> Option<SessionExit> {
        match *self {
            SessionStatus::Running => None,
            SessionStatus::Exited { code } => Some(SessionExit::Exited(code)),
            SessionStatus::Closed { code } => Some(SessionExit::Closed(code)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Exited { .. } => "exited",
            SessionStatus::Closed { .. } => "closed",
        }
    }
}

/// Snapshot row returned by `list`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub pid: Option<u32>,
    pub command: String,
    pub created_at: DateTime<Utc>,
    pub running: bool,
    pub status: &'static str,
    pub exit_code: Option<u32>,
    pub cols: u16,
    pub rows: u16,
}

enum PumpCommand {
    Shutdown,
}

struct SessionState {
    last_activity: Instant,
    status: SessionStatus,
}

type SharedRenderer = Arc<Mutex<Box<dyn Renderer>>>;

pub struct Session {
    id: SessionId,
    command: String,
    pid: Option<u32>,
    created_at: DateTime<Utc>,
    pty: Mutex<PtyHandle>,
    terminal: SharedRenderer,
    state: Mutex<SessionState>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    pump: Mutex<Option<channel::Sender<PumpCommand>>>,
}

impl Session {
    /// Wraps a freshly spawned child and starts its pump thread.
    pub(crate) fn start(
        id: SessionId,
        command: String,
        mut pty: PtyHandle,
        renderer: Box<dyn Renderer>,
        answer_queries: bool,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, PtyError> {
        let (read_rx, exit_rx) = match (pty.take_read_rx(), pty.take_exit_rx()) {
            (Some(read_rx), Some(exit_rx)) => (read_rx, exit_rx),
            _ => {
                return Err(PtyError::Open {
                    reason: "PTY channels were already taken".to_string(),
                    source: None,
                });
            }
        };

        let terminal: SharedRenderer = Arc::new(Mutex::new(renderer));
        let responder = answer_queries.then(|| {
            let terminal = Arc::clone(&terminal);
            QueryResponder::new(move || mutex_lock_or_recover(&terminal).cursor())
        });

        let (control_tx, control_rx) = channel::bounded(PUMP_COMMAND_CHANNEL_CAPACITY);
        let now = clock.now();
        let session = Arc::new(Self {
            id,
            command,
            pid: pty.pid(),
            created_at: Utc::now(),
            pty: Mutex::new(pty),
            terminal,
            state: Mutex::new(SessionState {
                last_activity: now,
                status: SessionStatus::Running,
            }),
            events: EventBus::new(),
            clock,
            pump: Mutex::new(Some(control_tx)),
        });

        let pump = Pump {
            session: Arc::clone(&session),
            read_rx,
            exit_rx,
            control_rx,
            responder,
        };
        if let Err(err) = thread::Builder::new()
            .name(format!("session-{}", session.id))
            .spawn(move || pump.run())
        {
            let _ = mutex_lock_or_recover(&session.pty).kill();
            return Err(PtyError::Open {
                reason: format!("failed to start session pump: {err}"),
                source: Some(err),
            });
        }

        Ok(session)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> SessionStatus {
        mutex_lock_or_recover(&self.state).status
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    pub fn last_activity(&self) -> Instant {
        mutex_lock_or_recover(&self.state).last_activity
    }

    /// `(cols, rows)`
    pub fn size(&self) -> (u16, u16) {
        mutex_lock_or_recover(&self.terminal).size()
    }

    pub fn cursor(&self) -> CursorPosition {
        mutex_lock_or_recover(&self.terminal).cursor()
    }

    pub fn screen_text(&self) -> String {
        mutex_lock_or_recover(&self.terminal).screen_text()
    }

    pub fn screen_state(&self) -> ScreenState {
        mutex_lock_or_recover(&self.terminal).screen_state()
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn info(&self) -> SessionInfo {
        let status = self.status();
        let (cols, rows) = self.size();
        SessionInfo {
            id: self.id.clone(),
            pid: self.pid,
            command: self.command.clone(),
            created_at: self.created_at,
            running: status.is_running(),
            status: status.as_str(),
            exit_code: status.exit().and_then(|exit| exit.code()),
            cols,
            rows,
        }
    }

    pub(crate) fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        self.touch();
        mutex_lock_or_recover(&self.pty).write(data)
    }

    pub(crate) fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        mutex_lock_or_recover(&self.pty).resize(cols, rows)?;
        mutex_lock_or_recover(&self.terminal).resize(cols, rows);
        Ok(())
    }

    pub(crate) fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        is_stale(self.last_activity(), now, idle_timeout)
    }

    /// Marks the session closed, stops the child and hands listener teardown
    /// to the pump. Callers must already have removed it from the registry.
    pub(crate) fn shutdown(&self) {
        let closed_now = {
            let mut state = mutex_lock_or_recover(&self.state);
            if state.status.is_running() {
                state.status = SessionStatus::Closed { code: None };
                true
            } else {
                false
            }
        };
        if closed_now {
            self.events
                .publish(SessionEvent::Exit(SessionExit::Closed(None)));
        }

        if let Err(err) = mutex_lock_or_recover(&self.pty).kill() {
            debug!(session_id = %self.id, error = %err, "Kill failed during close");
        }

        let pump = mutex_lock_or_recover(&self.pump).take();
        let handed_off = pump.is_some_and(|tx| tx.send(PumpCommand::Shutdown).is_ok());
        if !handed_off {
            self.events.close();
        }
    }

    fn touch(&self) {
        let now = self.clock.now();
        mutex_lock_or_recover(&self.state).last_activity = now;
    }

    fn handle_output(&self, data: Vec<u8>, responder: Option<&mut QueryResponder>) {
        self.touch();
        mutex_lock_or_recover(&self.terminal).process(&data);

        let chunk = Bytes::from(data);
        self.events.publish(SessionEvent::Data(chunk.clone()));

        let Some(responder) = responder else {
            return;
        };
        for reply in responder.scan(&chunk) {
            if let Err(err) = mutex_lock_or_recover(&self.pty).write(&reply) {
                warn!(session_id = %self.id, error = %err, "Failed to answer terminal query");
                break;
            }
        }
    }

    /// Records the observed exit. The first observation wins; a session that
    /// was closed first only gets its missing code filled in.
    fn record_exit(&self, code: Option<u32>) {
        let exit = {
            let mut state = mutex_lock_or_recover(&self.state);
            match state.status {
                SessionStatus::Running => {
                    state.status = SessionStatus::Exited { code };
                    Some(SessionExit::Exited(code))
                }
                SessionStatus::Closed { code: None } if code.is_some() => {
                    state.status = SessionStatus::Closed { code };
                    None
                }
                _ => None,
            }
        };
        if let Some(exit) = exit {
            info!(session_id = %self.id, pid = ?self.pid, code = ?code, "Session process exited");
            self.events.publish(SessionEvent::Exit(exit));
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("pid", &self.pid)
            .field("status", &self.status())
            .finish()
    }
}

struct Pump {
    session: Arc<Session>,
    read_rx: channel::Receiver<ReadEvent>,
    exit_rx: channel::Receiver<ChildExit>,
    control_rx: channel::Receiver<PumpCommand>,
    responder: Option<QueryResponder>,
}

impl Pump {
    fn run(mut self) {
        let _span = tracing::debug_span!("session_pump", session_id = %self.session.id).entered();
        let control_rx = self.control_rx.clone();
        let mut reader_done = false;
        let mut exit_seen = false;

        loop {
            let read_rx = if reader_done {
                channel::never()
            } else {
                self.read_rx.clone()
            };
            let exit_rx = if exit_seen {
                channel::never()
            } else {
                self.exit_rx.clone()
            };

            channel::select! {
                recv(control_rx) -> cmd => match cmd {
                    Ok(PumpCommand::Shutdown) | Err(_) => {
                        self.teardown(exit_seen);
                        return;
                    }
                },
                recv(read_rx) -> event => match event {
                    Ok(ReadEvent::Data(data)) => {
                        self.session.handle_output(data, self.responder.as_mut());
                    }
                    Ok(ReadEvent::Eof) | Ok(ReadEvent::Error(_)) | Err(_) => reader_done = true,
                },
                recv(exit_rx) -> exit => {
                    exit_seen = true;
                    if !reader_done {
                        self.drain_output();
                        reader_done = true;
                    }
                    let code = exit.ok().and_then(|exit| exit.code);
                    self.session.record_exit(code);
                },
            }
        }
    }

    /// Delivers output still buffered when the child exits.
    fn drain_output(&mut self) {
        let deadline = Instant::now() + EXIT_DRAIN_GRACE;
        while let Ok(ReadEvent::Data(data)) = self.read_rx.recv_deadline(deadline) {
            self.session.handle_output(data, self.responder.as_mut());
        }
    }

    fn teardown(&self, exit_seen: bool) {
        self.session.events.close();
        if exit_seen {
            return;
        }
        match self.exit_rx.recv_timeout(KILL_REAP_GRACE) {
            Ok(exit) => self.session.record_exit(exit.code),
            Err(_) => {
                debug!(session_id = %self.session.id, "Closed session was not reaped in time");
            }
        }
    }
}
