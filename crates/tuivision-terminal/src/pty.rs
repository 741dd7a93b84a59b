use std::collections::HashMap;
use std::io;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;

use crossbeam_channel as channel;
use portable_pty::Child;
use portable_pty::ChildKiller;
use portable_pty::CommandBuilder;
use portable_pty::MasterPty;
use portable_pty::PtySize;
use portable_pty::native_pty_system;
use tracing::{debug, warn};

use tuivision_common::mutex_lock_or_recover;

use crate::error::PtyError;
use crate::error::SpawnErrorKind;

/// Environment every child starts with; caller-supplied variables win.
const DEFAULT_ENV: &[(&str, &str)] = &[("TERM", "xterm-256color"), ("COLORTERM", "truecolor")];

const PTY_READ_CHANNEL_CAPACITY: usize = 256;
const PTY_READ_BUFFER_BYTES: usize = 8192;

/// Output observed on the PTY master.
#[derive(Debug)]
pub enum ReadEvent {
    Data(Vec<u8>),
    Eof,
    Error(String),
}

/// Delivered exactly once when the child is reaped. `code` is `None` when the
/// wait itself failed and no status could be observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub code: Option<u32>,
}

/// One child process attached to a pseudo-terminal.
///
/// Output and exit are handed off on channels fed by dedicated threads; take
/// them once with [`PtyHandle::take_read_rx`] and [`PtyHandle::take_exit_rx`].
pub struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    pid: Option<u32>,
    size: PtySize,
    exited: Arc<AtomicBool>,
    read_rx: Option<channel::Receiver<ReadEvent>>,
    exit_rx: Option<channel::Receiver<ChildExit>>,
}

impl Drop for PtyHandle {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.kill();
        }
    }
}

impl PtyHandle {
    pub fn spawn(
        command: &str,
        args: &[String],
        cwd: Option<&Path>,
        env: Option<&HashMap<String, String>>,
        cols: u16,
        rows: u16,
    ) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();

        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(size)
            .map_err(|e| PtyError::open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(command);
        cmd.args(args);

        match cwd {
            Some(dir) => cmd.cwd(dir),
            None => {
                if let Ok(dir) = std::env::current_dir() {
                    cmd.cwd(dir);
                }
            }
        }

        for (key, value) in DEFAULT_ENV {
            cmd.env(key, value);
        }
        if let Some(env_vars) = env {
            for (key, value) in env_vars {
                cmd.env(key, value);
            }
        }

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            let kind = match e.downcast_ref::<io::Error>().map(io::Error::kind) {
                Some(io::ErrorKind::NotFound) => SpawnErrorKind::NotFound,
                Some(io::ErrorKind::PermissionDenied) => SpawnErrorKind::PermissionDenied,
                _ => SpawnErrorKind::Other,
            };
            PtyError::Spawn {
                reason: e.to_string(),
                kind,
            }
        })?;

        let pid = child.process_id();
        let mut killer = child.clone_killer();
        let exited = Arc::new(AtomicBool::new(false));

        let exit_rx = match spawn_exit_waiter(child, Arc::clone(&exited)) {
            Ok(rx) => rx,
            Err(err) => {
                let _ = killer.kill();
                return Err(PtyError::Open {
                    reason: format!("failed to start exit watcher: {err}"),
                    source: Some(err),
                });
            }
        };

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::open(e.to_string()))?;
        let read_rx = spawn_reader(reader);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::open(e.to_string()))?;

        Ok(Self {
            master: pair.master,
            killer,
            writer: Arc::new(Mutex::new(writer)),
            pid,
            size,
            exited,
            read_rx: Some(read_rx),
            exit_rx: Some(exit_rx),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn size(&self) -> (u16, u16) {
        (self.size.cols, self.size.rows)
    }

    pub fn is_running(&self) -> bool {
        !self.exited.load(Ordering::Acquire)
    }

    pub fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        if data.is_empty() {
            return Ok(());
        }

        let mut writer = mutex_lock_or_recover(&self.writer);
        let mut offset = 0;
        while offset < data.len() {
            match writer.write(&data[offset..]) {
                Ok(0) => {
                    return Err(PtyError::Write {
                        reason: "write returned 0 bytes, PTY closed".to_string(),
                        source: None,
                    });
                }
                Ok(n) => offset += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.wait_writable()?;
                }
                Err(e) => return Err(PtyError::write(e)),
            }
        }
        writer.flush().map_err(PtyError::write)
    }

    fn wait_writable(&self) -> Result<(), PtyError> {
        #[cfg(unix)]
        {
            let Some(fd) = self.master.as_raw_fd() else {
                return Ok(());
            };
            let mut fds = [libc::pollfd {
                fd,
                events: libc::POLLOUT,
                revents: 0,
            }];
            loop {
                // SAFETY: `fds` is a valid, initialised array of one pollfd.
                let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, -1) };
                if rc < 0 {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(PtyError::write(err));
                }
                let events = fds[0].revents;
                if events & (libc::POLLHUP | libc::POLLERR) != 0 {
                    return Err(PtyError::Write {
                        reason: "PTY closed".to_string(),
                        source: None,
                    });
                }
                if events & libc::POLLOUT != 0 {
                    return Ok(());
                }
            }
        }
        #[cfg(not(unix))]
        {
            Ok(())
        }
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), PtyError> {
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self.master
            .resize(size)
            .map_err(|e| PtyError::Resize {
                reason: e.to_string(),
            })?;
        self.size = size;
        Ok(())
    }

    /// Terminates the child. A child that already exited is not an error.
    pub fn kill(&mut self) -> Result<(), PtyError> {
        if !self.is_running() {
            return Ok(());
        }

        match self.killer.kill() {
            Ok(()) => Ok(()),
            Err(_) if !self.is_running() => Ok(()),
            Err(e) => Err(PtyError::Kill {
                reason: e.to_string(),
                source: Some(e),
            }),
        }
    }

    pub fn take_read_rx(&mut self) -> Option<channel::Receiver<ReadEvent>> {
        self.read_rx.take()
    }

    pub fn take_exit_rx(&mut self) -> Option<channel::Receiver<ChildExit>> {
        self.exit_rx.take()
    }
}

fn spawn_reader(mut reader: Box<dyn Read + Send>) -> channel::Receiver<ReadEvent> {
    let (tx, rx) = channel::bounded(PTY_READ_CHANNEL_CAPACITY);
    let span = tracing::debug_span!("pty_reader");
    let builder = thread::Builder::new().name("pty-reader".to_string());
    let tx_thread = tx.clone();
    if let Err(err) = builder.spawn(move || {
        let _guard = span.enter();
        let mut buf = [0u8; PTY_READ_BUFFER_BYTES];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    let _ = tx_thread.send(ReadEvent::Eof);
                    debug!("PTY reader EOF");
                    break;
                }
                Ok(n) => {
                    if tx_thread.send(ReadEvent::Data(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Linux reports EIO on the master once the last slave fd closes.
                    debug!(error = %e, "PTY reader stopped");
                    let _ = tx_thread.send(ReadEvent::Error(e.to_string()));
                    break;
                }
            }
        }
    }) {
        let _ = tx.send(ReadEvent::Error(err.to_string()));
    }
    rx
}

fn spawn_exit_waiter(
    mut child: Box<dyn Child + Send + Sync>,
    exited: Arc<AtomicBool>,
) -> io::Result<channel::Receiver<ChildExit>> {
    let (tx, rx) = channel::bounded(1);
    thread::Builder::new()
        .name("pty-exit-waiter".to_string())
        .spawn(move || {
            let code = match child.wait() {
                Ok(status) => Some(status.exit_code()),
                Err(e) => {
                    warn!(error = %e, "Failed to wait for child process");
                    None
                }
            };
            exited.store(true, Ordering::Release);
            let _ = tx.send(ChildExit { code });
        })?;
    Ok(rx)
}
