//! Per-session publish/subscribe of output and exit notifications.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Instant;

use bytes::Bytes;
use crossbeam_channel as channel;

use tuivision_common::mutex_lock_or_recover;

use crate::session::SessionExit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// One chunk of raw child output, already applied to the screen.
    Data(Bytes),
    /// The session stopped running. Always the last event published.
    Exit(SessionExit),
}

#[derive(Default)]
struct Listeners {
    entries: Vec<(u64, channel::Sender<SessionEvent>)>,
    /// Set by the first `Exit`; later events are dropped.
    exited: bool,
    closed: bool,
}

type SharedListeners = Arc<Mutex<Listeners>>;

#[derive(Default)]
pub struct EventBus {
    listeners: SharedListeners,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. On a closed bus the subscription is already
    /// disconnected.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = channel::unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut listeners = mutex_lock_or_recover(&self.listeners);
            if !listeners.closed {
                listeners.entries.push((id, tx));
            }
        }
        Subscription {
            receiver: rx,
            listeners: Arc::clone(&self.listeners),
            id,
        }
    }

    /// Delivers `event` to every listener. Nothing is delivered after the
    /// first `Exit`, whichever thread publishes it.
    pub fn publish(&self, event: SessionEvent) {
        let mut listeners = mutex_lock_or_recover(&self.listeners);
        if listeners.exited {
            return;
        }
        if matches!(event, SessionEvent::Exit(_)) {
            listeners.exited = true;
        }
        listeners
            .entries
            .retain(|(_, sender)| sender.send(event.clone()).is_ok());
    }

    /// Drops every listener; later subscriptions start disconnected.
    pub fn close(&self) {
        let mut listeners = mutex_lock_or_recover(&self.listeners);
        listeners.closed = true;
        listeners.entries.clear();
    }

    pub fn is_closed(&self) -> bool {
        mutex_lock_or_recover(&self.listeners).closed
    }

    pub fn listener_count(&self) -> usize {
        mutex_lock_or_recover(&self.listeners).entries.len()
    }
}

/// A live registration on an [`EventBus`]. Dropping it unsubscribes.
pub struct Subscription {
    receiver: channel::Receiver<SessionEvent>,
    listeners: SharedListeners,
    id: u64,
}

impl Subscription {
    pub fn receiver(&self) -> &channel::Receiver<SessionEvent> {
        &self.receiver
    }

    pub fn recv_deadline(
        &self,
        deadline: Instant,
    ) -> Result<SessionEvent, channel::RecvTimeoutError> {
        self.receiver.recv_deadline(deadline)
    }

    pub fn try_recv(&self) -> Result<SessionEvent, channel::TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut listeners = mutex_lock_or_recover(&self.listeners);
        listeners.entries.retain(|(id, _)| *id != self.id);
    }
}
