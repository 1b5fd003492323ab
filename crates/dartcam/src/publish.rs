//! Best-effort status broadcast to any number of observers.
//!
//! Each observer owns the receiving end of a bounded channel and drains it
//! on its own thread. Publishing never blocks: a payload is dropped for an
//! observer whose queue is full, and an observer whose receiver has been
//! dropped is removed on the next publish.

use std::sync::mpsc::{
    self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dartcam_scoring::{VisitOutcome, VisitPhase};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Serialized once per publish and pushed to every observer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub frame: u64,
    pub calibrated: bool,
    pub landmarks: usize,
    pub phase: VisitPhase,
    /// Labels of the locked darts, e.g. `["T20", "5"]`.
    pub darts: Vec<String>,
    pub visit_score: Option<i32>,
    pub outcome: Option<VisitOutcome>,
    /// Score left for the player the visit belongs to. While the darts are
    /// being pulled this is still the player who threw them, even though the
    /// scoreboard has already moved on.
    pub player_score: i32,
    pub fps: f64,
}

/// Per-observer queue length used by [`Broadcaster::new`].
pub const DEFAULT_MAX_PENDING: usize = 64;

type Observers = Arc<Mutex<Vec<SyncSender<String>>>>;

#[derive(Clone, Debug)]
pub struct Broadcaster {
    observers: Observers,
    max_pending: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::with_max_pending(DEFAULT_MAX_PENDING)
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue at most `max_pending` payloads per observer (at least 1).
    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            observers: Observers::default(),
            max_pending: max_pending.max(1),
        }
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    fn observers(&self) -> MutexGuard<'_, Vec<SyncSender<String>>> {
        // a panicked observer thread cannot leave the list half-updated
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self) -> Observer {
        let (tx, rx) = mpsc::sync_channel(self.max_pending);
        self.observers().push(tx);
        Observer { rx }
    }

    pub fn observer_count(&self) -> usize {
        self.observers().len()
    }

    /// Push `payload` to every live observer. Returns how many received it.
    pub fn publish(&self, payload: &StatusPayload) -> usize {
        let message = match serde_json::to_string(payload) {
            Ok(m) => m,
            Err(err) => {
                warn!("status payload not serializable: {err}");
                return 0;
            }
        };
        self.publish_raw(message)
    }

    pub fn publish_raw(&self, message: String) -> usize {
        let mut observers = self.observers();
        let before = observers.len();
        let mut delivered = 0;
        let mut full = 0;
        observers.retain(|tx| match tx.try_send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                full += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        let gone = before - observers.len();
        if gone > 0 {
            debug!("{gone} observer(s) disconnected");
        }
        if full > 0 {
            debug!("status dropped for {full} lagging observer(s)");
        }
        delivered
    }
}

/// Receiving side of a subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Observer {
    rx: Receiver<String>,
}

impl Observer {
    /// Block until the next message. `None` once the broadcaster is gone.
    pub fn recv(&self) -> Option<String> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<String> {
        match self.rx.recv_timeout(timeout) {
            Ok(m) => Some(m),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Everything already queued, without blocking.
    pub fn drain(&self) -> Vec<String> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(m) => out.push(m),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return out,
            }
        }
    }
}

impl Iterator for Observer {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.recv()
    }
}
