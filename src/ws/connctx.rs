use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use super::capabilities::Role;
use super::close_code::CloseReason;
use super::docctx::DocKey;

/// Out-of-band instructions for a connection's writer. These travel on an
/// unbounded channel so they are never lost to frame backpressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Ping,
    Close(CloseReason),
}

/// Result of queueing a frame for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    Full,
    Gone,
}

/// The room-facing side of a live connection.
#[derive(Clone)]
pub struct ConnHandle {
    id: Uuid,
    user_id: String,
    role: Role,
    alive: Arc<AtomicBool>,
    frames: mpsc::Sender<Arc<Vec<u8>>>,
    control: mpsc::UnboundedSender<Control>,
    /// Fired when the connection must end even if its writer is stuck.
    terminate: Arc<Notify>,
}

/// The socket-facing side: what the writer task drains.
pub struct ConnReceivers {
    pub frames: mpsc::Receiver<Arc<Vec<u8>>>,
    pub control: mpsc::UnboundedReceiver<Control>,
}

impl ConnHandle {
    pub fn new(user_id: impl Into<String>, role: Role, capacity: usize) -> (Self, ConnReceivers) {
        let (frames_tx, frames_rx) = mpsc::channel(capacity.max(1));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            role,
            alive: Arc::new(AtomicBool::new(true)),
            frames: frames_tx,
            control: control_tx,
            terminate: Arc::new(Notify::new()),
        };
        let receivers = ConnReceivers {
            frames: frames_rx,
            control: control_rx,
        };
        (handle, receivers)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Queue a frame without waiting.
    pub fn try_send(&self, frame: Arc<Vec<u8>>) -> Enqueue {
        match self.frames.try_send(frame) {
            Ok(()) => Enqueue::Queued,
            Err(TrySendError::Full(_)) => Enqueue::Full,
            Err(TrySendError::Closed(_)) => Enqueue::Gone,
        }
    }

    pub fn send_control(&self, control: Control) -> bool {
        self.control.send(control).is_ok()
    }

    /// Ends the connection: the writer is asked to send a close frame, and
    /// the connection task tears both socket halves down regardless of
    /// whether that frame ever gets out.
    pub fn terminate(&self, reason: CloseReason) {
        self.send_control(Control::Close(reason));
        self.terminate.notify_one();
    }

    /// Resolves once [`ConnHandle::terminate`] has been called.
    pub async fn terminated(&self) {
        self.terminate.notified().await;
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    /// Clears the liveness flag, returning whether it was set.
    pub(crate) fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }
}

impl fmt::Debug for ConnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .finish()
    }
}

/// Lifecycle of a live-editing connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Authenticated,
    Active,
    Closed,
}

impl ConnState {
    pub fn can_advance_to(self, next: ConnState) -> bool {
        matches!(
            (self, next),
            (ConnState::Connecting, ConnState::Authenticated)
                | (ConnState::Authenticated, ConnState::Active)
                | (ConnState::Connecting, ConnState::Closed)
                | (ConnState::Authenticated, ConnState::Closed)
                | (ConnState::Active, ConnState::Closed)
        )
    }
}

/// Tracks one connection through its lifecycle for logging and to guard
/// against out-of-order transitions.
#[derive(Debug)]
pub struct ConnSession {
    doc: DocKey,
    state: ConnState,
    user_id: Option<String>,
}

impl ConnSession {
    pub fn new(doc: DocKey) -> Self {
        Self {
            doc,
            state: ConnState::Connecting,
            user_id: None,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn authenticated(&mut self, user_id: &str) {
        self.user_id = Some(user_id.to_string());
        self.advance(ConnState::Authenticated);
    }

    pub fn activated(&mut self) {
        self.advance(ConnState::Active);
    }

    pub fn closed(&mut self) {
        self.advance(ConnState::Closed);
    }

    fn advance(&mut self, next: ConnState) {
        if !self.state.can_advance_to(next) {
            warn!(
                "Ignoring connection transition {:?} -> {:?} for document {}",
                self.state, next, self.doc
            );
            return;
        }
        debug!(
            "Connection for document {} (user {:?}): {:?} -> {:?}",
            self.doc, self.user_id, self.state, next
        );
        self.state = next;
    }
}
