//! The link between a session and the channel carrying its frames.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;
use tokio::sync::mpsc;

use crate::cancellation::CancellationHandle;

/// Queue of outgoing JSON-RPC frames. Unbounded so that sends never suspend:
/// frames leave in exactly the order they were produced.
pub type MessageSender = mpsc::UnboundedSender<Value>;
pub type MessageReceiver = mpsc::UnboundedReceiver<Value>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport link is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport is {0}")]
    InvalidState(String),

    #[error("no reader attached and {0} frames already queued")]
    Backlogged(usize),
}

/// What a session needs from its transport: a way to push server-initiated
/// frames and a way to hang up.
pub trait TransportLink: Send + Sync {
    /// Queue a frame without suspending.
    fn send(&self, message: Value) -> Result<(), TransportError>;

    /// Disconnect the underlying channel. Repeated calls are harmless.
    fn close(&self) -> Result<(), TransportError>;

    /// Whether something is draining the link right now. Keepalive pings are
    /// skipped while nothing is.
    fn is_attached(&self) -> bool {
        true
    }
}

/// [`TransportLink`] backed by an unbounded channel drained by a writer task.
pub struct ChannelLink {
    sender: Mutex<Option<MessageSender>>,
    closed: CancellationHandle,
    attached: AtomicBool,
    /// Frames accepted while detached, capped at `backlog_limit`.
    backlog: AtomicUsize,
    backlog_limit: usize,
}

impl ChannelLink {
    /// A link whose receiver is drained from the start.
    pub fn new() -> (Self, MessageReceiver) {
        Self::with_state(true, 0)
    }

    /// A link whose receiver may be picked up later, or never. Until
    /// [`attach`](Self::attach) at most `backlog_limit` frames are queued;
    /// they are delivered on attach.
    pub fn detached(backlog_limit: usize) -> (Self, MessageReceiver) {
        Self::with_state(false, backlog_limit)
    }

    fn with_state(attached: bool, backlog_limit: usize) -> (Self, MessageReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Self {
            sender: Mutex::new(Some(tx)),
            closed: CancellationHandle::new(),
            attached: AtomicBool::new(attached),
            backlog: AtomicUsize::new(0),
            backlog_limit,
        };
        (link, rx)
    }

    /// Mark the receiver as being drained.
    pub fn attach(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }

    /// Frames queued while detached.
    pub fn backlog(&self) -> usize {
        self.backlog.load(Ordering::SeqCst)
    }

    /// A sender for per-request frames (responses, related notifications).
    /// `None` once the link is closed.
    pub fn sender(&self) -> Option<MessageSender> {
        self.sender.lock().clone()
    }

    /// Fires when [`TransportLink::close`] is called.
    pub fn closed_signal(&self) -> CancellationHandle {
        self.closed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl TransportLink for ChannelLink {
    fn send(&self, message: Value) -> Result<(), TransportError> {
        let guard = self.sender.lock();
        let sender = guard.as_ref().ok_or(TransportError::Closed)?;
        if !self.attached.load(Ordering::SeqCst) {
            let queued = self.backlog.load(Ordering::SeqCst);
            if queued >= self.backlog_limit {
                debug!(queued, "dropping frame, no reader attached");
                return Err(TransportError::Backlogged(queued));
            }
            self.backlog.fetch_add(1, Ordering::SeqCst);
        }
        sender.send(message).map_err(|_| TransportError::Closed)
    }

    fn close(&self) -> Result<(), TransportError> {
        self.sender.lock().take();
        self.closed.cancel("link closed");
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_frames_arrive_in_send_order() {
        let (link, mut rx) = ChannelLink::new();
        for i in 0..5 {
            link.send(json!({ "seq": i })).unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap()["seq"], i);
        }
    }

    #[tokio::test]
    async fn test_close_rejects_further_sends() {
        let (link, mut rx) = ChannelLink::new();
        link.send(json!(1)).unwrap();
        link.close().unwrap();
        link.close().unwrap();

        assert!(link.is_closed());
        assert!(matches!(link.send(json!(2)), Err(TransportError::Closed)));
        assert!(link.sender().is_none());
        assert_eq!(rx.recv().await, Some(json!(1)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_detached_link_bounds_backlog_until_attached() {
        let (link, mut rx) = ChannelLink::detached(2);
        assert!(!link.is_attached());

        link.send(json!(1)).unwrap();
        link.send(json!(2)).unwrap();
        assert!(matches!(
            link.send(json!(3)),
            Err(TransportError::Backlogged(2))
        ));
        assert_eq!(link.backlog(), 2);

        link.attach();
        assert!(link.is_attached());
        for i in 4..10 {
            link.send(json!(i)).unwrap();
        }
        assert_eq!(link.backlog(), 2);

        let mut received = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            received.push(frame);
        }
        assert_eq!(received.first(), Some(&json!(1)));
        assert_eq!(received.len(), 8);
    }
}
