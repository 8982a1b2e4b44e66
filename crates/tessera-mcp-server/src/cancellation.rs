//! Cooperative cancellation for tool calls and outbound requests.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Clone-friendly cancellation signal. The first reason recorded wins.
#[derive(Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<Option<String>>>,
    rx: watch::Receiver<Option<String>>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Signal cancellation. Idempotent; later reasons are ignored.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Resolves once cancellation is requested (immediately if it already was).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // wait_for checks the current value first
        let _ = rx.wait_for(Option::is_some).await;
    }

    /// Drive `future` unless cancelled first. `None` means the future was dropped.
    pub async fn run<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("reason", &*self.rx.borrow())
            .finish()
    }
}
