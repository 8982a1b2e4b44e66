//! Server-initiated requests toward the client
//!
//! Every outbound request (`sampling/createMessage`, `roots/list`, `ping`)
//! gets an entry in a pending table keyed by its request id. The entry is
//! resolved exactly once: by the client's reply, or dropped by timeout,
//! cancellation or session close. A guard removes the entry whichever way
//! the wait ends, so late replies find nothing and are discarded.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use tessera_mcp_json_rpc_server::{JsonRpcErrorObject, JsonRpcRequest, RequestId, error_codes};
use tessera_mcp_protocol::methods;
use tessera_mcp_protocol::notifications::ProgressParams;
use tessera_mcp_protocol::roots::{ListRootsResult, Root};
use tessera_mcp_protocol::sampling::{CreateMessageParams, CreateMessageResult};

use crate::cancellation::CancellationHandle;
use crate::transport::{TransportError, TransportLink};

/// Default wait for a client reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub type ProgressCallback = Arc<dyn Fn(ProgressParams) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    #[error("request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("request cancelled: {0}")]
    Cancelled(String),

    #[error("client returned error {}: {}", .0.code, .0.message)]
    Remote(JsonRpcErrorObject),

    #[error("session closed before the client replied")]
    Closed,

    #[error("client did not declare the '{0}' capability")]
    Unsupported(&'static str),

    #[error("failed to send request: {0}")]
    Send(#[from] TransportError),

    #[error("unexpected reply shape: {0}")]
    Decode(#[from] serde_json::Error),
}

impl MediatorError {
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, MediatorError::Remote(e) if e.code == error_codes::METHOD_NOT_FOUND)
    }
}

/// Per-request knobs.
#[derive(Clone)]
pub struct RequestOptions {
    pub timeout: Duration,
    /// Each progress notification pushes the deadline out by `timeout`.
    pub reset_timeout_on_progress: bool,
    /// Absolute ceiling measured from send time; wins over any reset.
    pub max_total_timeout: Option<Duration>,
    pub on_progress: Option<ProgressCallback>,
    pub signal: Option<CancellationHandle>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            reset_timeout_on_progress: false,
            max_total_timeout: None,
            on_progress: None,
            signal: None,
        }
    }
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn reset_on_progress(mut self, max_total: Option<Duration>) -> Self {
        self.reset_timeout_on_progress = true;
        self.max_total_timeout = max_total;
        self
    }

    pub fn on_progress(mut self, callback: impl Fn(ProgressParams) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn with_signal(mut self, signal: CancellationHandle) -> Self {
        self.signal = Some(signal);
        self
    }
}

type Reply = Result<Value, JsonRpcErrorObject>;

struct PendingRequest {
    method: String,
    reply: oneshot::Sender<Reply>,
    progress: mpsc::UnboundedSender<ProgressParams>,
}

/// Correlates outbound requests with the client's replies.
pub struct OutboundMediator {
    session_id: String,
    link: Arc<dyn TransportLink>,
    next_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
}

/// Removes the pending entry however the wait ends.
struct PendingGuard<'a> {
    mediator: &'a OutboundMediator,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.mediator.pending.lock().remove(&self.id);
    }
}

impl OutboundMediator {
    pub fn new(session_id: impl Into<String>, link: Arc<dyn TransportLink>) -> Self {
        Self {
            session_id: session_id.into(),
            link,
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Send `method` to the client and wait for the correlated reply.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, MediatorError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (reply_tx, mut reply_rx) = oneshot::channel();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

        self.pending.lock().insert(
            id.clone(),
            PendingRequest {
                method: method.to_string(),
                reply: reply_tx,
                progress: progress_tx,
            },
        );
        let _guard = PendingGuard {
            mediator: self,
            id: id.clone(),
        };

        let params = with_progress_token(params, &id);
        let request = JsonRpcRequest::new(id.clone(), method, params);
        self.link.send(serde_json::to_value(&request)?)?;
        debug!(session_id = %self.session_id, request_id = %id, method, "sent outbound request");

        let started = Instant::now();
        let ceiling = options.max_total_timeout.map(|max| started + max);
        let clamp = |deadline: Instant| match ceiling {
            Some(ceiling) if ceiling < deadline => ceiling,
            _ => deadline,
        };
        let mut deadline = clamp(started + options.timeout);
        let signal = options.signal.clone().unwrap_or_default();

        loop {
            tokio::select! {
                biased;
                _ = signal.cancelled() => {
                    let reason = signal.reason().unwrap_or_else(|| "cancelled".to_string());
                    debug!(session_id = %self.session_id, request_id = %id, %reason, "outbound request cancelled");
                    return Err(MediatorError::Cancelled(reason));
                }
                Some(progress) = progress_rx.recv() => {
                    if let Some(callback) = &options.on_progress {
                        callback(progress);
                    }
                    if options.reset_timeout_on_progress {
                        deadline = clamp(Instant::now() + options.timeout);
                    }
                }
                reply = &mut reply_rx => {
                    return match reply {
                        Ok(Ok(result)) => Ok(result),
                        Ok(Err(error)) => Err(MediatorError::Remote(error)),
                        Err(_) => Err(MediatorError::Closed),
                    };
                }
                _ = tokio::time::sleep_until(deadline) => {
                    let elapsed = started.elapsed();
                    debug!(session_id = %self.session_id, request_id = %id, method, ?elapsed, "outbound request timed out");
                    return Err(MediatorError::Timeout(elapsed));
                }
            }
        }
    }

    async fn request_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, MediatorError> {
        let value = self.request(method, params, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `sampling/createMessage`
    pub async fn request_sampling(
        &self,
        params: CreateMessageParams,
        options: RequestOptions,
    ) -> Result<CreateMessageResult, MediatorError> {
        let params = serde_json::to_value(params)?;
        self.request_typed(methods::SAMPLING_CREATE_MESSAGE, Some(params), options)
            .await
    }

    /// `roots/list`
    pub async fn list_roots(&self, options: RequestOptions) -> Result<Vec<Root>, MediatorError> {
        let result: ListRootsResult = self
            .request_typed(methods::ROOTS_LIST, None, options)
            .await?;
        Ok(result.roots)
    }

    pub async fn ping(&self, timeout: Duration) -> Result<(), MediatorError> {
        self.request(methods::PING, None, RequestOptions::with_timeout(timeout))
            .await
            .map(|_| ())
    }

    /// Resolve the pending entry for `id`. Replies nobody waits for are
    /// logged and dropped.
    pub fn handle_reply(&self, id: &RequestId, reply: Reply) {
        let Some(pending) = self.pending.lock().remove(id) else {
            warn!(session_id = %self.session_id, request_id = %id, "discarding reply for unknown or expired request");
            return;
        };
        if pending.reply.send(reply).is_err() {
            debug!(session_id = %self.session_id, request_id = %id, method = %pending.method, "reply arrived after waiter left");
        }
    }

    /// Route a `notifications/progress` to the request whose id was used as
    /// its progress token. Returns false when no request matches.
    pub fn handle_progress(&self, params: ProgressParams) -> bool {
        let Some(id) = RequestId::from_value(&params.progress_token) else {
            return false;
        };
        match self.pending.lock().get(&id) {
            Some(pending) => pending.progress.send(params).is_ok(),
            None => false,
        }
    }

    /// Fail every waiter with [`MediatorError::Closed`].
    pub fn clear(&self) {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        if !drained.is_empty() {
            debug!(session_id = %self.session_id, count = drained.len(), "dropping pending outbound requests");
        }
    }
}

fn with_progress_token(params: Option<Value>, id: &RequestId) -> Option<Value> {
    let mut params = params.unwrap_or_else(|| json!({}));
    if let Value::Object(map) = &mut params {
        let meta = map.entry("_meta").or_insert_with(|| json!({}));
        if let Value::Object(meta) = meta {
            meta.insert("progressToken".to_string(), json!(id));
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use crate::transport::{ChannelLink, MessageReceiver};

    fn mediator() -> (Arc<OutboundMediator>, MessageReceiver) {
        let (link, rx) = ChannelLink::new();
        (Arc::new(OutboundMediator::new("test", Arc::new(link))), rx)
    }

    fn progress(token: i64, value: f64) -> ProgressParams {
        ProgressParams {
            progress_token: json!(token),
            progress: value,
            total: None,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_reply_resolves_request() {
        let (mediator, mut rx) = mediator();
        let waiter = {
            let mediator = mediator.clone();
            tokio::spawn(async move {
                mediator.list_roots(RequestOptions::default()).await
            })
        };

        let sent = rx.recv().await.unwrap();
        assert_eq!(sent["method"], "roots/list");
        let id = RequestId::from_value(&sent["id"]).unwrap();
        assert_eq!(sent["params"]["_meta"]["progressToken"], sent["id"]);

        mediator.handle_reply(&id, Ok(json!({"roots": [{"uri": "file:///ws"}]})));
        let roots = waiter.await.unwrap().unwrap();
        assert_eq!(roots, vec![Root::new("file:///ws")]);
        assert_eq!(mediator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_remote_method_not_found() {
        let (mediator, mut rx) = mediator();
        let waiter = {
            let mediator = mediator.clone();
            tokio::spawn(async move { mediator.list_roots(RequestOptions::default()).await })
        };
        let sent = rx.recv().await.unwrap();
        let id = RequestId::from_value(&sent["id"]).unwrap();
        mediator.handle_reply(&id, Err(JsonRpcErrorObject::method_not_found("roots/list")));

        let error = waiter.await.unwrap().unwrap_err();
        assert!(error.is_method_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_entry_and_late_reply_is_dropped() {
        let (mediator, mut rx) = mediator();
        let result = mediator
            .request("sampling/createMessage", None, RequestOptions::with_timeout(Duration::from_millis(100)))
            .await;
        assert!(matches!(result, Err(MediatorError::Timeout(_))));
        assert_eq!(mediator.pending_count(), 0);

        let sent = rx.recv().await.unwrap();
        let id = RequestId::from_value(&sent["id"]).unwrap();
        mediator.handle_reply(&id, Ok(json!({})));
        assert_eq!(mediator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_resets_deadline_until_ceiling() {
        let (mediator, mut rx) = mediator();
        let seen = Arc::new(AtomicUsize::new(0));
        let options = {
            let seen = seen.clone();
            RequestOptions::with_timeout(Duration::from_millis(100))
                .reset_on_progress(Some(Duration::from_millis(250)))
                .on_progress(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                })
        };

        let waiter = {
            let mediator = mediator.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let result = mediator.request("sampling/createMessage", None, options).await;
                (result, started.elapsed())
            })
        };

        let sent = rx.recv().await.unwrap();
        let token = sent["id"].as_i64().unwrap();

        // Progress every 80 ms keeps the 100 ms timeout alive, but the
        // 250 ms ceiling still ends the wait.
        for step in 1..=5 {
            tokio::time::sleep(Duration::from_millis(80)).await;
            mediator.handle_progress(progress(token, step as f64));
        }

        let (result, elapsed) = waiter.await.unwrap();
        assert!(matches!(result, Err(MediatorError::Timeout(_))));
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(300));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_without_reset_keeps_original_deadline() {
        let (mediator, mut rx) = mediator();
        let waiter = {
            let mediator = mediator.clone();
            tokio::spawn(async move {
                let started = Instant::now();
                let result = mediator
                    .request("sampling/createMessage", None, RequestOptions::with_timeout(Duration::from_millis(100)))
                    .await;
                (result, started.elapsed())
            })
        };
        let sent = rx.recv().await.unwrap();
        let token = sent["id"].as_i64().unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(mediator.handle_progress(progress(token, 1.0)));

        let (result, elapsed) = waiter.await.unwrap();
        assert!(matches!(result, Err(MediatorError::Timeout(_))));
        assert!(elapsed < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_aborts_wait_and_releases_listener() {
        let (mediator, mut rx) = mediator();
        let signal = CancellationHandle::new();
        let options = RequestOptions::default()
            .with_signal(signal.clone())
            .on_progress(|_| {});

        let waiter = {
            let mediator = mediator.clone();
            tokio::spawn(async move { mediator.request("sampling/createMessage", None, options).await })
        };
        let sent = rx.recv().await.unwrap();
        let token = sent["id"].as_i64().unwrap();
        assert_eq!(mediator.pending_count(), 1);

        signal.cancel("user aborted");
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(MediatorError::Cancelled(ref r)) if r == "user aborted"));
        assert_eq!(mediator.pending_count(), 0);
        assert!(!mediator.handle_progress(progress(token, 1.0)));
    }

    #[tokio::test]
    async fn test_clear_fails_waiters_with_closed() {
        let (mediator, mut rx) = mediator();
        let waiter = {
            let mediator = mediator.clone();
            tokio::spawn(async move { mediator.ping(Duration::from_secs(30)).await })
        };
        rx.recv().await.unwrap();
        mediator.clear();
        assert!(matches!(waiter.await.unwrap(), Err(MediatorError::Closed)));
    }
}
