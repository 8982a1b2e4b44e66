//! Session state machine
//!
//! One [`McpSession`] exists per client connection. It is created by a
//! transport adapter, which feeds it decoded frames and owns the link the
//! session writes to.
//!
//! ```text
//! connecting ──> ready ──> closed
//!     │            │         ^
//!     └──> error <─┘         │
//!            └───────────────┘
//! ```
//!
//! Connection state only moves forward. The per-session mutable fields (log
//! level, roots, client capabilities) live behind the session's own locks
//! and watch channels; nothing here is shared with other sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tessera_mcp_json_rpc_server::{
    IncomingMessage, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId,
};
use tessera_mcp_protocol::completion::CompleteParams;
use tessera_mcp_protocol::initialize::{InitializeParams, InitializeResult};
use tessera_mcp_protocol::logging::SetLevelParams;
use tessera_mcp_protocol::notifications::{CancelledParams, ProgressParams};
use tessera_mcp_protocol::prompts::GetPromptParams;
use tessera_mcp_protocol::resources::{ReadResourceParams, ReadResourceResult};
use tessera_mcp_protocol::sampling::{CreateMessageParams, CreateMessageResult};
use tessera_mcp_protocol::tools::CallToolParams;
use tessera_mcp_protocol::{
    ClientCapabilities, Implementation, LoggingLevel, McpError, McpResult, McpVersion, Root,
    ServerCapabilities, methods,
};

use crate::auth::AuthContext;
use crate::cancellation::CancellationHandle;
use crate::context::ToolContext;
use crate::events::ServerEvent;
use crate::handlers;
use crate::mediator::{MediatorError, OutboundMediator, RequestOptions};
use crate::server::ServerCore;
use crate::transport::{MessageSender, TransportLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Error,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Ready)
                | (Connecting, Error)
                | (Connecting, Closed)
                | (Ready, Error)
                | (Ready, Closed)
                | (Error, Closed)
        )
    }
}

/// Timing parameters for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Keepalive interval. `None` disables pings.
    pub ping_interval: Option<Duration>,
    /// How many times to look for client capabilities before assuming none.
    pub capability_poll_attempts: u32,
    pub capability_poll_delay: Duration,
    /// Limit for the initial and refresh `roots/list` requests.
    pub roots_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: None,
            capability_poll_attempts: 10,
            capability_poll_delay: Duration::from_millis(100),
            roots_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }
}

struct SessionState {
    connection: ConnectionState,
    initialized: bool,
    /// `None` until the client reports them, and for good if it never does.
    client_capabilities: Option<ClientCapabilities>,
    client_info: Option<Implementation>,
    protocol_version: Option<McpVersion>,
    capabilities_unknown: bool,
}

pub struct McpSession {
    id: String,
    core: Arc<ServerCore>,
    link: Arc<dyn TransportLink>,
    config: SessionConfig,
    auth: Option<AuthContext>,
    server_capabilities: ServerCapabilities,
    state: Mutex<SessionState>,
    log_level: watch::Sender<LoggingLevel>,
    roots: watch::Sender<Vec<Root>>,
    mediator: Arc<OutboundMediator>,
    in_flight: Mutex<HashMap<RequestId, CancellationHandle>>,
    ping_task: Mutex<Option<JoinHandle<()>>>,
    announced: AtomicBool,
}

impl McpSession {
    pub(crate) fn new(
        core: Arc<ServerCore>,
        link: Arc<dyn TransportLink>,
        auth: Option<AuthContext>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let id = Uuid::now_v7().to_string();
        let server_capabilities = core.registry.server_capabilities();
        let mediator = Arc::new(OutboundMediator::new(id.clone(), link.clone()));
        debug!(session_id = %id, "session created");
        Arc::new(Self {
            id,
            core,
            link,
            config,
            auth,
            server_capabilities,
            state: Mutex::new(SessionState {
                connection: ConnectionState::Connecting,
                initialized: false,
                client_capabilities: None,
                client_info: None,
                protocol_version: None,
                capabilities_unknown: false,
            }),
            log_level: watch::Sender::new(LoggingLevel::default()),
            roots: watch::Sender::new(Vec::new()),
            mediator,
            in_flight: Mutex::new(HashMap::new()),
            ping_task: Mutex::new(None),
            announced: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().connection
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn auth(&self) -> Option<&AuthContext> {
        self.auth.as_ref()
    }

    pub fn server_capabilities(&self) -> &ServerCapabilities {
        &self.server_capabilities
    }

    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.state.lock().client_capabilities.clone()
    }

    pub fn client_info(&self) -> Option<Implementation> {
        self.state.lock().client_info.clone()
    }

    pub fn protocol_version(&self) -> Option<McpVersion> {
        self.state.lock().protocol_version
    }

    /// True once negotiation gave up waiting for client capabilities.
    pub fn capabilities_unknown(&self) -> bool {
        self.state.lock().capabilities_unknown
    }

    pub fn log_level(&self) -> LoggingLevel {
        *self.log_level.borrow()
    }

    pub fn set_log_level(&self, level: LoggingLevel) {
        self.log_level.send_replace(level);
        debug!(session_id = %self.id, level = level.as_str(), "logging level changed");
    }

    pub fn roots(&self) -> Vec<Root> {
        self.roots.borrow().clone()
    }

    pub fn watch_roots(&self) -> watch::Receiver<Vec<Root>> {
        self.roots.subscribe()
    }

    pub fn mediator(&self) -> &Arc<OutboundMediator> {
        &self.mediator
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if !state.connection.can_transition_to(next) {
            debug!(session_id = %self.id, from = ?state.connection, to = ?next, "ignoring state transition");
            return false;
        }
        debug!(session_id = %self.id, from = ?state.connection, to = ?next, "session state transition");
        state.connection = next;
        true
    }

    fn emit(&self, event: ServerEvent) {
        // No subscribers is fine.
        let _ = self.core.events.send(event);
    }

    /// Server-initiated notification on the session link.
    pub fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        let frame = serde_json::to_value(JsonRpcNotification::new(method, params))?;
        self.link
            .send(frame)
            .map_err(|e| McpError::SessionError(e.to_string()))
    }

    /// Run initial negotiation: wait for client capabilities, fetch roots if
    /// the client has them, then go ready and start the keepalive timer.
    pub async fn connect(self: &Arc<Self>) {
        let mut capabilities = None;
        for attempt in 0..self.config.capability_poll_attempts {
            if self.is_closed() {
                return;
            }
            capabilities = self.client_capabilities();
            if capabilities.is_some() {
                break;
            }
            if attempt + 1 < self.config.capability_poll_attempts {
                tokio::time::sleep(self.config.capability_poll_delay).await;
            }
        }

        match capabilities {
            Some(capabilities) if capabilities.supports_roots() => {
                if let Err(error) = self.refresh_roots().await {
                    if error.is_method_not_found() {
                        debug!(session_id = %self.id, "client declared roots but does not answer roots/list");
                    } else {
                        warn!(session_id = %self.id, error = %error, "initial roots/list failed");
                    }
                }
            }
            Some(_) => {}
            None => {
                self.state.lock().capabilities_unknown = true;
                warn!(
                    session_id = %self.id,
                    attempts = self.config.capability_poll_attempts,
                    "client did not report capabilities; continuing with unknown capabilities"
                );
            }
        }

        if !self.transition(ConnectionState::Ready) {
            return;
        }
        self.announced.store(true, Ordering::SeqCst);
        info!(session_id = %self.id, "session ready");
        self.emit(ServerEvent::Connect {
            session_id: self.id.clone(),
        });
        self.start_ping();
    }

    fn start_ping(self: &Arc<Self>) {
        let Some(interval) = self.config.ping_interval.filter(|i| !i.is_zero()) else {
            return;
        };
        let session = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                if !session.is_ready() {
                    break;
                }
                if !session.link.is_attached() {
                    continue;
                }
                let mediator = session.mediator.clone();
                let session_id = session.id.clone();
                drop(session);
                // Some clients never answer unsolicited pings; a missed
                // reply is not a reason to tear the session down.
                tokio::spawn(async move {
                    if let Err(error) = mediator.ping(interval).await {
                        debug!(session_id = %session_id, error = %error, "keepalive ping failed");
                    }
                });
            }
        });
        *self.ping_task.lock() = Some(task);
    }

    /// Re-fetch the client's roots and publish them.
    pub async fn refresh_roots(&self) -> Result<Vec<Root>, MediatorError> {
        let roots = self
            .mediator
            .list_roots(RequestOptions::with_timeout(self.config.roots_timeout))
            .await?;
        self.roots.send_replace(roots.clone());
        debug!(session_id = %self.id, count = roots.len(), "client roots updated");
        Ok(roots)
    }

    pub async fn request_sampling(
        &self,
        params: CreateMessageParams,
        options: RequestOptions,
    ) -> Result<CreateMessageResult, MediatorError> {
        if let Some(capabilities) = self.client_capabilities()
            && !capabilities.supports_sampling()
        {
            return Err(MediatorError::Unsupported("sampling"));
        }
        self.mediator.request_sampling(params, options).await
    }

    /// Move to `error` after an unrecoverable transport failure.
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        if self.transition(ConnectionState::Error) {
            warn!(session_id = %self.id, error = %message, "session failed");
            self.emit(ServerEvent::Error {
                session_id: self.id.clone(),
                message,
            });
        }
    }

    /// Idempotent. Stops the keepalive timer, fails pending outbound
    /// requests, cancels running tool calls and hangs up the link.
    pub fn close(&self) {
        if !self.transition(ConnectionState::Closed) {
            return;
        }
        if let Some(task) = self.ping_task.lock().take() {
            task.abort();
        }
        self.mediator.clear();
        for (_, call) in self.in_flight.lock().drain() {
            call.cancel("session closed");
        }
        if let Err(error) = self.link.close() {
            warn!(session_id = %self.id, error = %error, "error while closing transport link");
        }
        if self.announced.swap(false, Ordering::SeqCst) {
            self.emit(ServerEvent::Disconnect {
                session_id: self.id.clone(),
            });
        }
        info!(session_id = %self.id, "session closed");
    }

    /// Handle frames that must be processed in arrival order on the reader:
    /// replies to our own requests, progress for them, and cancellations.
    /// Returns the message when it needs full dispatch.
    pub fn route_inline(&self, message: IncomingMessage) -> Option<IncomingMessage> {
        match message {
            IncomingMessage::Response(response) => {
                self.mediator
                    .handle_reply(&response.id, Ok(response.result));
                None
            }
            IncomingMessage::Error(error) => {
                match &error.id {
                    Some(id) => self.mediator.handle_reply(id, Err(error.error)),
                    None => warn!(
                        session_id = %self.id,
                        code = error.error.code,
                        message = %error.error.message,
                        "client reported an error without a request id"
                    ),
                }
                None
            }
            IncomingMessage::Notification(notification)
                if notification.method == methods::NOTIFY_PROGRESS =>
            {
                match decode::<ProgressParams>(notification.params) {
                    Ok(progress) => {
                        if !self.mediator.handle_progress(progress) {
                            debug!(session_id = %self.id, "progress for unknown request ignored");
                        }
                    }
                    Err(error) => debug!(session_id = %self.id, error = %error, "malformed progress notification"),
                }
                None
            }
            IncomingMessage::Notification(notification)
                if notification.method == methods::NOTIFY_CANCELLED =>
            {
                match decode::<CancelledParams>(notification.params) {
                    Ok(params) => self.cancel_request(params),
                    Err(error) => debug!(session_id = %self.id, error = %error, "malformed cancel notification"),
                }
                None
            }
            other => Some(other),
        }
    }

    fn cancel_request(&self, params: CancelledParams) {
        let Some(id) = RequestId::from_value(&params.request_id) else {
            return;
        };
        let reason = params.reason.unwrap_or_else(|| "cancelled by client".to_string());
        match self.in_flight.lock().get(&id) {
            Some(call) => {
                debug!(session_id = %self.id, request_id = %id, %reason, "cancelling in-flight call");
                call.cancel(reason);
            }
            None => debug!(session_id = %self.id, request_id = %id, "cancel for unknown request ignored"),
        }
    }

    /// Dispatch a request or notification. Responses, and any notifications
    /// produced while handling the request, are written to `sink` in order.
    pub async fn handle_message(self: &Arc<Self>, message: IncomingMessage, sink: MessageSender) {
        let Some(message) = self.route_inline(message) else {
            return;
        };
        match message {
            IncomingMessage::Request(request) => self.handle_request(request, sink).await,
            IncomingMessage::Notification(notification) => {
                self.handle_notification(notification).await
            }
            IncomingMessage::Response(_) | IncomingMessage::Error(_) => {}
        }
    }

    async fn handle_request(self: &Arc<Self>, request: JsonRpcRequest, sink: MessageSender) {
        let id = request.id.clone();
        let method = request.method.clone();

        if method == methods::INITIALIZE {
            self.initialize(request, &sink);
            return;
        }

        let result = match method.as_str() {
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => to_result(handlers::list_tools(&self.core.registry)),
            methods::TOOLS_CALL => match self.call_tool(request, &sink).await {
                Some(result) => result,
                // Cancelled: the client no longer expects a response.
                None => return,
            },
            methods::RESOURCES_LIST => to_result(handlers::list_resources(&self.core.registry)),
            methods::RESOURCES_TEMPLATES_LIST => {
                to_result(handlers::list_resource_templates(&self.core.registry))
            }
            methods::RESOURCES_READ => self.read_resource(request).await,
            methods::PROMPTS_LIST => to_result(handlers::list_prompts(&self.core.registry)),
            methods::PROMPTS_GET => match decode::<GetPromptParams>(request.params) {
                Ok(params) => handlers::get_prompt(&self.core.registry, params)
                    .await
                    .and_then(to_result),
                Err(error) => Err(error),
            },
            methods::COMPLETION_COMPLETE => match decode::<CompleteParams>(request.params) {
                Ok(params) => handlers::complete(&self.core.registry, params)
                    .await
                    .and_then(to_result),
                Err(error) => Err(error),
            },
            methods::LOGGING_SET_LEVEL => decode::<SetLevelParams>(request.params).map(|params| {
                self.set_log_level(params.level);
                json!({})
            }),
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        let response = match result {
            Ok(value) => JsonRpcMessage::success(id, value),
            Err(error) => {
                if error.is_not_found() {
                    debug!(session_id = %self.id, method = %method, error = %error, "request failed");
                } else {
                    warn!(session_id = %self.id, method = %method, error = %error, "request failed");
                }
                JsonRpcMessage::error(JsonRpcError::new(Some(id), error.to_error_object()))
            }
        };
        if sink.send(response.to_value()).is_err() {
            debug!(session_id = %self.id, method = %method, "response dropped, transport gone");
        }
    }

    fn initialize(&self, request: JsonRpcRequest, sink: &MessageSender) {
        let id = request.id.clone();
        if self.is_initialized() {
            let error = JsonRpcError::invalid_request(Some(id), "session is already initialized");
            let _ = sink.send(JsonRpcMessage::error(error).to_value());
            return;
        }

        let params = match decode::<InitializeParams>(request.params) {
            Ok(params) => params,
            Err(error) => {
                let error = JsonRpcError::new(Some(id), error.to_error_object());
                let _ = sink.send(JsonRpcMessage::error(error).to_value());
                return;
            }
        };

        let version = McpVersion::negotiate(params.protocol_version.as_deref());
        let result = InitializeResult {
            protocol_version: version,
            capabilities: self.server_capabilities.clone(),
            server_info: self.core.info.clone(),
            instructions: self.core.instructions.clone(),
        };
        let response = match serde_json::to_value(result) {
            Ok(value) => JsonRpcMessage::success(id, value),
            Err(error) => JsonRpcMessage::error(JsonRpcError::internal_error(
                Some(id),
                Some(error.to_string()),
            )),
        };
        let _ = sink.send(response.to_value());

        // Recorded only once the response is queued.
        let mut state = self.state.lock();
        state.initialized = true;
        state.protocol_version = Some(version);
        state.client_info = params.client_info;
        state.client_capabilities = params.capabilities;
        info!(
            session_id = %self.id,
            protocol_version = %version,
            client = state.client_info.as_ref().map(|c| c.name.as_str()).unwrap_or("unknown"),
            "session initialized"
        );
    }

    async fn call_tool(
        self: &Arc<Self>,
        request: JsonRpcRequest,
        sink: &MessageSender,
    ) -> Option<McpResult<Value>> {
        let progress_token = request.progress_token().cloned();
        let params = match decode::<CallToolParams>(request.params) {
            Ok(params) => params,
            Err(error) => return Some(Err(error)),
        };
        let id = request.id;

        let cancellation = CancellationHandle::new();
        self.in_flight.lock().insert(id.clone(), cancellation.clone());
        let ctx = ToolContext::new(
            self.clone(),
            id.clone(),
            sink.clone(),
            progress_token,
            cancellation.clone(),
        );

        let outcome = cancellation
            .run(self.core.pipeline.call(&params.name, params.arguments, ctx))
            .await;
        self.in_flight.lock().remove(&id);

        match outcome {
            Some(result) => {
                if let Err(error) = &result {
                    debug!(session_id = %self.id, tool = %params.name, error = %error, "tool call rejected");
                }
                Some(result.and_then(to_result))
            }
            None => {
                debug!(
                    session_id = %self.id,
                    tool = %params.name,
                    reason = cancellation.reason().as_deref().unwrap_or("cancelled"),
                    "tool call cancelled"
                );
                None
            }
        }
    }

    async fn read_resource(&self, request: JsonRpcRequest) -> McpResult<Value> {
        let params = decode::<ReadResourceParams>(request.params)?;
        let contents = self.core.resolver.read(&params.uri).await.map_err(|error| {
            warn!(session_id = %self.id, uri = %params.uri, error = %error, "resource read failed");
            error
        })?;
        to_result(ReadResourceResult { contents })
    }

    async fn handle_notification(self: &Arc<Self>, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::NOTIFY_INITIALIZED => {
                debug!(session_id = %self.id, "client finished initialization");
            }
            methods::NOTIFY_ROOTS_LIST_CHANGED => match self.refresh_roots().await {
                Ok(roots) => self.emit(ServerEvent::RootsChanged {
                    session_id: self.id.clone(),
                    roots,
                }),
                Err(error) => {
                    warn!(session_id = %self.id, error = %error, "failed to refresh roots after change notification")
                }
            },
            other => {
                debug!(session_id = %self.id, method = other, "ignoring unknown notification");
            }
        }
    }
}

impl Drop for McpSession {
    fn drop(&mut self) {
        if let Some(task) = self.ping_task.get_mut().take() {
            task.abort();
        }
    }
}

fn decode<T: DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|e| McpError::invalid_params(e.to_string()))
}

fn to_result<T: Serialize>(value: T) -> McpResult<Value> {
    Ok(serde_json::to_value(value)?)
}
