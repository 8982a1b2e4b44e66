//! Streamable HTTP request handling
//!
//! One endpoint carries the whole session protocol:
//! - `POST` a JSON-RPC frame. Requests are answered with `application/json`
//!   or, when the client accepts it, a `text/event-stream` of the related
//!   notifications followed by the response. Everything else gets `202`.
//! - `GET` attaches the session's standalone event stream for
//!   server-initiated messages. Dropping it ends the session.
//! - `DELETE` ends the session.
//!
//! Health, readiness and OAuth discovery answer on their own paths and never
//! touch a session.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::header::{
    ACCEPT, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue, WWW_AUTHENTICATE,
};
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tessera_mcp_json_rpc_server::{
    IncomingMessage, JsonRpcError, JsonRpcErrorObject, JsonRpcMessage, JsonRpcRequest,
};
use tessera_mcp_protocol::{McpError, methods};
use tessera_mcp_server::{AuthContext, ChannelLink, McpServer, SessionConfig};

use crate::auth::{Authenticator, ConnectionInfo};
use crate::config::HttpServerConfig;
use crate::cors::CorsLayer;
use crate::discovery::{AUTHORIZATION_SERVER_PATH, PROTECTED_RESOURCE_PATH};
use crate::pool::{PooledSession, SessionPool};
use crate::sse::{SseEvent, is_response};

pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

/// Server-initiated frames held for a session with no `GET` stream yet.
const UNATTACHED_BACKLOG: usize = 64;

pub(crate) type HttpBody = UnsyncBoxBody<Bytes, hyper::Error>;

/// How the client wants a request answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Json,
    EventStream,
}

impl ResponseMode {
    /// Event stream whenever the client accepts one, so notifications tied
    /// to a request travel ahead of its response on the same body.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let accepts_stream = headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|media| {
                media
                    .split(';')
                    .next()
                    .is_some_and(|m| m.trim().eq_ignore_ascii_case("text/event-stream"))
            });
        if accepts_stream {
            ResponseMode::EventStream
        } else {
            ResponseMode::Json
        }
    }
}

/// Extract the MCP session id from request headers
pub fn extract_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Clone)]
pub(crate) struct StreamableHttpHandler {
    pub(crate) config: Arc<HttpServerConfig>,
    pub(crate) server: McpServer,
    pub(crate) authenticator: Arc<dyn Authenticator>,
    pub(crate) pool: Arc<SessionPool>,
    pub(crate) session_config: SessionConfig,
}

impl StreamableHttpHandler {
    pub(crate) async fn handle(
        &self,
        req: Request<Incoming>,
        remote_addr: Option<SocketAddr>,
    ) -> Response<HttpBody> {
        let mut response = self.route(req, remote_addr).await;
        if self.config.enable_cors {
            CorsLayer::apply_cors_headers(response.headers_mut());
        }
        response
    }

    async fn route(
        &self,
        req: Request<Incoming>,
        remote_addr: Option<SocketAddr>,
    ) -> Response<HttpBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!(%method, %path, "handling http request");

        if method == Method::OPTIONS {
            return empty(StatusCode::NO_CONTENT);
        }
        if path == self.config.endpoint {
            return match method {
                Method::POST => self.handle_post(req, remote_addr).await,
                Method::GET => self.handle_get(req, remote_addr).await,
                Method::DELETE => self.handle_delete(req, remote_addr).await,
                _ => empty(StatusCode::METHOD_NOT_ALLOWED),
            };
        }
        if method != Method::GET {
            return text(StatusCode::NOT_FOUND, "Not Found");
        }

        let health = &self.config.health;
        if health.enabled && path == health.path {
            let status = StatusCode::from_u16(health.status).unwrap_or(StatusCode::OK);
            return text(status, health.body.clone());
        }
        if self.config.readiness.enabled && path == self.config.readiness.path {
            return self.readiness();
        }
        match path.as_str() {
            AUTHORIZATION_SERVER_PATH => document(self.config.oauth.authorization_server.as_ref()),
            PROTECTED_RESOURCE_PATH => document(self.config.oauth.protected_resource.as_ref()),
            _ => text(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    fn readiness(&self) -> Response<HttpBody> {
        let readiness = self.pool.readiness();
        let (status, label) = if readiness.is_ready() {
            (StatusCode::OK, "ready")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
        };
        json_response(
            status,
            &json!({ "status": label, "ready": readiness.ready, "total": readiness.total }),
        )
    }

    /// Takes owned connection info: no borrow of the request may live
    /// across the hook's await.
    async fn authenticate(
        &self,
        connection: ConnectionInfo,
    ) -> Result<Option<AuthContext>, Response<HttpBody>> {
        let remote_addr = connection.remote_addr;
        self.authenticator
            .authenticate(&connection)
            .await
            .map_err(|rejection| {
                warn!(remote_addr = ?remote_addr, reason = %rejection, "request rejected by authenticator");
                let error = McpError::Unauthorized(rejection.message).to_error_object();
                let mut response = rpc_error(StatusCode::UNAUTHORIZED, error);
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            })
    }

    async fn handle_post(
        &self,
        req: Request<Incoming>,
        remote_addr: Option<SocketAddr>,
    ) -> Response<HttpBody> {
        let auth = match self.authenticate(connection_info(&req, remote_addr)).await {
            Ok(auth) => auth,
            Err(response) => return response,
        };
        let session_id = extract_session_id(req.headers());
        let mode = ResponseMode::from_headers(req.headers());

        let body = match self.read_body(req).await {
            Ok(body) => body,
            Err(response) => return response,
        };
        let parsed = std::str::from_utf8(&body)
            .map_err(|e| JsonRpcError::parse_error(e.to_string()))
            .and_then(IncomingMessage::from_str);
        let message = match parsed {
            Ok(message) => message,
            Err(error) => {
                debug!(code = error.error.code, "rejecting malformed frame");
                return json_response(
                    StatusCode::BAD_REQUEST,
                    &JsonRpcMessage::error(error).to_value(),
                );
            }
        };

        let is_initialize = matches!(
            &message,
            IncomingMessage::Request(request) if request.method == methods::INITIALIZE
        );
        let (entry, created) = match session_id {
            Some(id) => match self.pool.get(&id) {
                Some(entry) => (entry, false),
                None => return session_not_found(&id),
            },
            None if is_initialize => (self.open_session(auth), true),
            None => {
                let error = JsonRpcErrorObject::invalid_request(Some(format!(
                    "{SESSION_ID_HEADER} header is required"
                )));
                return rpc_error(StatusCode::BAD_REQUEST, error);
            }
        };

        match message {
            IncomingMessage::Request(request) if created => self.initialize(entry, request, mode).await,
            IncomingMessage::Request(request) => dispatch(entry, request, mode).await,
            other => {
                let session = entry.session().clone();
                let (sink, _) = mpsc::unbounded_channel();
                tokio::spawn(async move { session.handle_message(other, sink).await });
                empty(StatusCode::ACCEPTED)
            }
        }
    }

    async fn read_body(&self, req: Request<Incoming>) -> Result<Bytes, Response<HttpBody>> {
        let limit = self.config.max_body_size;
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(too_large(limit));
        }
        match Limited::new(req.into_body(), limit).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(error) if error.downcast_ref::<LengthLimitError>().is_some() => Err(too_large(limit)),
            Err(error) => {
                debug!(error = %error, "failed to read request body");
                Err(text(StatusCode::BAD_REQUEST, "Failed to read request body"))
            }
        }
    }

    fn open_session(&self, auth: Option<AuthContext>) -> Arc<PooledSession> {
        let (link, outgoing) = ChannelLink::detached(UNATTACHED_BACKLOG);
        let link = Arc::new(link);
        let session = self
            .server
            .create_session(link.clone(), auth, self.session_config.clone());
        let entry = Arc::new(PooledSession::new(session.clone(), link, outgoing));
        self.pool.insert(entry.clone());
        info!(session_id = %session.id(), "http session opened");

        tokio::spawn(async move { session.connect().await });
        entry
    }

    /// First request of a new session. The session is dropped again if the
    /// handshake fails.
    async fn initialize(
        &self,
        entry: Arc<PooledSession>,
        request: JsonRpcRequest,
        mode: ResponseMode,
    ) -> Response<HttpBody> {
        let session_id = entry.session().id().to_string();
        let (sink, mut rx) = mpsc::unbounded_channel();
        entry
            .session()
            .handle_message(IncomingMessage::Request(request), sink)
            .await;

        let Some(frame) = rx.recv().await else {
            self.pool.remove(&session_id);
            return empty(StatusCode::ACCEPTED);
        };
        if frame.get("error").is_some() {
            debug!(session_id = %session_id, "initialize failed, discarding session");
            self.pool.remove(&session_id);
            return json_response(StatusCode::OK, &frame);
        }

        let mut response = match mode {
            ResponseMode::Json => json_response(StatusCode::OK, &frame),
            ResponseMode::EventStream => {
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = tx.send(frame);
                event_stream(rx, None)
            }
        };
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            response
                .headers_mut()
                .insert(HeaderName::from_static("mcp-session-id"), value);
        }
        response
    }

    async fn handle_get(
        &self,
        req: Request<Incoming>,
        remote_addr: Option<SocketAddr>,
    ) -> Response<HttpBody> {
        if let Err(response) = self.authenticate(connection_info(&req, remote_addr)).await {
            return response;
        }
        let Some(session_id) = extract_session_id(req.headers()) else {
            return text(StatusCode::BAD_REQUEST, "Mcp-Session-Id header is required");
        };
        let Some(entry) = self.pool.get(&session_id) else {
            return session_not_found(&session_id);
        };
        let Some(outgoing) = entry.take_outgoing() else {
            return text(StatusCode::CONFLICT, "event stream already attached");
        };
        debug!(session_id = %session_id, "event stream attached");
        let guard = StreamGuard {
            pool: self.pool.clone(),
            session_id,
        };
        event_stream(outgoing, Some(guard))
    }

    async fn handle_delete(
        &self,
        req: Request<Incoming>,
        remote_addr: Option<SocketAddr>,
    ) -> Response<HttpBody> {
        if let Err(response) = self.authenticate(connection_info(&req, remote_addr)).await {
            return response;
        }
        let Some(session_id) = extract_session_id(req.headers()) else {
            return text(StatusCode::BAD_REQUEST, "Mcp-Session-Id header is required");
        };
        if self.pool.remove(&session_id) {
            info!(session_id = %session_id, "http session deleted by client");
            empty(StatusCode::NO_CONTENT)
        } else {
            session_not_found(&session_id)
        }
    }
}

fn connection_info(req: &Request<Incoming>, remote_addr: Option<SocketAddr>) -> ConnectionInfo {
    ConnectionInfo {
        headers: req.headers().clone(),
        remote_addr,
    }
}

/// Run a request on its session and render the frames it produces.
async fn dispatch(
    entry: Arc<PooledSession>,
    request: JsonRpcRequest,
    mode: ResponseMode,
) -> Response<HttpBody> {
    let (sink, mut rx) = mpsc::unbounded_channel();
    let session = entry.session().clone();
    tokio::spawn(async move {
        session
            .handle_message(IncomingMessage::Request(request), sink)
            .await
    });

    match mode {
        ResponseMode::EventStream => event_stream(rx, None),
        ResponseMode::Json => loop {
            match rx.recv().await {
                Some(frame) if is_response(&frame) => break json_response(StatusCode::OK, &frame),
                // A JSON answer has no room for related notifications; they
                // go to the session's event stream, bounded while detached.
                Some(frame) => entry.forward(frame),
                // Cancelled: there is no response to give.
                None => break empty(StatusCode::ACCEPTED),
            }
        },
    }
}

/// Closes the session when its standalone event stream goes away.
struct StreamGuard {
    pool: Arc<SessionPool>,
    session_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if let Some(entry) = self.pool.get(&self.session_id) {
            entry.session().fail("event stream dropped");
            self.pool.remove(&self.session_id);
            info!(session_id = %self.session_id, "event stream dropped, session closed");
        }
    }
}

/// SSE response over `frames`. Without a guard the stream is per-request and
/// ends after the response frame.
fn event_stream(
    frames: mpsc::UnboundedReceiver<Value>,
    guard: Option<StreamGuard>,
) -> Response<HttpBody> {
    let per_request = guard.is_none();
    let events = stream::unfold(
        (frames, guard, false),
        move |(mut frames, guard, done)| async move {
            if done {
                return None;
            }
            let frame = frames.recv().await?;
            let done = per_request && is_response(&frame);
            let bytes = SseEvent::Data(frame).into_bytes();
            Some((Ok::<_, hyper::Error>(Frame::data(bytes)), (frames, guard, done)))
        },
    );

    let mut response = Response::new(StreamBody::new(events).boxed_unsync());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn full(bytes: impl Into<Bytes>) -> HttpBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

fn empty(status: StatusCode) -> Response<HttpBody> {
    let mut response = Response::new(Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync());
    *response.status_mut() = status;
    response
}

fn text(status: StatusCode, body: impl Into<String>) -> Response<HttpBody> {
    let mut response = Response::new(full(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response<HttpBody> {
    match serde_json::to_vec(value) {
        Ok(bytes) => {
            let mut response = Response::new(full(bytes));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(error) => {
            warn!(error = %error, "failed to serialize response body");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

/// JSON-RPC error without a request id, for failures before dispatch.
fn rpc_error(status: StatusCode, error: JsonRpcErrorObject) -> Response<HttpBody> {
    json_response(
        status,
        &JsonRpcMessage::error(JsonRpcError::new(None, error)).to_value(),
    )
}

fn document<T: Serialize>(metadata: Option<&T>) -> Response<HttpBody> {
    match metadata {
        Some(metadata) => json_response(StatusCode::OK, metadata),
        None => text(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn session_not_found(session_id: &str) -> Response<HttpBody> {
    debug!(session_id = %session_id, "unknown session id");
    let error = JsonRpcErrorObject::server_error(
        -32001,
        format!("Session not found: {session_id}"),
        None,
    );
    rpc_error(StatusCode::NOT_FOUND, error)
}

fn too_large(limit: usize) -> Response<HttpBody> {
    text(
        StatusCode::PAYLOAD_TOO_LARGE,
        format!("Request body exceeds {limit} bytes"),
    )
}
