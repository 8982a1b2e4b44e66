//! HTTP MCP server lifecycle
//!
//! ```text
//! stopped ──start()──> starting ──bound──> running ──stop()──> stopping ──> stopped
//! ```
//!
//! Stopping closes the listener (and with it health, readiness and
//! discovery) before closing the sessions that were live.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use tessera_mcp_server::{CancellationHandle, McpServer, SessionConfig};

use crate::auth::{AllowAll, Authenticator};
use crate::config::{HealthConfig, HttpServerConfig, ReadinessConfig};
use crate::discovery::{AuthorizationServerMetadata, ProtectedResourceMetadata};
use crate::pool::SessionPool;
use crate::streamable_http::StreamableHttpHandler;
use crate::{HttpMcpError, Result};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Builder for HTTP MCP servers
pub struct HttpMcpServerBuilder {
    server: McpServer,
    config: HttpServerConfig,
    authenticator: Arc<dyn Authenticator>,
}

impl HttpMcpServerBuilder {
    pub fn new(server: McpServer) -> Self {
        Self {
            server,
            config: HttpServerConfig::default(),
            authenticator: Arc::new(AllowAll),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: HttpServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bind_address(mut self, addr: SocketAddr) -> Self {
        self.config.bind_address = addr;
        self
    }

    /// Set the MCP endpoint path
    pub fn endpoint(mut self, path: impl Into<String>) -> Self {
        self.config.endpoint = path.into();
        self
    }

    pub fn cors(mut self, enable: bool) -> Self {
        self.config.enable_cors = enable;
        self
    }

    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    pub fn health(mut self, health: HealthConfig) -> Self {
        self.config.health = health;
        self
    }

    pub fn readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.config.readiness = readiness;
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = Some(config);
        self
    }

    /// Hook run on every endpoint request before any session is touched.
    pub fn authenticator<A: Authenticator + 'static>(mut self, authenticator: A) -> Self {
        self.authenticator = Arc::new(authenticator);
        self
    }

    pub fn oauth_authorization_server(mut self, metadata: AuthorizationServerMetadata) -> Self {
        self.config.oauth.authorization_server = Some(metadata);
        self
    }

    pub fn oauth_protected_resource(mut self, metadata: ProtectedResourceMetadata) -> Self {
        self.config.oauth.protected_resource = Some(metadata);
        self
    }

    pub fn build(self) -> Result<HttpMcpServer> {
        self.config.validate()?;
        let session_config = self
            .config
            .session
            .clone()
            .unwrap_or_else(|| self.server.session_config().clone());
        let handler = StreamableHttpHandler {
            config: Arc::new(self.config),
            server: self.server,
            authenticator: self.authenticator,
            pool: Arc::new(SessionPool::new()),
            session_config,
        };
        let (state, _) = watch::channel(ServerState::Stopped);
        Ok(HttpMcpServer {
            handler,
            state,
            running: Mutex::new(None),
        })
    }
}

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationHandle,
    accept_task: JoinHandle<()>,
}

pub struct HttpMcpServer {
    handler: StreamableHttpHandler,
    state: watch::Sender<ServerState>,
    running: Mutex<Option<Running>>,
}

impl HttpMcpServer {
    pub fn builder(server: McpServer) -> HttpMcpServerBuilder {
        HttpMcpServerBuilder::new(server)
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &HttpServerConfig {
        &self.handler.config
    }

    /// Live sessions
    pub fn sessions(&self) -> &Arc<SessionPool> {
        &self.handler.pool
    }

    /// Bound address while running. Differs from the configured one when
    /// that asked for port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|running| running.local_addr)
    }

    fn advance(&self, from: ServerState, to: ServerState) -> Result<()> {
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            debug!(from = ?from, to = ?to, "http server state transition");
            Ok(())
        } else {
            Err(HttpMcpError::InvalidState {
                expected: from,
                actual: self.state(),
            })
        }
    }

    /// Bind and start accepting connections.
    pub async fn start(&self) -> Result<SocketAddr> {
        self.advance(ServerState::Stopped, ServerState::Starting)?;

        let addr = self.handler.config.bind_address;
        let bound = TcpListener::bind(addr)
            .await
            .and_then(|listener| Ok((listener.local_addr()?, listener)));
        let (local_addr, listener) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                self.state.send_replace(ServerState::Stopped);
                return Err(HttpMcpError::Bind { addr, source });
            }
        };

        let shutdown = CancellationHandle::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            self.handler.clone(),
            shutdown.clone(),
        ));
        *self.running.lock() = Some(Running {
            local_addr,
            shutdown,
            accept_task,
        });
        self.advance(ServerState::Starting, ServerState::Running)?;

        info!(
            address = %local_addr,
            endpoint = %self.handler.config.endpoint,
            "HTTP MCP server listening"
        );
        Ok(local_addr)
    }

    /// Close the listener, then every live session. A no-op when already
    /// stopped.
    pub async fn stop(&self) -> Result<()> {
        if self.state() == ServerState::Stopped {
            return Ok(());
        }
        self.advance(ServerState::Running, ServerState::Stopping)?;

        // Out of the pool first, so dropped event streams do not report the
        // shutdown as a stream failure.
        let sessions = self.handler.pool.drain();

        let running = self.running.lock().take();
        if let Some(running) = running {
            running.shutdown.cancel("server stopping");
            if let Err(error) = running.accept_task.await {
                warn!(error = %error, "accept loop ended abnormally");
            }
        }
        info!("HTTP responder closed");

        let count = sessions.len();
        for entry in sessions {
            entry.session().close();
        }
        info!(sessions = count, "HTTP MCP server stopped");

        self.state.send_replace(ServerState::Stopped);
        Ok(())
    }

    /// Start, wait for `signal`, then stop.
    pub async fn run_until<F: Future>(&self, signal: F) -> Result<()> {
        self.start().await?;
        signal.await;
        self.stop().await
    }
}

impl Drop for HttpMcpServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.shutdown.cancel("server dropped");
            running.accept_task.abort();
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: StreamableHttpHandler,
    shutdown: CancellationHandle,
) {
    let mut connections = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!(error = %error, "failed to accept connection");
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };
        debug!(peer = %peer_addr, "new connection");
        while connections.try_join_next().is_some() {}

        let handler = handler.clone();
        connections.spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(handler.handle(req, Some(peer_addr)).await) }
            });
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                // Filter out common client disconnection errors that aren't actual problems
                if err.is_incomplete_message() || err.is_canceled() {
                    debug!(peer = %peer_addr, error = %err, "client disconnected");
                } else {
                    error!(peer = %peer_addr, error = %err, "error serving connection");
                }
            }
        });
    }

    drop(listener);
    connections.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> HttpMcpServer {
        let mcp = McpServer::builder().name("http-test").build().unwrap();
        HttpMcpServer::builder(mcp)
            .bind_address(SocketAddr::from(([127, 0, 0, 1], 0)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_validates_oauth_documents() {
        let mcp = McpServer::builder().build().unwrap();
        let result = HttpMcpServer::builder(mcp)
            .oauth_protected_resource(ProtectedResourceMetadata::new("not a url", vec![]))
            .build();
        assert!(matches!(result, Err(HttpMcpError::Discovery(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let server = server();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());

        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.state(), ServerState::Running);
        assert_eq!(server.local_addr(), Some(addr));

        let again = server.start().await.unwrap_err();
        assert!(matches!(
            again,
            HttpMcpError::InvalidState {
                expected: ServerState::Stopped,
                actual: ServerState::Running,
            }
        ));

        server.stop().await.unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().is_none());
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());

        // Stopping twice is harmless.
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_returns_to_stopped() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mcp = McpServer::builder().build().unwrap();
        let server = HttpMcpServer::builder(mcp)
            .bind_address(taken.local_addr().unwrap())
            .build()
            .unwrap();
        assert!(matches!(
            server.start().await,
            Err(HttpMcpError::Bind { .. })
        ));
        assert_eq!(server.state(), ServerState::Stopped);
    }
}
