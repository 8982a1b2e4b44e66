//! # Tessera HTTP MCP Server
//!
//! Multi-session streamable HTTP transport for a [`tessera_mcp_server::McpServer`].
//! Each client that `POST`s an `initialize` gets its own session, addressed
//! by the `Mcp-Session-Id` header. Health, readiness and OAuth discovery
//! documents are served alongside the MCP endpoint.
//!
//! ```rust,no_run
//! use tessera_http_mcp_server::HttpMcpServer;
//! use tessera_mcp_server::McpServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mcp = McpServer::builder().name("example").build()?;
//!     let server = HttpMcpServer::builder(mcp)
//!         .bind_address("127.0.0.1:8080".parse()?)
//!         .build()?;
//!     server.run_until(tokio::signal::ctrl_c()).await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;

pub mod auth;
pub mod config;
pub mod cors;
pub mod discovery;
pub mod pool;
pub mod server;
pub mod sse;
pub mod streamable_http;

pub use auth::{AllowAll, AuthRejection, Authenticator, BearerTokenAuthenticator, ConnectionInfo};
pub use config::{HealthConfig, HttpServerConfig, OAuthDiscoveryConfig, ReadinessConfig};
pub use cors::CorsLayer;
pub use discovery::{AuthorizationServerMetadata, DiscoveryError, ProtectedResourceMetadata};
pub use pool::{PooledSession, Readiness, SessionPool};
pub use server::{HttpMcpServer, HttpMcpServerBuilder, ServerState};
pub use sse::SseEvent;
pub use streamable_http::{ResponseMode, SESSION_ID_HEADER, extract_session_id};

/// Result type for HTTP MCP server operations
pub type Result<T> = std::result::Result<T, HttpMcpError>;

/// HTTP MCP server errors
#[derive(Debug, thiserror::Error)]
pub enum HttpMcpError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid discovery document: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Server is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: ServerState,
        actual: ServerState,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
