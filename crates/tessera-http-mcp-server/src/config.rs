//! Configuration for the HTTP MCP server

use std::net::{SocketAddr, ToSocketAddrs};

use tessera_mcp_server::{SessionConfig, TransportConfig};

use crate::discovery::{AuthorizationServerMetadata, ProtectedResourceMetadata};
use crate::{HttpMcpError, Result};

/// Liveness endpoint. Answers without looking at any session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    pub enabled: bool,
    pub path: String,
    pub status: u16,
    pub body: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/health".to_string(),
            status: 200,
            body: "✓ Ok".to_string(),
        }
    }
}

/// Readiness endpoint: 200 only while every live session is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/ready".to_string(),
        }
    }
}

/// OAuth discovery documents. Each is served only when set.
#[derive(Debug, Clone, Default)]
pub struct OAuthDiscoveryConfig {
    pub authorization_server: Option<AuthorizationServerMetadata>,
    pub protected_resource: Option<ProtectedResourceMetadata>,
}

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Address to bind to. Port 0 picks a free port.
    pub bind_address: SocketAddr,
    /// Path of the MCP endpoint
    pub endpoint: String,
    pub enable_cors: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    pub health: HealthConfig,
    pub readiness: ReadinessConfig,
    pub oauth: OAuthDiscoveryConfig,
    /// Session timing. `None` uses the MCP server's defaults.
    pub session: Option<SessionConfig>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8080)),
            endpoint: "/mcp".to_string(),
            enable_cors: true,
            max_body_size: 1024 * 1024, // 1MiB
            health: HealthConfig::default(),
            readiness: ReadinessConfig::default(),
            oauth: OAuthDiscoveryConfig::default(),
            session: None,
        }
    }
}

impl HttpServerConfig {
    /// Bind address, endpoint and ping interval from the shared transport
    /// settings. The host may be a name; it is resolved here.
    pub fn from_transport(transport: &TransportConfig, base: SessionConfig) -> Result<Self> {
        let bind_address = (transport.host.as_str(), transport.port)
            .to_socket_addrs()
            .map_err(|e| {
                HttpMcpError::InvalidConfig(format!(
                    "cannot resolve bind address {}: {e}",
                    transport.bind_address()
                ))
            })?
            .next()
            .ok_or_else(|| {
                HttpMcpError::InvalidConfig(format!(
                    "no address found for {}",
                    transport.bind_address()
                ))
            })?;

        Ok(Self {
            bind_address,
            endpoint: transport.endpoint.clone(),
            session: Some(base.with_ping_interval(transport.effective_ping_interval())),
            ..Self::default()
        })
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for (what, path) in [
            ("endpoint", &self.endpoint),
            ("health path", &self.health.path),
            ("readiness path", &self.readiness.path),
        ] {
            if !path.starts_with('/') {
                return Err(HttpMcpError::InvalidConfig(format!(
                    "{what} must start with '/', got '{path}'"
                )));
            }
        }
        if self.max_body_size == 0 {
            return Err(HttpMcpError::InvalidConfig(
                "max_body_size must be greater than zero".to_string(),
            ));
        }
        if hyper::StatusCode::from_u16(self.health.status).is_err() {
            return Err(HttpMcpError::InvalidConfig(format!(
                "invalid health status {}",
                self.health.status
            )));
        }
        if let Some(metadata) = &self.oauth.authorization_server {
            metadata.validate()?;
        }
        if let Some(metadata) = &self.oauth.protected_resource {
            metadata.validate()?;
        }
        Ok(())
    }
}
