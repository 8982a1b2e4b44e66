//! OAuth discovery documents
//!
//! The server only publishes metadata; it does not issue or verify tokens.
//! Required fields are plain (non-optional) struct fields, so a document
//! cannot be configured without them. Anything else a deployment wants to
//! advertise goes in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

pub const AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";
pub const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("{document}: field '{field}' is not a valid URL: {reason}")]
    InvalidUrl {
        document: &'static str,
        field: &'static str,
        reason: String,
    },
    #[error("{document}: field '{field}' must not be empty")]
    Empty {
        document: &'static str,
        field: &'static str,
    },
}

/// RFC 8414 authorization server metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuthorizationServerMetadata {
    const DOCUMENT: &'static str = "oauth-authorization-server";

    pub fn new(
        issuer: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            scopes_supported: None,
            extra: Map::new(),
        }
    }

    pub fn validate(&self) -> Result<(), DiscoveryError> {
        check_url(Self::DOCUMENT, "issuer", &self.issuer)?;
        check_url(
            Self::DOCUMENT,
            "authorization_endpoint",
            &self.authorization_endpoint,
        )?;
        check_url(Self::DOCUMENT, "token_endpoint", &self.token_endpoint)
    }
}

/// RFC 9728 protected resource metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProtectedResourceMetadata {
    const DOCUMENT: &'static str = "oauth-protected-resource";

    pub fn new(resource: impl Into<String>, authorization_servers: Vec<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers,
            scopes_supported: None,
            extra: Map::new(),
        }
    }

    pub fn validate(&self) -> Result<(), DiscoveryError> {
        check_url(Self::DOCUMENT, "resource", &self.resource)?;
        if self.authorization_servers.is_empty() {
            return Err(DiscoveryError::Empty {
                document: Self::DOCUMENT,
                field: "authorization_servers",
            });
        }
        for server in &self.authorization_servers {
            check_url(Self::DOCUMENT, "authorization_servers", server)?;
        }
        Ok(())
    }
}

fn check_url(document: &'static str, field: &'static str, value: &str) -> Result<(), DiscoveryError> {
    if value.trim().is_empty() {
        return Err(DiscoveryError::Empty { document, field });
    }
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| DiscoveryError::InvalidUrl {
            document,
            field,
            reason: e.to_string(),
        })
}
