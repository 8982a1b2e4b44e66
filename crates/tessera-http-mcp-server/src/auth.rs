//! Authenticate hook
//!
//! Runs on every request to the MCP endpoint, before a session is looked up
//! or created. A rejection is answered with `401` and no session is touched.

use std::net::SocketAddr;

use async_trait::async_trait;
use hyper::HeaderMap;
use hyper::header::AUTHORIZATION;

use tessera_mcp_server::AuthContext;

/// What the hook gets to see about the caller.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl ConnectionInfo {
    /// Token from an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.headers.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = value.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AuthRejection {
    pub message: String,
}

impl AuthRejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` admits the caller without an identity.
    async fn authenticate(
        &self,
        connection: &ConnectionInfo,
    ) -> Result<Option<AuthContext>, AuthRejection>;
}

/// Admits everyone anonymously.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authenticator for AllowAll {
    async fn authenticate(
        &self,
        _connection: &ConnectionInfo,
    ) -> Result<Option<AuthContext>, AuthRejection> {
        Ok(None)
    }
}

/// Admits callers presenting one fixed bearer token.
#[derive(Clone)]
pub struct BearerTokenAuthenticator {
    token: String,
    subject: String,
}

impl BearerTokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            subject: "bearer".to_string(),
        }
    }

    /// Subject recorded on the sessions this token opens.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

impl std::fmt::Debug for BearerTokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuthenticator")
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    async fn authenticate(
        &self,
        connection: &ConnectionInfo,
    ) -> Result<Option<AuthContext>, AuthRejection> {
        let presented = connection
            .bearer_token()
            .ok_or_else(|| AuthRejection::new("missing bearer token"))?;
        if !constant_time_eq(presented.as_bytes(), self.token.as_bytes()) {
            return Err(AuthRejection::new("invalid bearer token"));
        }
        Ok(Some(AuthContext::for_subject(self.subject.clone())))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(authorization: Option<&str>) -> ConnectionInfo {
        let mut headers = HeaderMap::new();
        if let Some(value) = authorization {
            headers.insert(AUTHORIZATION, value.parse().unwrap());
        }
        ConnectionInfo {
            headers,
            remote_addr: None,
        }
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(connection(Some("Bearer abc")).bearer_token(), Some("abc"));
        assert_eq!(connection(Some("bearer abc ")).bearer_token(), Some("abc"));
        assert_eq!(connection(Some("Basic abc")).bearer_token(), None);
        assert_eq!(connection(Some("Bearer ")).bearer_token(), None);
        assert_eq!(connection(None).bearer_token(), None);
    }

    #[tokio::test]
    async fn test_bearer_authenticator() {
        let auth = BearerTokenAuthenticator::new("s3cret").with_subject("ci");

        let context = auth
            .authenticate(&connection(Some("Bearer s3cret")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.subject.as_deref(), Some("ci"));

        let rejection = auth
            .authenticate(&connection(Some("Bearer nope")))
            .await
            .unwrap_err();
        assert_eq!(rejection.message, "invalid bearer token");
        assert!(auth.authenticate(&connection(None)).await.is_err());
    }

    #[test]
    fn test_debug_hides_token() {
        let auth = BearerTokenAuthenticator::new("s3cret");
        assert!(!format!("{auth:?}").contains("s3cret"));
    }
}
