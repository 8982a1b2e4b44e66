//! Per-connection authentication context.

use std::collections::HashMap;

use serde_json::Value;

/// Identity established by a transport's authenticate hook before the session
/// exists. Handed unchanged to every tool call on that session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
    pub subject: Option<String>,
    pub scopes: Vec<String>,
    pub claims: HashMap<String, Value>,
}

impl AuthContext {
    pub fn for_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: Value) -> Self {
        self.claims.insert(key.into(), value);
        self
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}
