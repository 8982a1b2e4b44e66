//! MCP error taxonomy and its JSON-RPC mapping.

use serde_json::{Value, json};
use tessera_mcp_json_rpc_server::{JsonRpcErrorObject, ToJsonRpcError};

pub type McpResult<T> = Result<T, McpError>;

/// Errors surfaced by protocol handlers.
///
/// Request-level variants become JSON-RPC error responses through
/// [`McpError::to_error_object`]. Tool execution failures normally never get
/// this far: the invocation pipeline folds them into `isError` content.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// Tool arguments rejected by the tool's input schema. `issues` carries
    /// one `{path, message, expected?, received?}` object per violation.
    #[error("Tool '{tool}' parameter validation failed: {summary}")]
    ValidationFailed {
        tool: String,
        summary: String,
        issues: Vec<Value>,
    },

    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionError(String),

    #[error("Resource execution failed: {0}")]
    ResourceExecutionError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl From<String> for McpError {
    fn from(message: String) -> Self {
        Self::ToolExecutionError(message)
    }
}

impl From<&str> for McpError {
    fn from(message: &str) -> Self {
        Self::ToolExecutionError(message.to_string())
    }
}

impl McpError {
    pub fn missing_param(param: &str) -> Self {
        Self::MissingParameter(param.to_string())
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    pub fn tool_execution(message: impl Into<String>) -> Self {
        Self::ToolExecutionError(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    /// True for the "not found" family (unknown method, tool, prompt, resource).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            McpError::MethodNotFound(_)
                | McpError::ToolNotFound(_)
                | McpError::ResourceNotFound(_)
                | McpError::PromptNotFound(_)
        )
    }

    /// Convert to a JsonRpcErrorObject for JSON-RPC 2.0 responses
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        match self {
            McpError::MethodNotFound(method) => JsonRpcErrorObject::method_not_found(method),
            McpError::ToolNotFound(_) | McpError::PromptNotFound(_) => JsonRpcErrorObject::new(
                tessera_mcp_json_rpc_server::JsonRpcErrorCode::MethodNotFound,
                Some(self.to_string()),
                None,
            ),
            McpError::ResourceNotFound(uri) => JsonRpcErrorObject::server_error(
                -32002,
                self.to_string(),
                Some(json!({ "uri": uri })),
            ),

            McpError::InvalidParameters(_)
            | McpError::MissingParameter(_)
            | McpError::InvalidContent(_) => JsonRpcErrorObject::invalid_params(self.to_string()),
            McpError::ValidationFailed { tool, issues, .. } => {
                JsonRpcErrorObject::invalid_params(self.to_string())
                    .with_data(json!({ "tool": tool, "issues": issues }))
            }

            McpError::InvalidRequest(msg) => JsonRpcErrorObject::invalid_request(Some(msg.clone())),
            McpError::Unauthorized(msg) => JsonRpcErrorObject::server_error(-32001, msg.clone(), None),

            McpError::ToolExecutionError(_)
            | McpError::ResourceExecutionError(_)
            | McpError::ConfigurationError(_)
            | McpError::SessionError(_)
            | McpError::SerializationError(_) => {
                JsonRpcErrorObject::internal_error(Some(self.to_string()))
            }
        }
    }
}

impl ToJsonRpcError for McpError {
    fn to_error_object(&self) -> JsonRpcErrorObject {
        McpError::to_error_object(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_family_codes() {
        assert_eq!(McpError::ToolNotFound("x".into()).to_error_object().code, -32601);
        assert_eq!(McpError::PromptNotFound("x".into()).to_error_object().code, -32601);
        assert_eq!(McpError::MethodNotFound("x".into()).to_error_object().code, -32601);

        let resource = McpError::ResourceNotFound("thing://nope".into()).to_error_object();
        assert_eq!(resource.code, -32002);
        assert!(resource.message.contains("thing://nope"));
    }

    #[test]
    fn test_validation_failure_is_invalid_params_with_detail() {
        let error = McpError::ValidationFailed {
            tool: "add".into(),
            summary: "b: expected number, received string".into(),
            issues: vec![json!({"path": "b"})],
        };
        let object = error.to_error_object();
        assert_eq!(object.code, -32602);
        assert!(object.message.contains("'add'"));
        assert!(object.message.contains("b: expected number"));
        assert_eq!(object.data.unwrap()["issues"][0]["path"], "b");
    }

    #[test]
    fn test_unauthorized_is_server_error() {
        let object = McpError::Unauthorized("missing bearer token".into()).to_error_object();
        assert_eq!(object.code, -32001);
    }
}
