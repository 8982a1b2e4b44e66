use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{JsonRpcVersion, RequestId};

/// JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError(i64), // -32099 to -32000
}

impl JsonRpcErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            JsonRpcErrorCode::ParseError => crate::error_codes::PARSE_ERROR,
            JsonRpcErrorCode::InvalidRequest => crate::error_codes::INVALID_REQUEST,
            JsonRpcErrorCode::MethodNotFound => crate::error_codes::METHOD_NOT_FOUND,
            JsonRpcErrorCode::InvalidParams => crate::error_codes::INVALID_PARAMS,
            JsonRpcErrorCode::InternalError => crate::error_codes::INTERNAL_ERROR,
            JsonRpcErrorCode::ServerError(code) => *code,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JsonRpcErrorCode::ParseError => "Parse error",
            JsonRpcErrorCode::InvalidRequest => "Invalid Request",
            JsonRpcErrorCode::MethodNotFound => "Method not found",
            JsonRpcErrorCode::InvalidParams => "Invalid params",
            JsonRpcErrorCode::InternalError => "Internal error",
            JsonRpcErrorCode::ServerError(_) => "Server error",
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// The `error` member of an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorObject {
    pub fn new(code: JsonRpcErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.message().to_string()),
            data,
        }
    }

    pub fn parse_error(detail: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::ParseError, detail, None)
    }

    pub fn invalid_request(detail: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidRequest, detail, None)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::MethodNotFound,
            Some(format!("Method '{method}' not found")),
            None,
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidParams, Some(message.into()), None)
    }

    pub fn internal_error(message: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::InternalError, message, None)
    }

    /// Implementation-defined server error. `code` must lie in -32099..=-32000.
    pub fn server_error(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        debug_assert!(
            (crate::error_codes::SERVER_ERROR_START..=crate::error_codes::SERVER_ERROR_END)
                .contains(&code),
            "server error code {code} out of range"
        );
        Self::new(JsonRpcErrorCode::ServerError(code), Some(message.into()), data)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// JSON-RPC error response. `id` is null when the request id could not be read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    pub id: Option<RequestId>,
    pub error: JsonRpcErrorObject,
}

impl JsonRpcError {
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorObject) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            id,
            error,
        }
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(None, JsonRpcErrorObject::parse_error(Some(detail.into())))
    }

    pub fn invalid_request(id: Option<RequestId>, detail: impl Into<String>) -> Self {
        Self::new(id, JsonRpcErrorObject::invalid_request(Some(detail.into())))
    }

    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(Some(id), JsonRpcErrorObject::method_not_found(method))
    }

    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(Some(id), JsonRpcErrorObject::invalid_params(message))
    }

    pub fn internal_error(id: Option<RequestId>, message: Option<String>) -> Self {
        Self::new(id, JsonRpcErrorObject::internal_error(message))
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC Error {}: {}", self.error.code, self.error.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// Domain errors that know their JSON-RPC representation.
pub trait ToJsonRpcError: std::error::Error + Send + Sync + 'static {
    fn to_error_object(&self) -> JsonRpcErrorObject;
}

/// Transport-level errors for JSON-RPC processing (no domain logic)
#[derive(Debug, Error)]
pub enum JsonRpcTransportError {
    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    ProtocolError(String),
}
