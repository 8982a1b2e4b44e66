//! Classification of incoming frames.

use serde_json::Value;

use crate::error::JsonRpcError;
use crate::notification::JsonRpcNotification;
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;
use crate::types::RequestId;

/// Any frame a peer may send us.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// Reply to a request we issued.
    Response(JsonRpcResponse),
    /// Error reply to a request we issued.
    Error(JsonRpcError),
}

impl IncomingMessage {
    /// Decode a raw text frame. Malformed JSON yields a parse error (-32700).
    pub fn from_str(text: &str) -> Result<Self, JsonRpcError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| JsonRpcError::parse_error(e.to_string()))?;
        Self::parse(value)
    }

    /// Classify a decoded JSON value. Anything that is not a single
    /// request, notification or response object yields -32600.
    pub fn parse(value: Value) -> Result<Self, JsonRpcError> {
        let Some(object) = value.as_object() else {
            return Err(JsonRpcError::invalid_request(
                None,
                "expected a single JSON-RPC object",
            ));
        };

        let id = object.get("id").and_then(RequestId::from_value);

        if object.contains_key("method") {
            return if id.is_some() {
                serde_json::from_value(value)
                    .map(IncomingMessage::Request)
                    .map_err(|e| JsonRpcError::invalid_request(id, e.to_string()))
            } else {
                serde_json::from_value(value)
                    .map(IncomingMessage::Notification)
                    .map_err(|e| JsonRpcError::invalid_request(None, e.to_string()))
            };
        }

        if object.contains_key("error") {
            return serde_json::from_value(value)
                .map(IncomingMessage::Error)
                .map_err(|e| JsonRpcError::invalid_request(id, e.to_string()));
        }

        if object.contains_key("result") && id.is_some() {
            return serde_json::from_value(value)
                .map(IncomingMessage::Response)
                .map_err(|e| JsonRpcError::invalid_request(id, e.to_string()));
        }

        Err(JsonRpcError::invalid_request(
            id,
            "object is neither a request, a notification nor a response",
        ))
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            IncomingMessage::Request(r) => Some(&r.method),
            IncomingMessage::Notification(n) => Some(&n.method),
            IncomingMessage::Response(_) | IncomingMessage::Error(_) => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, IncomingMessage::Request(_))
    }
}
