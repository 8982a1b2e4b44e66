//! # JSON-RPC 2.0 envelope
//!
//! Transport-agnostic JSON-RPC 2.0 types used by every Tessera MCP crate.
//! Incoming frames are classified with [`IncomingMessage::parse`]; outgoing
//! frames are built from [`JsonRpcRequest`], [`JsonRpcNotification`],
//! [`JsonRpcResponse`] and [`JsonRpcError`].

pub mod error;
pub mod message;
pub mod notification;
pub mod request;
pub mod response;
pub mod types;

pub use error::{
    JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject, JsonRpcTransportError, ToJsonRpcError,
};
pub use message::IncomingMessage;
pub use notification::JsonRpcNotification;
pub use request::JsonRpcRequest;
pub use response::{JsonRpcMessage, JsonRpcResponse};
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}
