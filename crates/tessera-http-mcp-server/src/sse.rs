//! Server-Sent Events framing for MCP messages

use bytes::Bytes;
use serde_json::Value;

/// One SSE event.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// A JSON-RPC frame
    Data(Value),
    /// Comment line used to keep idle proxies from timing out the stream
    KeepAlive,
}

impl SseEvent {
    /// Format as SSE message
    pub fn format(&self) -> String {
        match self {
            // "message" is the event type MCP clients listen for
            SseEvent::Data(data) => format!("event: message\ndata: {data}\n\n"),
            SseEvent::KeepAlive => ": keepalive\n\n".to_string(),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.format())
    }
}

/// Responses and errors carry an id and no method.
pub(crate) fn is_response(frame: &Value) -> bool {
    frame.get("method").is_none()
        && frame.get("id").is_some()
        && (frame.get("result").is_some() || frame.get("error").is_some())
}
