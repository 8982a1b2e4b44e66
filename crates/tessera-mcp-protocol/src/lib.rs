//! # Model Context Protocol types
//!
//! Wire types shared by the Tessera MCP server crates: the handshake, the
//! content model, tool/resource/prompt descriptors, completion, logging,
//! roots, sampling and progress notifications, plus the [`McpError`]
//! taxonomy and its JSON-RPC mapping.

pub mod completion;
pub mod content;
pub mod error;
pub mod initialize;
pub mod logging;
pub mod notifications;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;
pub mod version;

pub use completion::{CompleteParams, CompleteResult, CompletionReference, CompletionValues};
pub use content::{CallToolResult, ContentBlock, ResourceContents};
pub use error::{McpError, McpResult};
pub use initialize::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResult, ServerCapabilities,
};
pub use logging::LoggingLevel;
pub use roots::Root;
pub use tools::{Tool, ToolAnnotations};
pub use version::McpVersion;

/// Method and notification names used on the wire.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
    pub const COMPLETION_COMPLETE: &str = "completion/complete";
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
    pub const ROOTS_LIST: &str = "roots/list";
    pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";

    pub const NOTIFY_INITIALIZED: &str = "notifications/initialized";
    pub const NOTIFY_CANCELLED: &str = "notifications/cancelled";
    pub const NOTIFY_PROGRESS: &str = "notifications/progress";
    pub const NOTIFY_MESSAGE: &str = "notifications/message";
    pub const NOTIFY_ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";
    pub const NOTIFY_TOOL_STREAM_CONTENT: &str = "notifications/tools/streamContent";
}
