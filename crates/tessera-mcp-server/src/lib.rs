//! # Tessera MCP Server
//!
//! Transport-independent session engine for Model Context Protocol servers.
//! Register tools, resources, resource templates and prompts on an
//! [`McpServer`], then hand it to a transport: [`stdio`] for a single
//! session over a pipe, or the `tessera-http-mcp-server` crate for many
//! sessions over HTTP.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tessera_mcp_server::{McpServer, ToolBuilder, stdio};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let add = ToolBuilder::new("add")
//!         .description("Add two numbers")
//!         .number_param("a", "First operand")
//!         .number_param("b", "Second operand")
//!         .execute(|args, _ctx| async move {
//!             let a = args["a"].as_f64().unwrap_or_default();
//!             let b = args["b"].as_f64().unwrap_or_default();
//!             Ok((a + b).to_string())
//!         })
//!         .build()?;
//!
//!     let server = McpServer::builder().name("calculator").tool(add).build()?;
//!     stdio().serve(&server).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod events;
pub mod handlers;
pub mod mediator;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod server;
pub mod session;
pub mod stdio;
pub mod tool;
pub mod transport;
pub mod uri_template;
pub mod validation;

pub use auth::AuthContext;
pub use cancellation::CancellationHandle;
pub use config::{ConfigError, TransportConfig, TransportKind};
pub use context::ToolContext;
pub use events::ServerEvent;
pub use mediator::{MediatorError, OutboundMediator, RequestOptions};
pub use pipeline::InvocationPipeline;
pub use prompt::{DynamicPrompt, McpPrompt, PromptBuilder};
pub use registry::{CapabilityRegistry, RegistryError};
pub use resolver::{ResolvedResource, ResourceResolver};
pub use resource::{
    DynamicResource, DynamicResourceTemplate, McpResource, McpResourceTemplate, ResourceBuilder,
    ResourceTemplateBuilder,
};
pub use server::{McpServer, McpServerBuilder};
pub use session::{ConnectionState, McpSession, SessionConfig};
pub use stdio::{StdioTransport, stdio};
pub use tool::{DynamicTool, McpTool, ToolBuilder, ToolOutput};
pub use transport::{ChannelLink, MessageReceiver, MessageSender, TransportError, TransportLink};
pub use uri_template::UriTemplate;
pub use validation::{JsonSchemaValidator, ValidationIssue, Validator};

// Re-export the wire crates so servers need a single dependency.
pub use tessera_mcp_json_rpc_server as json_rpc;
pub use tessera_mcp_protocol as protocol;
pub use tessera_mcp_protocol::{
    CallToolResult, ContentBlock, LoggingLevel, McpError, McpResult, ResourceContents, Root,
};
