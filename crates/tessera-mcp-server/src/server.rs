//! MCP Server and its builder
//!
//! [`McpServer`] owns the shared, read-mostly parts of the engine (registry,
//! invocation pipeline, resource resolver, event channel). Transport adapters
//! call [`McpServer::create_session`] once per accepted connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use tessera_mcp_protocol::{Implementation, McpError, McpResult};

use crate::auth::AuthContext;
use crate::events::ServerEvent;
use crate::pipeline::InvocationPipeline;
use crate::prompt::McpPrompt;
use crate::registry::CapabilityRegistry;
use crate::resolver::ResourceResolver;
use crate::resource::{McpResource, McpResourceTemplate};
use crate::session::{McpSession, SessionConfig};
use crate::tool::McpTool;
use crate::transport::TransportLink;
use crate::validation::{JsonSchemaValidator, Validator};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// State shared by every session of one server.
pub(crate) struct ServerCore {
    pub(crate) info: Implementation,
    pub(crate) instructions: Option<String>,
    pub(crate) registry: Arc<CapabilityRegistry>,
    pub(crate) pipeline: InvocationPipeline,
    pub(crate) resolver: ResourceResolver,
    pub(crate) events: broadcast::Sender<ServerEvent>,
}

#[derive(Clone)]
pub struct McpServer {
    core: Arc<ServerCore>,
    session_config: SessionConfig,
}

impl McpServer {
    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::new()
    }

    pub fn info(&self) -> &Implementation {
        &self.core.info
    }

    /// The live registry. Registrations made here are visible to calls that
    /// start afterwards, on every session.
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.core.registry
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.core.resolver
    }

    /// Session defaults used by adapters that do not supply their own.
    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Lifecycle events from every session.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.core.events.subscribe()
    }

    /// Bind a new session to `link`. The caller drives it: spawn
    /// [`McpSession::connect`] and feed it incoming frames.
    pub fn create_session(
        &self,
        link: Arc<dyn TransportLink>,
        auth: Option<AuthContext>,
        config: SessionConfig,
    ) -> Arc<McpSession> {
        McpSession::new(self.core.clone(), link, auth, config)
    }
}

/// Builder for MCP servers
pub struct McpServerBuilder {
    name: String,
    version: String,
    instructions: Option<String>,
    tools: Vec<Arc<dyn McpTool>>,
    resources: Vec<Arc<dyn McpResource>>,
    templates: Vec<Arc<dyn McpResourceTemplate>>,
    prompts: Vec<Arc<dyn McpPrompt>>,
    validator: Option<Arc<dyn Validator>>,
    default_tool_timeout: Option<Duration>,
    session_config: SessionConfig,
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl McpServerBuilder {
    pub fn new() -> Self {
        Self {
            name: "tessera-mcp-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            tools: Vec::new(),
            resources: Vec::new(),
            templates: Vec::new(),
            prompts: Vec::new(),
            validator: None,
            default_tool_timeout: None,
            session_config: SessionConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn tool<T: McpTool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn tool_arc(mut self, tool: Arc<dyn McpTool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn resource<R: McpResource + 'static>(mut self, resource: R) -> Self {
        self.resources.push(Arc::new(resource));
        self
    }

    pub fn template<R: McpResourceTemplate + 'static>(mut self, template: R) -> Self {
        self.templates.push(Arc::new(template));
        self
    }

    pub fn prompt<P: McpPrompt + 'static>(mut self, prompt: P) -> Self {
        self.prompts.push(Arc::new(prompt));
        self
    }

    /// Replace the JSON Schema validator used for tool arguments.
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Limit applied to tools that do not declare their own timeout.
    pub fn default_tool_timeout(mut self, timeout: Duration) -> Self {
        self.default_tool_timeout = Some(timeout);
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn build(self) -> McpResult<McpServer> {
        if self.name.is_empty() {
            return Err(McpError::configuration("Server name cannot be empty"));
        }
        if self.version.is_empty() {
            return Err(McpError::configuration("Server version cannot be empty"));
        }

        let registry = Arc::new(CapabilityRegistry::new());
        let mut errors = Vec::new();
        for tool in self.tools {
            if let Err(e) = registry.register_tool(tool) {
                errors.push(e.to_string());
            }
        }
        for resource in self.resources {
            if let Err(e) = registry.register_resource(resource) {
                errors.push(e.to_string());
            }
        }
        for template in self.templates {
            if let Err(e) = registry.register_template(template) {
                errors.push(e.to_string());
            }
        }
        for prompt in self.prompts {
            if let Err(e) = registry.register_prompt(prompt) {
                errors.push(e.to_string());
            }
        }
        if !errors.is_empty() {
            return Err(McpError::configuration(format!(
                "Registration errors:\n{}",
                errors.join("\n")
            )));
        }

        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(JsonSchemaValidator::new()));
        let pipeline =
            InvocationPipeline::new(registry.clone(), validator, self.default_tool_timeout);
        let resolver = ResourceResolver::new(registry.clone());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            name = %self.name,
            version = %self.version,
            tools = registry.tools().len(),
            resources = registry.resources().len(),
            templates = registry.templates().len(),
            prompts = registry.prompts().len(),
            "MCP server built"
        );

        Ok(McpServer {
            core: Arc::new(ServerCore {
                info: Implementation::new(self.name, self.version),
                instructions: self.instructions,
                registry,
                pipeline,
                resolver,
                events,
            }),
            session_config: self.session_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolBuilder;

    fn echo(name: &str) -> crate::tool::DynamicTool {
        ToolBuilder::new(name)
            .execute(|args, _ctx| async move { Ok(args.to_string()) })
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_collects_duplicate_registrations() {
        let error = McpServer::builder()
            .tool(echo("a"))
            .tool(echo("a"))
            .tool(echo("b"))
            .tool(echo("b"))
            .build()
            .err()
            .unwrap();
        let message = error.to_string();
        assert!(message.contains("tool 'a' is already registered"));
        assert!(message.contains("tool 'b' is already registered"));
    }

    #[test]
    fn test_late_registration_is_visible() {
        let server = McpServer::builder().name("late").build().unwrap();
        assert!(server.registry().tool("echo").is_none());
        server.registry().register_tool(Arc::new(echo("echo"))).unwrap();
        assert!(server.registry().tool("echo").is_some());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(McpServer::builder().name("").build().is_err());
    }
}
