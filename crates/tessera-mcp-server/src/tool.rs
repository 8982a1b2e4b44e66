//! MCP Tool Trait
//!
//! Tools are registered as `Arc<dyn McpTool>`. Most servers build them with
//! [`ToolBuilder`]; hand-written implementations only need `name` and `call`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use tessera_mcp_protocol::{CallToolResult, McpError, McpResult, Tool, ToolAnnotations};

use crate::context::ToolContext;

/// What a tool callback hands back before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Becomes a single text payload.
    Text(String),
    /// Passed through after content validation.
    Content(CallToolResult),
    /// Nothing to add. Valid only for streaming tools, whose chunks were the result.
    Empty,
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_string())
    }
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        ToolOutput::Content(result)
    }
}

impl From<()> for ToolOutput {
    fn from(_: ()) -> Self {
        ToolOutput::Empty
    }
}

/// High-level trait for implementing MCP tools
#[async_trait]
pub trait McpTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> Option<&str> {
        None
    }

    /// JSON Schema for the arguments. `None` accepts any object unvalidated.
    fn input_schema(&self) -> Option<&Value> {
        None
    }

    fn annotations(&self) -> Option<&ToolAnnotations> {
        None
    }

    /// Per-tool limit, overriding the server default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn is_streaming(&self) -> bool {
        self.annotations()
            .and_then(|a| a.streaming_hint)
            .unwrap_or(false)
    }

    async fn call(&self, args: Value, ctx: ToolContext) -> McpResult<ToolOutput>;

    /// Descriptor for `tools/list`.
    fn to_tool(&self) -> Tool {
        Tool {
            name: self.name().to_string(),
            description: self.description().map(str::to_string),
            input_schema: self.input_schema().cloned().unwrap_or_else(Tool::open_schema),
            annotations: self.annotations().filter(|a| !a.is_empty()).cloned(),
        }
    }
}

pub type DynamicToolFn = Box<
    dyn Fn(Value, ToolContext) -> Pin<Box<dyn Future<Output = McpResult<ToolOutput>> + Send>>
        + Send
        + Sync,
>;

/// Builder for creating tools at runtime
pub struct ToolBuilder {
    name: String,
    description: Option<String>,
    input_schema: Option<Value>,
    annotations: Option<ToolAnnotations>,
    timeout: Option<Duration>,
    execute_fn: Option<DynamicToolFn>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
            annotations: None,
            timeout: None,
            execute_fn: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the whole input schema.
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Add a required parameter with the given JSON Schema.
    pub fn required_param(mut self, name: impl Into<String>, schema: Value) -> Self {
        let name = name.into();
        let root = self
            .input_schema
            .get_or_insert_with(|| json!({ "type": "object", "properties": {}, "required": [] }));
        if let Value::Object(root) = root {
            let properties = root
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(properties) = properties {
                properties.insert(name.clone(), schema);
            }
            let required = root
                .entry("required")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(required) = required {
                required.push(Value::String(name));
            }
        }
        self
    }

    pub fn number_param(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        self.required_param(name, json!({ "type": "number", "description": description }))
    }

    pub fn string_param(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        self.required_param(name, json!({ "type": "string", "description": description }))
    }

    pub fn integer_param(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        let description = description.into();
        self.required_param(name, json!({ "type": "integer", "description": description }))
    }

    pub fn annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    /// Mark the tool as pushing partial content before its final result.
    pub fn streaming(mut self) -> Self {
        self.annotations.get_or_insert_with(Default::default).streaming_hint = Some(true);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the execution function
    pub fn execute<F, Fut, O>(mut self, f: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<O>> + Send + 'static,
        O: Into<ToolOutput>,
    {
        self.execute_fn = Some(Box::new(move |args, ctx| {
            let fut = f(args, ctx);
            Box::pin(async move { fut.await.map(Into::into) })
        }));
        self
    }

    pub fn build(self) -> McpResult<DynamicTool> {
        if self.name.trim().is_empty() {
            return Err(McpError::configuration("tool name must not be empty"));
        }
        let execute_fn = self.execute_fn.ok_or_else(|| {
            McpError::configuration(format!("tool '{}' has no execution function", self.name))
        })?;
        if let Some(schema) = &self.input_schema
            && !schema.is_object()
        {
            return Err(McpError::configuration(format!(
                "tool '{}' input schema must be a JSON object",
                self.name
            )));
        }

        Ok(DynamicTool {
            name: self.name,
            description: self.description,
            input_schema: self.input_schema,
            annotations: self.annotations,
            timeout: self.timeout,
            execute_fn,
        })
    }
}

/// Tool created by [`ToolBuilder`]
pub struct DynamicTool {
    name: String,
    description: Option<String>,
    input_schema: Option<Value>,
    annotations: Option<ToolAnnotations>,
    timeout: Option<Duration>,
    execute_fn: DynamicToolFn,
}

#[async_trait]
impl McpTool for DynamicTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn input_schema(&self) -> Option<&Value> {
        self.input_schema.as_ref()
    }

    fn annotations(&self) -> Option<&ToolAnnotations> {
        self.annotations.as_ref()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn call(&self, args: Value, ctx: ToolContext) -> McpResult<ToolOutput> {
        (self.execute_fn)(args, ctx).await
    }
}
