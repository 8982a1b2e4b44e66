//! Tool invocation pipeline
//!
//! `lookup -> validate -> execute under timeout -> normalize`. Failures
//! before the callback runs (unknown tool, invalid arguments) are request
//! errors. Anything that goes wrong while or after the callback runs is
//! folded into an `isError` result so the client always gets content back.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::{Value, json};
use tracing::{debug, warn};

use tessera_mcp_protocol::{CallToolResult, McpError, McpResult};

use crate::context::ToolContext;
use crate::registry::CapabilityRegistry;
use crate::tool::{McpTool, ToolOutput};
use crate::validation::Validator;

pub struct InvocationPipeline {
    registry: Arc<CapabilityRegistry>,
    validator: Arc<dyn Validator>,
    default_timeout: Option<Duration>,
}

enum Outcome {
    Finished(McpResult<ToolOutput>),
    Panicked(String),
    TimedOut(Duration),
}

impl InvocationPipeline {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        validator: Arc<dyn Validator>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            validator,
            default_timeout,
        }
    }

    pub async fn call(
        &self,
        name: &str,
        arguments: Option<Value>,
        ctx: ToolContext,
    ) -> McpResult<CallToolResult> {
        let tool = self
            .registry
            .tool(name)
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;

        let arguments = arguments.unwrap_or_else(|| json!({}));
        let arguments = match tool.input_schema() {
            Some(schema) => self.validator.validate(schema, &arguments).map_err(|issues| {
                let summary = issues
                    .iter()
                    .map(|issue| issue.summary())
                    .collect::<Vec<_>>()
                    .join("; ");
                McpError::ValidationFailed {
                    tool: name.to_string(),
                    summary,
                    issues: issues
                        .iter()
                        .filter_map(|issue| serde_json::to_value(issue).ok())
                        .collect(),
                }
            })?,
            None => arguments,
        };

        let streaming = tool.is_streaming();
        let ctx = ctx.for_tool(name, streaming);
        let cancellation = ctx.cancellation().clone();
        let timeout = tool.timeout().or(self.default_timeout);

        let outcome = execute(tool.as_ref(), arguments, ctx, timeout).await;
        let result = match outcome {
            Outcome::TimedOut(limit) => {
                cancellation.cancel("timeout");
                warn!(tool = name, timeout_ms = limit.as_millis() as u64, "tool call timed out");
                CallToolResult::error(format!(
                    "Tool '{name}' timed out after {} ms",
                    limit.as_millis()
                ))
            }
            Outcome::Panicked(message) => {
                warn!(tool = name, panic = %message, "tool callback panicked");
                CallToolResult::error(format!("Tool '{name}' panicked: {message}"))
            }
            Outcome::Finished(Err(error)) => {
                debug!(tool = name, error = %error, "tool callback returned an error");
                CallToolResult::error(tool_error_message(&error))
            }
            Outcome::Finished(Ok(output)) => normalize(name, streaming, output),
        };
        Ok(result)
    }
}

async fn execute(
    tool: &dyn McpTool,
    arguments: Value,
    ctx: ToolContext,
    timeout: Option<Duration>,
) -> Outcome {
    let call = AssertUnwindSafe(tool.call(arguments, ctx)).catch_unwind();
    let finished = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(finished) => finished,
            Err(_) => return Outcome::TimedOut(limit),
        },
        None => call.await,
    };
    match finished {
        Ok(result) => Outcome::Finished(result),
        Err(payload) => Outcome::Panicked(panic_message(payload)),
    }
}

fn normalize(name: &str, streaming: bool, output: ToolOutput) -> CallToolResult {
    match output {
        ToolOutput::Text(text) => CallToolResult::text(text),
        ToolOutput::Content(result) => match result.validate() {
            Ok(()) => result,
            Err(error) => {
                warn!(tool = name, error = %error, "tool returned invalid content");
                CallToolResult::error(format!("Tool '{name}' returned invalid content: {error}"))
            }
        },
        ToolOutput::Empty if streaming => CallToolResult::success(Vec::new()),
        ToolOutput::Empty => CallToolResult::error(format!("Tool '{name}' returned no content")),
    }
}

/// Plain-string failures read as the tool's own message.
fn tool_error_message(error: &McpError) -> String {
    match error {
        McpError::ToolExecutionError(message) => message.clone(),
        other => other.to_string(),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
