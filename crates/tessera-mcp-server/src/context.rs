//! Per-call context handed to tool implementations.
//!
//! A [`ToolContext`] is the tool's only window onto its session: it can log
//! to the client, report progress, stream partial content, read the client's
//! roots and issue sampling requests. Everything it sends goes through the
//! same ordered queue as the call's final response, so notifications emitted
//! before the tool returns always precede that response on the wire.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::debug;

use tessera_mcp_json_rpc_server::{JsonRpcNotification, RequestId};
use tessera_mcp_protocol::logging::LoggingMessageParams;
use tessera_mcp_protocol::notifications::ProgressParams;
use tessera_mcp_protocol::sampling::{CreateMessageParams, CreateMessageResult};
use tessera_mcp_protocol::{ContentBlock, LoggingLevel, McpError, McpResult, Root, methods};

use crate::auth::AuthContext;
use crate::cancellation::CancellationHandle;
use crate::mediator::{MediatorError, RequestOptions};
use crate::session::McpSession;
use crate::transport::MessageSender;

#[derive(Clone)]
pub struct ToolContext {
    session: Arc<McpSession>,
    request_id: RequestId,
    sink: MessageSender,
    progress_token: Option<Value>,
    cancellation: CancellationHandle,
    tool_name: String,
    streaming: bool,
}

impl ToolContext {
    pub(crate) fn new(
        session: Arc<McpSession>,
        request_id: RequestId,
        sink: MessageSender,
        progress_token: Option<Value>,
        cancellation: CancellationHandle,
    ) -> Self {
        Self {
            session,
            request_id,
            sink,
            progress_token,
            cancellation,
            tool_name: String::new(),
            streaming: false,
        }
    }

    pub(crate) fn for_tool(mut self, name: &str, streaming: bool) -> Self {
        self.tool_name = name.to_string();
        self.streaming = streaming;
        self
    }

    pub fn session_id(&self) -> &str {
        self.session.id()
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Identity attached by the transport's authenticate hook, if any.
    pub fn auth(&self) -> Option<&AuthContext> {
        self.session.auth()
    }

    /// Current client roots snapshot.
    pub fn roots(&self) -> Vec<Root> {
        self.session.roots()
    }

    /// Watch the roots list; updates after `notifications/roots/list_changed`.
    pub fn watch_roots(&self) -> watch::Receiver<Vec<Root>> {
        self.session.watch_roots()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when the call is cancelled or times out.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancellation
    }

    fn notify(&self, method: &str, params: Value) -> bool {
        let notification = JsonRpcNotification::new(method, Some(params));
        match serde_json::to_value(notification) {
            Ok(frame) => self.sink.send(frame).is_ok(),
            Err(_) => false,
        }
    }

    /// Send `notifications/message` when `level` passes the session threshold.
    pub fn log(&self, level: LoggingLevel, data: impl Into<Value>) {
        if !level.should_log(self.session.log_level()) {
            return;
        }
        let params = LoggingMessageParams {
            level,
            logger: Some(self.tool_name.clone()).filter(|name| !name.is_empty()),
            data: data.into(),
        };
        let params = match serde_json::to_value(params) {
            Ok(params) => params,
            Err(_) => return,
        };
        if !self.notify(methods::NOTIFY_MESSAGE, params) {
            debug!(session_id = %self.session_id(), "log notification dropped, session closed");
        }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Debug, message.into())
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Info, message.into())
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Warning, message.into())
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LoggingLevel::Error, message.into())
    }

    /// Send `notifications/progress`. A no-op unless the caller supplied a
    /// progress token with the request.
    pub fn report_progress(&self, progress: f64, total: Option<f64>, message: Option<&str>) {
        let Some(token) = &self.progress_token else {
            return;
        };
        let params = ProgressParams {
            progress_token: token.clone(),
            progress,
            total,
            message: message.map(str::to_string),
        };
        if let Ok(params) = serde_json::to_value(params) {
            self.notify(methods::NOTIFY_PROGRESS, params);
        }
    }

    /// Push one partial payload ahead of the final result.
    ///
    /// Only tools marked streaming may call this. The chunk is queued before
    /// the call returns, so chunks keep their order relative to each other
    /// and to the final response.
    pub fn stream_content(&self, content: ContentBlock) -> McpResult<()> {
        if !self.streaming {
            return Err(McpError::tool_execution(format!(
                "Tool '{}' is not marked as streaming",
                self.tool_name
            )));
        }
        content.validate()?;
        let params = json!({ "toolName": self.tool_name, "content": content });
        if self.notify(methods::NOTIFY_TOOL_STREAM_CONTENT, params) {
            Ok(())
        } else {
            Err(McpError::SessionError("session closed".into()))
        }
    }

    /// Ask the client's model for a completion via `sampling/createMessage`.
    pub async fn request_sampling(
        &self,
        params: CreateMessageParams,
        options: RequestOptions,
    ) -> Result<CreateMessageResult, MediatorError> {
        let options = match options.signal {
            Some(_) => options,
            None => options.with_signal(self.cancellation.clone()),
        };
        self.session.request_sampling(params, options).await
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_id", &self.session_id())
            .field("request_id", &self.request_id)
            .field("tool_name", &self.tool_name)
            .field("streaming", &self.streaming)
            .finish()
    }
}
