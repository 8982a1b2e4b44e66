//! Single-session transport over a duplex byte stream.
//!
//! Frames are newline-delimited JSON. The session lives exactly as long as
//! the input stream: EOF (or a write failure) closes it.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use tessera_mcp_json_rpc_server::{IncomingMessage, JsonRpcMessage};

use crate::auth::AuthContext;
use crate::server::McpServer;
use crate::session::{McpSession, SessionConfig};
use crate::transport::{ChannelLink, MessageReceiver, MessageSender, TransportError};

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct StdioTransport<R, W> {
    reader: R,
    writer: W,
    config: Option<SessionConfig>,
    auth: Option<AuthContext>,
}

/// Transport over the process's own stdin and stdout.
pub fn stdio() -> StdioTransport<tokio::io::Stdin, tokio::io::Stdout> {
    StdioTransport::new(tokio::io::stdin(), tokio::io::stdout())
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            config: None,
            auth: None,
        }
    }

    /// Override the server's default session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Identity for the single session. There is no per-connection
    /// handshake on a pipe, so the caller supplies it up front.
    pub fn auth(mut self, auth: AuthContext) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Serve one session until the input stream ends.
    pub async fn serve(self, server: &McpServer) -> Result<(), TransportError> {
        let (link, outgoing) = ChannelLink::new();
        let link = Arc::new(link);
        let closed = link.closed_signal();
        let sink = link.sender().ok_or(TransportError::Closed)?;

        let config = self
            .config
            .unwrap_or_else(|| server.session_config().clone());
        let session = server.create_session(link.clone(), self.auth, config);
        info!(session_id = %session.id(), "stdio session started");

        let writer = tokio::spawn(write_frames(self.writer, outgoing, session.clone()));

        let connecting = session.clone();
        tokio::spawn(async move { connecting.connect().await });

        let mut lines = BufReader::new(self.reader).lines();
        let result = loop {
            let line = tokio::select! {
                biased;
                _ = closed.cancelled() => break Ok(()),
                line = lines.next_line() => line,
            };
            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(session_id = %session.id(), "stdin closed");
                    break Ok(());
                }
                Err(error) => {
                    session.fail(format!("read error: {error}"));
                    break Err(TransportError::Io(error));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            dispatch_line(&session, &line, &sink);
        };

        session.close();
        drop(sink);
        match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(error = %error, "stdio writer task failed"),
            Err(_) => warn!("stdio writer did not drain in time"),
        }
        info!(session_id = %session.id(), "stdio session ended");
        result
    }
}

fn dispatch_line(session: &Arc<McpSession>, line: &str, sink: &MessageSender) {
    let message = match IncomingMessage::from_str(line) {
        Ok(message) => message,
        Err(error) => {
            debug!(session_id = %session.id(), code = error.error.code, "rejecting malformed frame");
            let _ = sink.send(JsonRpcMessage::error(error).to_value());
            return;
        }
    };
    let Some(message) = session.route_inline(message) else {
        return;
    };
    let session = session.clone();
    let sink = sink.clone();
    tokio::spawn(async move { session.handle_message(message, sink).await });
}

async fn write_frames<W>(mut writer: W, mut outgoing: MessageReceiver, session: Arc<McpSession>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outgoing.recv().await {
        let mut bytes = match serde_json::to_vec(&frame) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(session_id = %session.id(), error = %error, "dropping unserializable frame");
                continue;
            }
        };
        bytes.push(b'\n');
        let written = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;
        if let Err(error) = written {
            session.fail(format!("write error: {error}"));
            session.close();
            break;
        }
    }
}
