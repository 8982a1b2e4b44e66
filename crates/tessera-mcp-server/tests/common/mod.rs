//! Shared harness: an MCP client speaking newline-delimited JSON to a
//! [`StdioTransport`] over in-memory pipes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;

use tessera_mcp_server::{
    McpServer, ResourceBuilder, ResourceContents, ResourceTemplateBuilder, SessionConfig,
    StdioTransport, ToolBuilder, TransportError,
};

const PIPE_CAPACITY: usize = 64 * 1024;
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestClient {
    writer: DuplexStream,
    lines: Lines<BufReader<DuplexStream>>,
    next_id: i64,
    pub server: JoinHandle<Result<(), TransportError>>,
}

impl TestClient {
    pub fn connect(server: &McpServer, config: SessionConfig) -> Self {
        let (client_out, server_in) = tokio::io::duplex(PIPE_CAPACITY);
        let (server_out, client_in) = tokio::io::duplex(PIPE_CAPACITY);
        let server = server.clone();
        let handle = tokio::spawn(async move {
            StdioTransport::new(server_in, server_out)
                .session_config(config)
                .serve(&server)
                .await
        });
        Self {
            writer: client_out,
            lines: BufReader::new(client_in).lines(),
            next_id: 1,
            server: handle,
        }
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn send(&mut self, frame: Value) {
        self.send_raw(&frame.to_string()).await;
    }

    pub async fn request(&mut self, method: &str, params: Value) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        id
    }

    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await;
    }

    pub async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("server closed the stream");
        serde_json::from_str(&line).unwrap()
    }

    /// Next frame if one arrives within `wait`.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Value> {
        match tokio::time::timeout(wait, self.lines.next_line()).await {
            Ok(Ok(Some(line))) => Some(serde_json::from_str(&line).unwrap()),
            _ => None,
        }
    }

    /// Read until the response for `id`; returns it with every frame seen
    /// before it.
    pub async fn response_for(&mut self, id: i64) -> (Value, Vec<Value>) {
        let mut before = Vec::new();
        loop {
            let frame = self.recv().await;
            let is_response = frame.get("method").is_none() && frame["id"] == json!(id);
            if is_response {
                return (frame, before);
            }
            before.push(frame);
        }
    }

    pub async fn call(&mut self, method: &str, params: Value) -> Value {
        let id = self.request(method, params).await;
        self.response_for(id).await.0
    }

    pub async fn initialize(&mut self, capabilities: Value) -> Value {
        let response = self
            .call(
                "initialize",
                json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": capabilities,
                    "clientInfo": {"name": "test-client", "version": "1.0.0"}
                }),
            )
            .await;
        self.notify("notifications/initialized", json!({})).await;
        response
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Value {
        self.call("tools/call", json!({"name": name, "arguments": arguments}))
            .await
    }

    /// Close our end and wait for the transport to finish.
    pub async fn shutdown(self) -> Result<(), TransportError> {
        drop(self.writer);
        drop(self.lines);
        self.server.await.unwrap()
    }
}

pub const STREAM_CHUNKS: usize = 5;
pub const BURST_CHUNKS: usize = 3;

/// Server with the tools and resources the integration tests exercise.
pub fn test_server() -> McpServer {
    let add = ToolBuilder::new("add")
        .description("Add two numbers")
        .number_param("a", "First operand")
        .number_param("b", "Second operand")
        .execute(|args, _ctx| async move {
            let a = args["a"].as_f64().unwrap_or_default();
            let b = args["b"].as_f64().unwrap_or_default();
            Ok((a + b).to_string())
        })
        .build()
        .unwrap();

    let slow = ToolBuilder::new("slow")
        .timeout(Duration::from_millis(50))
        .execute(|_args, _ctx| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("too late")
        })
        .build()
        .unwrap();

    let wait = ToolBuilder::new("wait")
        .execute(|_args, ctx| async move {
            ctx.report_progress(0.0, None, Some("started"));
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("finished")
        })
        .build()
        .unwrap();

    let chunks = ToolBuilder::new("chunks")
        .streaming()
        .execute(|_args, ctx| async move {
            for i in 0..STREAM_CHUNKS {
                ctx.stream_content(tessera_mcp_server::ContentBlock::text(format!("chunk-{i}")))?;
                tokio::task::yield_now().await;
            }
            Ok("done")
        })
        .build()
        .unwrap();

    // Pushes every chunk back to back; nothing suspends after the last one.
    let burst = ToolBuilder::new("burst")
        .streaming()
        .execute(|_args, ctx| async move {
            for i in 0..BURST_CHUNKS {
                ctx.stream_content(tessera_mcp_server::ContentBlock::text(format!("c{i}")))?;
            }
            Ok("final")
        })
        .build()
        .unwrap();

    let config = ResourceBuilder::new("config://app", "app-config")
        .mime_type("application/json")
        .read(|uri| async move {
            Ok(vec![
                ResourceContents::text(uri, r#"{"debug":false}"#).with_mime_type("application/json"),
            ])
        })
        .build()
        .unwrap();

    let admin = ResourceBuilder::new("user://admin/profile", "admin-profile")
        .read(|uri| async move { Ok(vec![ResourceContents::text(uri, "direct")]) })
        .build()
        .unwrap();

    let profiles = ResourceTemplateBuilder::new("user://{id}/profile", "user-profile")
        .read(|uri, vars: HashMap<String, String>| async move {
            let id = vars.get("id").cloned().unwrap_or_default();
            Ok(vec![ResourceContents::text(uri, format!("template:{id}"))])
        })
        .build()
        .unwrap();

    McpServer::builder()
        .name("integration-server")
        .version("0.0.1")
        .tool(add)
        .tool(slow)
        .tool(wait)
        .tool(chunks)
        .tool(burst)
        .resource(config)
        .resource(admin)
        .template(profiles)
        .build()
        .unwrap()
}

/// Session timing for tests: no keepalive, quick capability polling.
pub fn quiet_config() -> SessionConfig {
    SessionConfig {
        ping_interval: None,
        capability_poll_attempts: 3,
        capability_poll_delay: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}
