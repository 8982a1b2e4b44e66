//! Add server
//!
//! Registers `add(a, b)` and serves it over stdio (default) or HTTP.
//!
//! ```text
//! add-server                                  # one session on stdin/stdout
//! add-server --transport http --port 8649     # many sessions on http://127.0.0.1:8649/mcp
//! ```
//!
//! Flags override the `TESSERA_MCP_*` environment variables.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tessera_http_mcp_server::{HttpMcpServer, HttpServerConfig};
use tessera_mcp_server::{McpServer, ToolBuilder, TransportConfig, TransportKind, stdio};

#[derive(Parser, Debug)]
#[command(name = "add-server", version, about = "MCP server that adds two numbers")]
struct Args {
    /// Transport to serve on: stdio or http
    #[arg(long)]
    transport: Option<TransportKind>,

    /// HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// HTTP endpoint path
    #[arg(long)]
    endpoint: Option<String>,
}

fn build_server() -> anyhow::Result<McpServer> {
    let add = ToolBuilder::new("add")
        .description("Add two numbers")
        .number_param("a", "First number")
        .number_param("b", "Second number")
        .execute(|args, _ctx| async move {
            let a = args["a"].as_f64().unwrap_or_default();
            let b = args["b"].as_f64().unwrap_or_default();
            Ok((a + b).to_string())
        })
        .build()
        .context("failed to build add tool")?;

    McpServer::builder()
        .name("add-server")
        .version(env!("CARGO_PKG_VERSION"))
        .instructions("Call `add` with two numbers to get their sum.")
        .tool(add)
        .build()
        .context("failed to build server")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries protocol frames on the stdio transport
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let mut transport = TransportConfig::from_env()?;
    if let Some(kind) = args.transport {
        transport.kind = kind;
    }
    if let Some(port) = args.port {
        transport.port = port;
    }
    if let Some(endpoint) = args.endpoint {
        transport = transport.with_endpoint(&endpoint)?;
    }

    let server = build_server()?;
    let session_config = server.session_config().clone();
    info!(transport = %transport.kind, "starting add-server");

    match transport.kind {
        TransportKind::Stdio => {
            stdio()
                .session_config(session_config.with_ping_interval(transport.effective_ping_interval()))
                .serve(&server)
                .await?;
        }
        TransportKind::Http => {
            let config = HttpServerConfig::from_transport(&transport, session_config)?;
            let http = HttpMcpServer::builder(server).config(config).build()?;
            http.run_until(async {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %error, "failed to listen for shutdown signal");
                }
            })
            .await?;
        }
    }

    info!("add-server stopped");
    Ok(())
}
