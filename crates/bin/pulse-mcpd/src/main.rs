//! Daemon entry point for the pulse MCP server.
//!
//! Loads configuration from flags and the environment, builds the warehouse
//! connector and `ClickUp` client, and serves MCP over stdio and/or
//! streamable HTTP.

mod config;
mod services;

use pulse_mcp::server::{McpHttpServerConfig, serve_stdio, serve_streamable_http};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::PulseConfig;
use crate::services::build_control_plane;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = PulseConfig::from_args()?;
    info!(
        project_id = %config.project_id,
        stdio = config.enable_stdio,
        http = config.mcp_serve,
        "starting pulse-mcpd"
    );
    let control = build_control_plane(&config)?;
    let http_config = McpHttpServerConfig::new(config.mcp_http_addr);

    match (config.enable_stdio, config.mcp_serve) {
        (true, true) => {
            let http_control = control.clone();
            tokio::spawn(async move {
                if let Err(err) = serve_streamable_http(http_control, http_config).await {
                    error!(error = %err, "streamable HTTP server stopped");
                }
            });
            serve_stdio(control).await
        }
        (true, false) => serve_stdio(control).await,
        (false, _) => serve_streamable_http(control, http_config).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
