//! MCP server runners for pulse-mcp.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use pulse_core::control::PulseControlPlane;
use pulse_core::warehouse::WarehouseConnector;
use rmcp::serve_server;
use rmcp::transport::io::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig,
    StreamableHttpService,
    session::local::LocalSessionManager,
};
use tracing::info;

use crate::PulseMcp;

/// Default listen address for the streamable HTTP transport.
pub const DEFAULT_HTTP_ADDR: SocketAddr = SocketAddr::new(
    std::net::IpAddr::V4(Ipv4Addr::LOCALHOST),
    4020,
);

/// Configuration for the MCP streamable HTTP server.
#[derive(Debug, Clone)]
pub struct McpHttpServerConfig {
    pub addr: SocketAddr,
    pub stateful_mode: bool,
    pub sse_keep_alive: Option<Duration>,
    pub sse_retry: Option<Duration>,
}

impl McpHttpServerConfig {
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            stateful_mode: true,
            sse_keep_alive: Some(Duration::from_secs(15)),
            sse_retry: Some(Duration::from_secs(3)),
        }
    }
}

impl Default for McpHttpServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_ADDR)
    }
}

/// Serves the MCP server over stdio.
///
/// # Errors
/// Returns any transport or server error.
pub async fn serve_stdio<W: WarehouseConnector>(
    control: Arc<PulseControlPlane<W>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let service = PulseMcp::with_control(control);
    let (stdin, stdout) = stdio();
    info!("serving MCP over stdio");
    let running = serve_server(service, (stdin, stdout)).await?;
    let _ = running.waiting().await?;
    info!("stdio session ended");
    Ok(())
}

/// Builds the axum router exposing `/health` and the MCP endpoint at `/mcp`.
#[must_use]
pub fn http_router<W: WarehouseConnector>(
    control: Arc<PulseControlPlane<W>>,
    config: &McpHttpServerConfig,
) -> Router {
    let service: StreamableHttpService<PulseMcp<W>, LocalSessionManager> =
        StreamableHttpService::new(
            move || Ok(PulseMcp::with_control(control.clone())),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig {
                sse_keep_alive: config.sse_keep_alive,
                sse_retry: config.sse_retry,
                stateful_mode: config.stateful_mode,
                ..Default::default()
            },
        );

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest_service("/mcp", service)
}

/// Serves the MCP server using streamable HTTP transport.
///
/// # Errors
/// Returns any listener or server error.
pub async fn serve_streamable_http<W: WarehouseConnector>(
    control: Arc<PulseControlPlane<W>>,
    config: McpHttpServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = http_router(control, &config);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %listener.local_addr()?, "serving MCP over streamable HTTP");
    axum::serve(listener, app).await?;
    Ok(())
}
