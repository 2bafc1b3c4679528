//! MCP server implementation for pulse-mcp.
//!
//! This crate wires the control plane into rmcp tool handlers and exposes the
//! MCP-facing API surface for warehouse queries and `ClickUp` task lookups.

mod helpers;
mod tools;
pub mod server;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use pulse_core::control::PulseControlPlane;
use pulse_core::warehouse::WarehouseConnector;
use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};

pub use tools::clickup::GetClickUpTaskParams;
pub use tools::context::HelpCommands;
pub use tools::warehouse::{
    ClientFilterParams,
    DatasetTablesParams,
    ExecuteBigQueryParams,
};

const SERVER_INSTRUCTIONS: &str = r"pulse-mcp runs SQL against BigQuery, looks up Pulse client metadata, and fetches ClickUp tasks.

Workflow:
1. Find a client with `get_client_details` (filter by `client_id` and/or a partial `client_name`).
2. List the client's datasets with `get_client_datasets` (requires `client_id` or `client_name`).
3. List the tables of a dataset with `get_dataset_tables` (`dataset_id`, optional `project_id`).
4. Run ad-hoc SQL with `execute_bigquery`.
5. Fetch a ClickUp task with `get_clickup_task`, optionally with subtasks and comments.

Notes:
- Every tool returns `{success, results|result}` or `{success: false, error, message, code}`.
- `credentials_path` (alias `service_account_path`) overrides the configured service account file.
- Filter values are inserted into SQL as-is; pass plain identifiers.
- Use `help` and `warehouse_help` for detailed guidance.
- `health` returns `ok`.";

/// MCP server wrapper around the control plane and tool routers.
pub struct PulseMcp<W: WarehouseConnector> {
    tool_router: ToolRouter<Self>,
    control: Arc<PulseControlPlane<W>>,
}

impl<W: WarehouseConnector> Clone for PulseMcp<W> {
    fn clone(&self) -> Self {
        Self {
            tool_router: self.tool_router.clone(),
            control: self.control.clone(),
        }
    }
}

impl<W: WarehouseConnector> PulseMcp<W> {
    /// Creates a new server owning the control plane.
    #[must_use]
    pub fn new(control: PulseControlPlane<W>) -> Self {
        Self::with_control(Arc::new(control))
    }

    /// Creates a new server using a shared control plane handle.
    #[must_use]
    pub fn with_control(control: Arc<PulseControlPlane<W>>) -> Self {
        let tool_router = Self::tool_router_core()
            + Self::tool_router_warehouse()
            + Self::tool_router_clickup()
            + Self::tool_router_context();
        Self {
            tool_router,
            control,
        }
    }

    pub(crate) fn control(&self) -> &PulseControlPlane<W> {
        &self.control
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl<W: WarehouseConnector> PulseMcp<W> {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

#[tool_handler]
impl<W: WarehouseConnector> ServerHandler for PulseMcp<W> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
