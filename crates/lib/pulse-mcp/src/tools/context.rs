use pulse_core::warehouse::WarehouseConnector;
use rmcp::{
    ErrorData,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::PulseMcp;

/// Payload listing the MCP commands this server exposes.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HelpCommands {
    pub commands: Vec<String>,
}

impl Default for HelpCommands {
    fn default() -> Self {
        Self {
            commands: vec![
                "help - List MCP commands to get context with how this MCP server works."
                    .to_string(),
                "warehouse_help - Details how the BigQuery tools resolve projects, credentials and result types."
                    .to_string(),
                "health - Returns 'ok'."
                    .to_string(),
                "execute_bigquery - Run a SQL query and return every row."
                    .to_string(),
                "get_client_details - Look up Pulse clients by client_id and/or partial client_name."
                    .to_string(),
                "get_client_datasets - List a client's datasets from INFORMATION_SCHEMA.SCHEMATA."
                    .to_string(),
                "get_dataset_tables - List the tables of a dataset."
                    .to_string(),
                "get_clickup_task - Fetch a ClickUp task, optionally with subtasks and comments."
                    .to_string(),
            ],
        }
    }
}

#[tool_router(router = tool_router_context, vis = "pub")]
impl<W: WarehouseConnector> PulseMcp<W> {
    #[tool(description = "List the MCP commands to get context with how this MCP server works.")]
    async fn help(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::json(HelpCommands::default())?]))
    }

    #[tool(description = "Details how the BigQuery tools resolve projects, credentials and result types.")]
    async fn warehouse_help(&self) -> Result<CallToolResult, ErrorData> {
        let defaults = self.control().defaults();
        let text = format!(
r"
1.  Projects:
        - Queries run in the configured project `{project}` unless a tool says otherwise.
        - get_dataset_tables accepts `project_id` to list tables in another project.
2.  Credentials:
        - Every warehouse tool accepts `credentials_path` (alias `service_account_path`).
        - Without it the configured credentials file is used, then application default credentials.
3.  Metadata:
        - Client details come from `{dataset}.client` and `{dataset}.client_git`.
        - Client datasets come from `{region}.INFORMATION_SCHEMA.SCHEMATA`; names are matched with LIKE.
        - At least one of `client_id` or `client_name` is required for get_client_datasets.
4.  Results:
        - Success: {{ success: true, results: [ {{column: value}} ] }}.
        - Failure: {{ success: false, error, message, code }}.
        - INTEGER, FLOAT and BOOLEAN columns are returned as JSON numbers and booleans.
        - TIMESTAMP columns are returned as RFC 3339 strings in UTC.
        - RECORD and REPEATED columns are returned as nested objects and arrays.
5.  Filter values are inserted into SQL unescaped. Pass plain identifiers only.
",
            project = defaults.project_id,
            dataset = defaults.metadata_dataset,
            region = defaults.schemata_region,
        );
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}
