use pulse_core::query::FilterSet;
use pulse_core::warehouse::WarehouseConnector;
use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::PulseMcp;
use crate::helpers;

/// Parameters for running an arbitrary SQL query.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExecuteBigQueryParams {
    /// SQL query to execute (standard SQL).
    pub query: String,
    /// Optional path to a service account JSON credentials file.
    #[serde(default, alias = "service_account_path")]
    pub credentials_path: Option<String>,
}

/// Parameters for client lookups filtered by id and/or name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ClientFilterParams {
    /// Specific client ID to filter by.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Client name to search for (case-insensitive partial match).
    #[serde(default)]
    pub client_name: Option<String>,
    /// Optional path to a service account JSON credentials file.
    #[serde(default, alias = "service_account_path")]
    pub credentials_path: Option<String>,
}

impl ClientFilterParams {
    fn into_parts(self) -> (FilterSet, Option<String>) {
        let filters = FilterSet::new(
            helpers::normalize_optional(self.client_id),
            helpers::normalize_optional(self.client_name),
        );
        (filters, helpers::normalize_optional(self.credentials_path))
    }
}

/// Parameters for listing the tables of a dataset.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DatasetTablesParams {
    /// The dataset ID to list tables from.
    pub dataset_id: String,
    /// Project the dataset lives in. Defaults to the configured project.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Optional path to a service account JSON credentials file.
    #[serde(default, alias = "service_account_path")]
    pub credentials_path: Option<String>,
}

#[tool_router(router = tool_router_warehouse, vis = "pub")]
impl<W: WarehouseConnector> PulseMcp<W> {
    #[tool(description = "Execute a BigQuery SQL query and return the resulting rows.")]
    async fn execute_bigquery(
        &self,
        Parameters(params): Parameters<ExecuteBigQueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        info!(tool = "execute_bigquery", "tool invoked");
        let credentials_path = helpers::normalize_optional(params.credentials_path);
        let envelope = self
            .control()
            .execute_bigquery(params.query, credentials_path.as_deref())
            .await;
        helpers::envelope_result(&envelope)
    }

    #[tool(description = "Retrieve the most recent Pulse client details (client_id, client_name, sources, git_url). Optionally filter by client_id and/or a partial client_name.")]
    async fn get_client_details(
        &self,
        Parameters(params): Parameters<ClientFilterParams>,
    ) -> Result<CallToolResult, ErrorData> {
        info!(tool = "get_client_details", "tool invoked");
        let (filters, credentials_path) = params.into_parts();
        let envelope = self
            .control()
            .get_client_details(filters, credentials_path.as_deref())
            .await;
        helpers::envelope_result(&envelope)
    }

    #[tool(description = "List a Pulse client's datasets from INFORMATION_SCHEMA. Requires client_id or client_name.")]
    async fn get_client_datasets(
        &self,
        Parameters(params): Parameters<ClientFilterParams>,
    ) -> Result<CallToolResult, ErrorData> {
        info!(tool = "get_client_datasets", "tool invoked");
        let (filters, credentials_path) = params.into_parts();
        let envelope = self
            .control()
            .get_client_datasets(filters, credentials_path.as_deref())
            .await;
        helpers::envelope_result(&envelope)
    }

    #[tool(description = "List the tables in a BigQuery dataset using INFORMATION_SCHEMA views.")]
    async fn get_dataset_tables(
        &self,
        Parameters(params): Parameters<DatasetTablesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        info!(tool = "get_dataset_tables", dataset_id = %params.dataset_id, "tool invoked");
        let credentials_path = helpers::normalize_optional(params.credentials_path);
        let envelope = self
            .control()
            .get_dataset_tables(
                params.dataset_id.trim().to_string(),
                helpers::normalize_optional(params.project_id),
                credentials_path.as_deref(),
            )
            .await;
        helpers::envelope_result(&envelope)
    }
}
