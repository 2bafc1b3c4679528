use pulse_core::control::TaskRequest;
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

use crate::{PulseMcp, helpers};

/// Parameters for fetching a `ClickUp` task.
#[derive(Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetClickUpTaskParams {
    /// The ClickUp task ID.
    pub task_id: String,
    /// ClickUp API key. Defaults to the configured key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Include subtasks in the task payload.
    #[serde(default)]
    pub include_subtasks: bool,
    /// Fetch and merge the task's comments.
    #[serde(default)]
    pub include_comments: bool,
}

impl std::fmt::Debug for GetClickUpTaskParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetClickUpTaskParams")
            .field("task_id", &self.task_id)
            .field("include_subtasks", &self.include_subtasks)
            .field("include_comments", &self.include_comments)
            .finish_non_exhaustive()
    }
}

impl From<GetClickUpTaskParams> for TaskRequest {
    fn from(params: GetClickUpTaskParams) -> Self {
        Self {
            task_id: params.task_id,
            api_key: helpers::normalize_optional(params.api_key),
            include_subtasks: params.include_subtasks,
            include_comments: params.include_comments,
        }
    }
}

#[tool_router(router = tool_router_clickup, vis = "pub")]
impl<W: WarehouseConnector> PulseMcp<W> {
    #[tool(description = "Fetch a ClickUp task by id. Optionally include subtasks and merge the task's comments.")]
    async fn get_clickup_task(
        &self,
        Parameters(params): Parameters<GetClickUpTaskParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let envelope = self.control().get_clickup_task(params.into()).await;
        helpers::envelope_result(&envelope)
    }
}
