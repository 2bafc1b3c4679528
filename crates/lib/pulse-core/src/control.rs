//! Tool operations over the warehouse connector and the `ClickUp` client.
//!
//! Every operation returns an [`Envelope`]; no error escapes this layer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::clickup::{self, ClickUpClient, ClickUpError, TaskLookup};
use crate::envelope::Envelope;
use crate::query::{FilterSet, QueryTarget, QueryTemplate};
use crate::warehouse::{Warehouse, WarehouseConnector, normalize};

pub const DEFAULT_PROJECT_ID: &str = "insightsprod";
pub const DEFAULT_METADATA_DATASET: &str = "insightsprod.edm_insights_metadata";
pub const DEFAULT_SCHEMATA_REGION: &str = "region-us-central1";

/// Read-only process configuration shared by every tool call.
#[derive(Clone, PartialEq, Eq)]
pub struct ToolDefaults {
    pub project_id: String,
    pub credentials_path: Option<PathBuf>,
    pub clickup_api_key: Option<String>,
    pub metadata_dataset: String,
    pub schemata_region: String,
}

impl ToolDefaults {
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            credentials_path: None,
            clickup_api_key: None,
            metadata_dataset: DEFAULT_METADATA_DATASET.to_string(),
            schemata_region: DEFAULT_SCHEMATA_REGION.to_string(),
        }
    }

    #[must_use]
    pub fn with_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_clickup_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.clickup_api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub fn with_metadata_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.metadata_dataset = dataset.into();
        self
    }

    #[must_use]
    pub fn with_schemata_region(mut self, region: impl Into<String>) -> Self {
        self.schemata_region = region.into();
        self
    }

    #[must_use]
    pub fn query_target(&self) -> QueryTarget {
        QueryTarget {
            default_project_id: self.project_id.clone(),
            metadata_dataset: self.metadata_dataset.clone(),
            schemata_region: self.schemata_region.clone(),
        }
    }
}

impl Default for ToolDefaults {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT_ID)
    }
}

impl std::fmt::Debug for ToolDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefaults")
            .field("project_id", &self.project_id)
            .field("credentials_path", &self.credentials_path)
            .field("clickup_api_key", &self.clickup_api_key.as_ref().map(|_| "**redacted**"))
            .field("metadata_dataset", &self.metadata_dataset)
            .field("schemata_region", &self.schemata_region)
            .finish()
    }
}

/// Arguments of a `ClickUp` task lookup as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRequest {
    pub task_id: String,
    pub api_key: Option<String>,
    pub include_subtasks: bool,
    pub include_comments: bool,
}

pub struct PulseControlPlane<W: WarehouseConnector> {
    defaults: Arc<ToolDefaults>,
    connector: Arc<W>,
    clickup: ClickUpClient,
}

impl<W: WarehouseConnector> Clone for PulseControlPlane<W> {
    fn clone(&self) -> Self {
        Self {
            defaults: self.defaults.clone(),
            connector: self.connector.clone(),
            clickup: self.clickup.clone(),
        }
    }
}

impl<W: WarehouseConnector> PulseControlPlane<W> {
    #[must_use]
    pub fn new(defaults: ToolDefaults, connector: W, clickup: ClickUpClient) -> Self {
        Self {
            defaults: Arc::new(defaults),
            connector: Arc::new(connector),
            clickup,
        }
    }

    #[must_use]
    pub fn defaults(&self) -> &ToolDefaults {
        &self.defaults
    }

    /// Runs caller-supplied SQL verbatim.
    pub async fn execute_bigquery(&self, query: String, credentials_path: Option<&str>) -> Envelope {
        self.execute_with_envelope(
            "execute_bigquery",
            QueryTemplate::Raw { query },
            credentials_path,
            "Dataset or table not found",
        )
        .await
    }

    /// Most recent registry row per client, optionally filtered.
    pub async fn get_client_details(
        &self,
        filters: FilterSet,
        credentials_path: Option<&str>,
    ) -> Envelope {
        self.execute_with_envelope(
            "get_client_details",
            QueryTemplate::ClientDetails(filters),
            credentials_path,
            "Client metadata tables not found",
        )
        .await
    }

    /// Datasets whose name matches the client id or name.
    pub async fn get_client_datasets(
        &self,
        filters: FilterSet,
        credentials_path: Option<&str>,
    ) -> Envelope {
        self.execute_with_envelope(
            "get_client_datasets",
            QueryTemplate::ClientDatasets(filters),
            credentials_path,
            "Dataset information not found",
        )
        .await
    }

    /// Tables of one dataset, by name.
    pub async fn get_dataset_tables(
        &self,
        dataset_id: String,
        project_id: Option<String>,
        credentials_path: Option<&str>,
    ) -> Envelope {
        let context = format!("Dataset '{dataset_id}' not found");
        self.execute_with_envelope(
            "get_dataset_tables",
            QueryTemplate::DatasetTables {
                dataset_id,
                project_id,
            },
            credentials_path,
            &context,
        )
        .await
    }

    pub async fn get_clickup_task(&self, request: TaskRequest) -> Envelope {
        let TaskRequest {
            task_id,
            api_key,
            include_subtasks,
            include_comments,
        } = request;
        info!(tool = "get_clickup_task", %task_id, include_subtasks, include_comments);

        let api_key = api_key
            .filter(|key| !key.is_empty())
            .or_else(|| self.defaults.clickup_api_key.clone());
        let outcome = match api_key {
            Some(api_key) => {
                let lookup = TaskLookup {
                    task_id: task_id.clone(),
                    api_key,
                    include_subtasks,
                    include_comments,
                };
                self.clickup.get_task(&lookup).await
            }
            None => Err(ClickUpError::MissingApiKey),
        };
        clickup::into_envelope(outcome, &task_id)
    }

    /// Renders the template, then connects, queries and drains the cursor.
    ///
    /// Rendering runs first so usage errors never reach the network.
    async fn execute_with_envelope(
        &self,
        tool: &'static str,
        template: QueryTemplate,
        credentials_path: Option<&str>,
        not_found_context: &str,
    ) -> Envelope {
        let target = self.defaults.query_target();
        let sql = match template.render(&target) {
            Ok(sql) => sql,
            Err(err) => {
                warn!(tool, template = template.name(), error = %err, "rejected query arguments");
                return Envelope::execution_error(err);
            }
        };
        let project_id = template.project_id(&target);
        let credentials_path = self.credentials_path(credentials_path);
        info!(tool, template = template.name(), %project_id, "running warehouse query");

        let connector = &self.connector;
        let producer = async {
            let client = connector.connect(project_id, credentials_path).await?;
            client.query(&sql).await
        };
        normalize(producer, not_found_context).await
    }

    fn credentials_path<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a Path> {
        requested
            .filter(|path| !path.is_empty())
            .map(Path::new)
            .or(self.defaults.credentials_path.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::envelope::ErrorCategory;
    use crate::warehouse::{
        RawRow,
        RowCursor,
        RowPage,
        TableSchema,
        WarehouseError,
        WarehouseResult,
    };

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Call {
        project_id: String,
        credentials_path: Option<PathBuf>,
        sql: Option<String>,
    }

    #[derive(Default)]
    struct StubConnector {
        calls: Arc<Mutex<Vec<Call>>>,
        failure: Option<WarehouseError>,
        page: Option<RowPage>,
    }

    struct StubClient {
        calls: Arc<Mutex<Vec<Call>>>,
        failure: Option<WarehouseError>,
        page: Option<RowPage>,
    }

    struct StubCursor {
        pages: VecDeque<RowPage>,
    }

    impl RowCursor for StubCursor {
        async fn next_page(&mut self) -> WarehouseResult<Option<RowPage>> {
            Ok(self.pages.pop_front())
        }
    }

    impl Warehouse for StubClient {
        type Cursor = StubCursor;

        async fn query(&self, sql: &str) -> WarehouseResult<StubCursor> {
            if let Some(call) = self.calls.lock().expect("lock").last_mut() {
                call.sql = Some(sql.to_string());
            }
            if let Some(failure) = self.failure.clone() {
                return Err(failure);
            }
            Ok(StubCursor {
                pages: self.page.clone().into_iter().collect(),
            })
        }
    }

    impl WarehouseConnector for StubConnector {
        type Client = StubClient;

        async fn connect(
            &self,
            project_id: &str,
            credentials_path: Option<&Path>,
        ) -> WarehouseResult<StubClient> {
            self.calls.lock().expect("lock").push(Call {
                project_id: project_id.to_string(),
                credentials_path: credentials_path.map(Path::to_path_buf),
                sql: None,
            });
            Ok(StubClient {
                calls: self.calls.clone(),
                failure: self.failure.clone(),
                page: self.page.clone(),
            })
        }
    }

    fn plane(connector: StubConnector) -> PulseControlPlane<StubConnector> {
        let clickup = ClickUpClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        PulseControlPlane::new(ToolDefaults::default(), connector, clickup)
    }

    fn table_page() -> RowPage {
        RowPage {
            schema: serde_json::from_value::<TableSchema>(json!({"fields": [
                {"name": "table_name", "type": "STRING"},
                {"name": "table_type", "type": "STRING"}
            ]}))
            .expect("schema"),
            rows: serde_json::from_value::<Vec<RawRow>>(json!([
                {"f": [{"v": "events"}, {"v": "BASE TABLE"}]}
            ]))
            .expect("rows"),
        }
    }

    #[tokio::test]
    async fn client_datasets_without_filters_never_connects() {
        let connector = StubConnector::default();
        let calls = connector.calls.clone();
        let envelope = plane(connector)
            .get_client_datasets(FilterSet::default(), None)
            .await;

        let failure = envelope.as_failure().expect("failure");
        assert_eq!(failure.error, ErrorCategory::Execution);
        assert_eq!(failure.code, 500);
        assert_eq!(failure.message, "Either client_id or client_name must be provided.");
        assert!(calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn dataset_tables_defaults_project_and_returns_rows() {
        let connector = StubConnector {
            page: Some(table_page()),
            ..StubConnector::default()
        };
        let calls = connector.calls.clone();
        let envelope = plane(connector)
            .get_dataset_tables("ds1".to_string(), None, None)
            .await;

        let rows = envelope.rows().expect("success");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["table_name"], json!("events"));

        let calls = calls.lock().expect("lock");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].project_id, "insightsprod");
        let sql = calls[0].sql.as_deref().expect("query submitted");
        assert!(sql.contains("`insightsprod.ds1.INFORMATION_SCHEMA.TABLES`"));
    }

    #[tokio::test]
    async fn dataset_tables_not_found_names_the_dataset() {
        let connector = StubConnector {
            failure: Some(WarehouseError::NotFound {
                message: "Not found: Dataset insightsprod:missing".to_string(),
            }),
            ..StubConnector::default()
        };
        let envelope = plane(connector)
            .get_dataset_tables("missing".to_string(), None, None)
            .await;
        let failure = envelope.as_failure().expect("failure");
        assert_eq!(failure.error, ErrorCategory::NotFound);
        assert_eq!(failure.code, 404);
        assert!(failure.message.starts_with("Dataset 'missing' not found: "));
    }

    #[tokio::test]
    async fn execute_bigquery_passes_query_and_credentials_through() {
        let connector = StubConnector::default();
        let calls = connector.calls.clone();
        let envelope = plane(connector)
            .execute_bigquery("SELECT 1".to_string(), Some("/keys/sa.json"))
            .await;
        assert_eq!(envelope, Envelope::results(Vec::new()));

        let calls = calls.lock().expect("lock");
        assert_eq!(
            calls[0],
            Call {
                project_id: "insightsprod".to_string(),
                credentials_path: Some(PathBuf::from("/keys/sa.json")),
                sql: Some("SELECT 1".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn blank_credentials_path_falls_back_to_default() {
        let connector = StubConnector::default();
        let calls = connector.calls.clone();
        let clickup = ClickUpClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let defaults = ToolDefaults::default().with_credentials_path("/etc/pulse/key.json");
        let plane = PulseControlPlane::new(defaults, connector, clickup);

        let _ = plane
            .get_client_details(FilterSet::new(Some("42".to_string()), None), Some(""))
            .await;
        let calls = calls.lock().expect("lock");
        assert_eq!(
            calls[0].credentials_path.as_deref(),
            Some(Path::new("/etc/pulse/key.json"))
        );
        assert!(calls[0].sql.as_deref().is_some_and(|sql| sql.contains("client_id = 42")));
    }

    #[tokio::test]
    async fn vendor_errors_keep_their_code() {
        let connector = StubConnector {
            failure: Some(WarehouseError::Api {
                code: Some(403),
                message: "Access Denied".to_string(),
            }),
            ..StubConnector::default()
        };
        let envelope = plane(connector)
            .get_client_details(FilterSet::default(), None)
            .await;
        let failure = envelope.as_failure().expect("failure");
        assert_eq!(failure.error.label(), "Google API Error");
        assert_eq!(failure.code, 403);
        assert_eq!(failure.message, "Access Denied");
    }

    #[tokio::test]
    async fn clickup_without_any_api_key_is_an_authentication_error() {
        let envelope = plane(StubConnector::default())
            .get_clickup_task(TaskRequest {
                task_id: "abc".to_string(),
                ..TaskRequest::default()
            })
            .await;
        let failure = envelope.as_failure().expect("failure");
        assert_eq!(failure.error, ErrorCategory::Authentication);
        assert_eq!(failure.code, 401);
    }
}
