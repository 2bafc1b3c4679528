//! Shared stubs for tool and server tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use pulse_core::clickup::ClickUpClient;
use pulse_core::control::{PulseControlPlane, ToolDefaults};
use pulse_core::warehouse::{
    FieldSchema,
    RawCell,
    RawRow,
    RowCursor,
    RowPage,
    TableSchema,
    Warehouse,
    WarehouseConnector,
    WarehouseResult,
};
use rmcp::model::CallToolResult;
use serde_json::{Value, json};

use crate::PulseMcp;

/// Connector that records every connect and query and returns one fixed page.
#[derive(Default)]
pub struct RecordingConnector {
    pub connects: Arc<Mutex<Vec<(String, Option<PathBuf>)>>>,
    pub queries: Arc<Mutex<Vec<String>>>,
}

impl RecordingConnector {
    /// A second handle onto the same recordings.
    pub fn observer(&self) -> Self {
        Self {
            connects: self.connects.clone(),
            queries: self.queries.clone(),
        }
    }
}

pub struct RecordingClient {
    queries: Arc<Mutex<Vec<String>>>,
}

pub struct OnePage(Option<RowPage>);

impl RowCursor for OnePage {
    async fn next_page(&mut self) -> WarehouseResult<Option<RowPage>> {
        Ok(self.0.take())
    }
}

impl Warehouse for RecordingClient {
    type Cursor = OnePage;

    async fn query(&self, sql: &str) -> WarehouseResult<OnePage> {
        self.queries.lock().expect("lock").push(sql.to_string());
        Ok(OnePage(Some(RowPage {
            schema: TableSchema {
                fields: vec![field("dataset_name", "STRING"), field("tables", "INTEGER")],
            },
            rows: vec![RawRow {
                f: vec![
                    RawCell { v: json!("acme_raw") },
                    RawCell { v: json!("12") },
                ],
            }],
        })))
    }
}

impl WarehouseConnector for RecordingConnector {
    type Client = RecordingClient;

    async fn connect(
        &self,
        project_id: &str,
        credentials_path: Option<&Path>,
    ) -> WarehouseResult<RecordingClient> {
        self.connects
            .lock()
            .expect("lock")
            .push((project_id.to_string(), credentials_path.map(Path::to_path_buf)));
        Ok(RecordingClient {
            queries: self.queries.clone(),
        })
    }
}

fn field(name: &str, field_type: &str) -> FieldSchema {
    FieldSchema {
        name: name.to_string(),
        field_type: field_type.to_string(),
        mode: None,
        fields: Vec::new(),
    }
}

/// Control plane over a recording connector and a `ClickUp` client at `clickup_base`.
pub fn control_plane(
    defaults: ToolDefaults,
    clickup_base: &str,
) -> (PulseControlPlane<RecordingConnector>, RecordingConnector) {
    let connector = RecordingConnector::default();
    let observer = connector.observer();
    let clickup = ClickUpClient::new(reqwest::Client::new(), clickup_base);
    (PulseControlPlane::new(defaults, connector, clickup), observer)
}

/// Parses the envelope carried as the first text content of a tool result.
pub fn payload(result: &CallToolResult) -> Value {
    let raw = serde_json::to_value(result).expect("serialize result");
    let text = raw["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("envelope json")
}

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn spawn(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server failed");
    });
    format!("http://{addr}")
}

pub fn server(clickup_base: &str) -> (PulseMcp<RecordingConnector>, RecordingConnector) {
    let (control, observer) = control_plane(ToolDefaults::default(), clickup_base);
    (PulseMcp::new(control), observer)
}
