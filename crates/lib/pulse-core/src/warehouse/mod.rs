//! Warehouse client seams and the `BigQuery` REST implementation.
//!
//! The control plane only sees the three traits below: a connector that
//! resolves credentials into a project-bound client, a client that submits SQL,
//! and a cursor that yields result pages until the job is drained.

use std::{error::Error, fmt, future::Future, path::Path};

use serde::Deserialize;
use serde_json::Value;

pub mod bigquery;
pub mod credentials;
pub mod normalize;

pub use bigquery::{
    BigQueryClient,
    BigQueryConnector,
    BigQueryCursor,
    GoogleEndpoints,
    QueryOptions,
};
pub use normalize::{drain, normalize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarehouseError {
    /// The requested dataset, table or job does not exist.
    NotFound { message: String },
    /// The service rejected the request for any other reason.
    Api { code: Option<u16>, message: String },
    Credentials(String),
    Transport(String),
    Decode(String),
}

impl fmt::Display for WarehouseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { message } | Self::Api { message, .. } => write!(f, "{message}"),
            Self::Credentials(message) => write!(f, "credential error: {message}"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::Decode(message) => write!(f, "failed to decode response: {message}"),
        }
    }
}

impl Error for WarehouseError {}

pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Column definition as reported by the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    #[must_use]
    pub fn is_repeated(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|mode| mode.eq_ignore_ascii_case("REPEATED"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

/// One cell in the `{"f": [{"v": ...}]}` row encoding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCell {
    #[serde(default)]
    pub v: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub f: Vec<RawCell>,
}

/// A batch of rows together with the schema that describes them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPage {
    pub schema: TableSchema,
    pub rows: Vec<RawRow>,
}

/// Server-side result cursor, drained once.
pub trait RowCursor: Send {
    /// Returns the next page, or `None` once the result set is exhausted.
    fn next_page(&mut self) -> impl Future<Output = WarehouseResult<Option<RowPage>>> + Send;
}

/// A client bound to one project and one set of credentials.
pub trait Warehouse: Send + Sync {
    type Cursor: RowCursor;

    fn query(&self, sql: &str) -> impl Future<Output = WarehouseResult<Self::Cursor>> + Send;
}

/// Builds project-bound clients from an optional credentials file.
pub trait WarehouseConnector: Send + Sync + 'static {
    type Client: Warehouse;

    /// Resolves credentials and returns a client for `project_id`.
    ///
    /// `None` means ambient credentials.
    fn connect(
        &self,
        project_id: &str,
        credentials_path: Option<&Path>,
    ) -> impl Future<Output = WarehouseResult<Self::Client>> + Send;
}
