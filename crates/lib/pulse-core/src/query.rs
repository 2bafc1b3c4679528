//! Parameterized SQL shapes for the warehouse tools.
//!
//! Filter values are interpolated into the SQL text as-is. The tools are meant
//! for trusted callers; no escaping or parameter binding happens here.

use std::{error::Error, fmt};

/// Row cap applied to client detail lookups.
pub const CLIENT_DETAILS_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryBuildError {
    MissingClientFilter,
    MissingDatasetId,
}

impl fmt::Display for QueryBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingClientFilter => {
                write!(f, "Either client_id or client_name must be provided.")
            }
            Self::MissingDatasetId => write!(f, "dataset_id must be provided."),
        }
    }
}

impl Error for QueryBuildError {}

/// Optional identifying values narrowing a client lookup.
///
/// Empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    pub client_id: Option<String>,
    pub client_name: Option<String>,
}

impl FilterSet {
    #[must_use]
    pub fn new(client_id: Option<String>, client_name: Option<String>) -> Self {
        Self {
            client_id: non_empty(client_id),
            client_name: non_empty(client_name),
        }
    }

    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref().filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref().filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.client_id().is_none() && self.client_name().is_none()
    }
}

/// Where the metadata templates read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTarget {
    /// Project used when a template needs one and the caller gave none.
    pub default_project_id: String,
    /// Fully qualified `project.dataset` holding the client registry tables.
    pub metadata_dataset: String,
    /// Region qualifier for the schemata view, e.g. `region-us-central1`.
    pub schemata_region: String,
}

/// A named query shape bound to the caller's filter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTemplate {
    Raw { query: String },
    ClientDetails(FilterSet),
    ClientDatasets(FilterSet),
    DatasetTables {
        dataset_id: String,
        project_id: Option<String>,
    },
}

impl QueryTemplate {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Raw { .. } => "raw",
            Self::ClientDetails(_) => "client_details",
            Self::ClientDatasets(_) => "client_datasets",
            Self::DatasetTables { .. } => "dataset_tables",
        }
    }

    /// Renders the executable SQL text.
    ///
    /// # Errors
    /// Returns `QueryBuildError` when a mandatory filter is missing.
    pub fn render(&self, target: &QueryTarget) -> Result<String, QueryBuildError> {
        match self {
            Self::Raw { query } => Ok(query.clone()),
            Self::ClientDetails(filters) => Ok(render_client_details(filters, target)),
            Self::ClientDatasets(filters) => render_client_datasets(filters, target),
            Self::DatasetTables {
                dataset_id,
                project_id,
            } => {
                if dataset_id.trim().is_empty() {
                    return Err(QueryBuildError::MissingDatasetId);
                }
                let project_id = resolve_project(project_id.as_deref(), target);
                Ok(render_dataset_tables(project_id, dataset_id))
            }
        }
    }

    /// Project the rendered query should run in.
    #[must_use]
    pub fn project_id<'a>(&'a self, target: &'a QueryTarget) -> &'a str {
        match self {
            Self::DatasetTables { project_id, .. } => resolve_project(project_id.as_deref(), target),
            _ => target.default_project_id.as_str(),
        }
    }
}

fn resolve_project<'a>(project_id: Option<&'a str>, target: &'a QueryTarget) -> &'a str {
    project_id
        .filter(|value| !value.is_empty())
        .unwrap_or(target.default_project_id.as_str())
}

fn render_client_details(filters: &FilterSet, target: &QueryTarget) -> String {
    let dataset = &target.metadata_dataset;
    let mut query = format!(
        "WITH
  sources AS (
  SELECT
    updated_at,
    client_id,
    client_name,
    sources
  FROM
    `{dataset}.client`
  QUALIFY
    ROW_NUMBER() OVER (PARTITION BY client_id, client_name ORDER BY updated_at DESC) = 1
  ORDER BY
    updated_at DESC),
  git AS (
  SELECT
    client_id,
    git_url
  FROM
    `{dataset}.client_git`
  QUALIFY
    ROW_NUMBER() OVER (PARTITION BY client_id ORDER BY updated_at DESC) = 1),
  final AS (
  SELECT
    src.*,
    g.git_url
  FROM
    sources AS src
  LEFT JOIN
    git AS g
  ON
    src.client_id = g.client_id)
SELECT
  *
FROM
  final"
    );

    let mut clauses = Vec::new();
    if let Some(client_id) = filters.client_id() {
        clauses.push(format!("client_id = {client_id}"));
    }
    if let Some(client_name) = filters.client_name() {
        clauses.push(format!("LOWER(client_name) LIKE LOWER('%{client_name}%')"));
    }
    if !clauses.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&clauses.join(" AND "));
    }

    query.push_str(" ORDER BY updated_at DESC");
    query.push_str(&format!(" LIMIT {CLIENT_DETAILS_LIMIT}"));
    query
}

fn render_client_datasets(
    filters: &FilterSet,
    target: &QueryTarget,
) -> Result<String, QueryBuildError> {
    let pattern = filters
        .client_id()
        .or_else(|| filters.client_name())
        .ok_or(QueryBuildError::MissingClientFilter)?;
    let project_id = &target.default_project_id;
    let region = &target.schemata_region;
    Ok(format!(
        "SELECT
  schema_name AS dataset_id,
  catalog_name AS project_id,
  creation_time,
  last_modified_time,
  location
FROM
  `{project_id}.{region}.INFORMATION_SCHEMA.SCHEMATA`
WHERE schema_name LIKE '%{pattern}%'
ORDER BY
  last_modified_time DESC"
    ))
}

fn render_dataset_tables(project_id: &str, dataset_id: &str) -> String {
    format!(
        "SELECT
  table_catalog,
  table_schema,
  table_name,
  table_type,
  creation_time
FROM
  `{project_id}.{dataset_id}.INFORMATION_SCHEMA.TABLES`
ORDER BY
  table_name"
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}
