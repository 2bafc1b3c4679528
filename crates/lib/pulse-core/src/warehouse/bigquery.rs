//! `BigQuery` v2 REST client.
//!
//! Queries are submitted with `jobs.query`; incomplete jobs and further pages
//! are fetched with `jobs.getQueryResults` until no page token remains.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::credentials::{AccessToken, resolve_token};
use super::{
    RawRow,
    RowCursor,
    RowPage,
    TableSchema,
    Warehouse,
    WarehouseConnector,
    WarehouseError,
    WarehouseResult,
};

pub const DEFAULT_BIGQUERY_BASE: &str = "https://bigquery.googleapis.com";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_METADATA_BASE: &str = "http://metadata.google.internal";

/// Base URLs for the Google services the warehouse client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub bigquery_base: String,
    pub token_uri: String,
    pub metadata_base: String,
    /// Overrides the gcloud application-default credentials location.
    pub application_default_path: Option<PathBuf>,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            bigquery_base: DEFAULT_BIGQUERY_BASE.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            metadata_base: DEFAULT_METADATA_BASE.to_string(),
            application_default_path: None,
        }
    }
}

/// Per-query settings forwarded to `BigQuery`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Server-side wait for each `jobs.query`/`getQueryResults` call.
    pub timeout: Duration,
    pub location: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            location: None,
        }
    }
}

impl QueryOptions {
    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Connector that resolves credentials per call and yields REST clients.
#[derive(Debug, Clone)]
pub struct BigQueryConnector {
    http: reqwest::Client,
    endpoints: GoogleEndpoints,
    options: QueryOptions,
}

impl BigQueryConnector {
    #[must_use]
    pub const fn new(http: reqwest::Client, endpoints: GoogleEndpoints, options: QueryOptions) -> Self {
        Self {
            http,
            endpoints,
            options,
        }
    }
}

impl WarehouseConnector for BigQueryConnector {
    type Client = BigQueryClient;

    async fn connect(
        &self,
        project_id: &str,
        credentials_path: Option<&Path>,
    ) -> WarehouseResult<BigQueryClient> {
        let token = resolve_token(&self.http, &self.endpoints, credentials_path).await?;
        Ok(BigQueryClient {
            http: self.http.clone(),
            base: self.endpoints.bigquery_base.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            token,
            options: self.options.clone(),
        })
    }
}

/// REST client bound to one project and access token.
#[derive(Debug, Clone)]
pub struct BigQueryClient {
    http: reqwest::Client,
    base: String,
    project_id: String,
    token: AccessToken,
    options: QueryOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    timeout_ms: u64,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Option<Vec<RawRow>>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
}

impl BigQueryClient {
    async fn submit(&self, sql: &str) -> WarehouseResult<QueryResponse> {
        let url = format!("{}/bigquery/v2/projects/{}/queries", self.base, self.project_id);
        let body = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            timeout_ms: self.options.timeout_ms(),
            request_id: Uuid::new_v4().to_string(),
            location: self.options.location.as_deref(),
        };
        debug!(project_id = %self.project_id, %sql, "submitting query");
        self.send(self.http.post(url).json(&body)).await
    }

    async fn fetch_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> WarehouseResult<QueryResponse> {
        let url = format!(
            "{}/bigquery/v2/projects/{}/queries/{}",
            self.base, job.project_id, job.job_id
        );
        let mut params = vec![("timeoutMs", self.options.timeout_ms().to_string())];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        if let Some(location) = job.location.as_ref().or(self.options.location.as_ref()) {
            params.push(("location", location.clone()));
        }
        debug!(job_id = %job.job_id, page_token, "fetching query results");
        self.send(self.http.get(url).query(&params)).await
    }

    async fn send(&self, request: RequestBuilder) -> WarehouseResult<QueryResponse> {
        let response = request
            .bearer_auth(self.token.secret())
            .send()
            .await
            .map_err(|err| WarehouseError::Transport(err.to_string()))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|err| WarehouseError::Decode(err.to_string()))
    }
}

impl Warehouse for BigQueryClient {
    type Cursor = BigQueryCursor;

    async fn query(&self, sql: &str) -> WarehouseResult<BigQueryCursor> {
        let first = self.submit(sql).await?;
        Ok(BigQueryCursor {
            client: self.clone(),
            job: first.job_reference.clone(),
            pending: Some(first),
            page_token: None,
            exhausted: false,
        })
    }
}

/// Page-by-page reader over a submitted query job.
#[derive(Debug)]
pub struct BigQueryCursor {
    client: BigQueryClient,
    job: Option<JobReference>,
    pending: Option<QueryResponse>,
    page_token: Option<String>,
    exhausted: bool,
}

impl BigQueryCursor {
    fn job(&self) -> WarehouseResult<&JobReference> {
        self.job
            .as_ref()
            .ok_or_else(|| WarehouseError::Decode("query response has no job reference".to_string()))
    }

    async fn wait_for_completion(&self, mut response: QueryResponse) -> WarehouseResult<QueryResponse> {
        while !response.job_complete {
            let job = self.job()?;
            debug!(job_id = %job.job_id, "query job still running");
            response = self.client.fetch_results(job, None).await?;
        }
        Ok(response)
    }
}

impl RowCursor for BigQueryCursor {
    async fn next_page(&mut self) -> WarehouseResult<Option<RowPage>> {
        let response = if let Some(first) = self.pending.take() {
            first
        } else {
            if self.exhausted {
                return Ok(None);
            }
            let job = self.job()?;
            self.client
                .fetch_results(job, self.page_token.as_deref())
                .await?
        };
        let response = self.wait_for_completion(response).await?;

        self.page_token = response.page_token.filter(|token| !token.is_empty());
        self.exhausted = self.page_token.is_none();
        Ok(Some(RowPage {
            schema: response.schema.unwrap_or_default(),
            rows: response.rows.unwrap_or_default(),
        }))
    }
}

async fn check_status(response: Response) -> WarehouseResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_error(status, &body))
}

fn classify_error(status: StatusCode, body: &str) -> WarehouseError {
    let detail = serde_json::from_str::<ErrorBody>(body).ok().map(|body| body.error);
    let not_found_reason = detail.as_ref().is_some_and(|detail| {
        detail
            .errors
            .iter()
            .any(|error| error.reason.as_deref() == Some("notFound"))
    });
    let code = detail
        .as_ref()
        .and_then(|detail| detail.code)
        .unwrap_or_else(|| status.as_u16());
    let message = detail
        .and_then(|detail| detail.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body.to_string()
            }
        });

    if status == StatusCode::NOT_FOUND || not_found_reason {
        WarehouseError::NotFound { message }
    } else {
        WarehouseError::Api {
            code: Some(code),
            message,
        }
    }
}
