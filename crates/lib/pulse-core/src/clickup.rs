//! `ClickUp` task lookups.
//!
//! One request fetches the task. When comments are requested and the task
//! payload does not already carry them, a second request fetches the comment
//! list and merges it under `comments`. That second request is best effort:
//! its failure leaves the task payload untouched.

use std::{error::Error, fmt};

use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::envelope::{Envelope, ErrorCategory, Vendor};

pub const DEFAULT_CLICKUP_BASE: &str = "https://api.clickup.com/api/v2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickUpError {
    MissingApiKey,
    Unauthorized(String),
    NotFound(String),
    Api { status: u16, message: String },
    Connection(String),
    Other(String),
}

impl fmt::Display for ClickUpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(
                f,
                "ClickUp API key is required. Provide api_key or set CLICKUP_API_KEY."
            ),
            Self::Unauthorized(message) => write!(f, "Invalid ClickUp API key: {message}"),
            Self::NotFound(message) => write!(f, "ClickUp resource not found: {message}"),
            Self::Api { status, message } => write!(f, "ClickUp API returned {status}: {message}"),
            Self::Connection(message) => write!(f, "Failed to connect to ClickUp API: {message}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ClickUpError {}

impl From<reqwest::Error> for ClickUpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Connection(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Parameters of a single task lookup.
#[derive(Clone, PartialEq, Eq)]
pub struct TaskLookup {
    pub task_id: String,
    pub api_key: String,
    pub include_subtasks: bool,
    pub include_comments: bool,
}

impl fmt::Debug for TaskLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLookup")
            .field("task_id", &self.task_id)
            .field("include_subtasks", &self.include_subtasks)
            .field("include_comments", &self.include_comments)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ClickUpClient {
    http: reqwest::Client,
    base_url: String,
}

impl ClickUpClient {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Fetches a task, optionally merging its comments into the payload.
    ///
    /// # Errors
    /// Returns `ClickUpError` when the task request fails. Comment failures are
    /// logged and ignored.
    pub async fn get_task(&self, lookup: &TaskLookup) -> Result<Value, ClickUpError> {
        let url = format!("{}/task/{}", self.base_url, lookup.task_id);
        let mut request = self
            .http
            .get(url)
            .header("Authorization", &lookup.api_key)
            .header("Content-Type", "application/json");
        if lookup.include_subtasks {
            request = request.query(&[("include_subtasks", "true")]);
        }

        debug!(task_id = %lookup.task_id, "fetching clickup task");
        let response = check_status(request.send().await?).await?;
        let mut task: Value = response.json().await?;

        if lookup.include_comments
            && let Value::Object(fields) = &mut task
            && !fields.contains_key("comments")
        {
            match self.fetch_comments(lookup).await {
                Ok(comments) => {
                    fields.insert("comments".to_string(), comments);
                }
                Err(err) => {
                    warn!(task_id = %lookup.task_id, error = %err, "failed to fetch task comments");
                }
            }
        }

        Ok(task)
    }

    async fn fetch_comments(&self, lookup: &TaskLookup) -> Result<Value, ClickUpError> {
        let url = format!("{}/task/{}/comment", self.base_url, lookup.task_id);
        let request = self
            .http
            .get(url)
            .header("Authorization", &lookup.api_key)
            .header("Content-Type", "application/json");
        let response = check_status(request.send().await?).await?;
        let mut body: Value = response.json().await?;
        Ok(match body.get_mut("comments") {
            Some(comments) => comments.take(),
            None => body,
        })
    }
}

async fn check_status(response: Response) -> Result<Response, ClickUpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(status, &body);
    Err(match status {
        StatusCode::UNAUTHORIZED => ClickUpError::Unauthorized(message),
        StatusCode::NOT_FOUND => ClickUpError::NotFound(message),
        _ => ClickUpError::Api {
            status: status.as_u16(),
            message,
        },
    })
}

/// `ClickUp` errors look like `{"err": "Token invalid", "ECODE": "OAUTH_025"}`.
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    if let Some(err) = parsed
        .as_ref()
        .and_then(|value| value.get("err"))
        .and_then(Value::as_str)
    {
        return err.to_string();
    }
    if body.is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        body.to_string()
    }
}

/// Maps a task lookup outcome onto the response envelope.
#[must_use]
pub fn into_envelope(outcome: Result<Value, ClickUpError>, task_id: &str) -> Envelope {
    let err = match outcome {
        Ok(task) => return Envelope::result(task),
        Err(err) => err,
    };
    warn!(%task_id, error = %err, "clickup task lookup failed");
    match err {
        ClickUpError::MissingApiKey | ClickUpError::Unauthorized(_) => {
            Envelope::failure(ErrorCategory::Authentication, err.to_string(), 401)
        }
        ClickUpError::NotFound(message) => Envelope::failure(
            ErrorCategory::NotFound,
            format!("Task '{task_id}' not found: {message}"),
            404,
        ),
        ClickUpError::Api { status, message } => {
            Envelope::failure(ErrorCategory::VendorApi(Vendor::ClickUp), message, status)
        }
        ClickUpError::Connection(_) => {
            Envelope::failure(ErrorCategory::Connection, err.to_string(), 503)
        }
        ClickUpError::Other(message) => Envelope::execution_error(message),
    }
}
