//! Resolves Google credentials into a short-lived OAuth access token.
//!
//! Supported sources, in order of precedence:
//! 1. an explicit key file (`service_account` or `authorized_user`);
//! 2. the gcloud application-default credentials file;
//! 3. the compute metadata server.
//!
//! Tokens are fetched per call and never cached.

use std::path::{Path, PathBuf};

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{WarehouseError, WarehouseResult};
use super::bigquery::GoogleEndpoints;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Contents of a Google credentials JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Bearer token for the warehouse API.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(**redacted**)")
    }
}

/// Reads and parses a credentials file.
///
/// # Errors
/// Returns `WarehouseError::Credentials` if the file cannot be read or is not a
/// supported credential type.
pub async fn load_credentials_file(path: &Path) -> WarehouseResult<CredentialsFile> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|err| {
        WarehouseError::Credentials(format!("failed to read {}: {err}", path.display()))
    })?;
    serde_json::from_str(&raw).map_err(|err| {
        WarehouseError::Credentials(format!("unsupported credentials in {}: {err}", path.display()))
    })
}

/// Resolves an access token for the given credentials path, or ambient
/// credentials when `path` is `None`.
///
/// # Errors
/// Returns `WarehouseError::Credentials` when no token can be obtained.
pub async fn resolve_token(
    http: &reqwest::Client,
    endpoints: &GoogleEndpoints,
    path: Option<&Path>,
) -> WarehouseResult<AccessToken> {
    if let Some(path) = path {
        let credentials = load_credentials_file(path).await?;
        return exchange(http, endpoints, &credentials).await;
    }

    if let Some(adc_path) = application_default_path(endpoints)
        && tokio::fs::try_exists(&adc_path).await.unwrap_or(false)
    {
        debug!(path = %adc_path.display(), "using application default credentials");
        let credentials = load_credentials_file(&adc_path).await?;
        return exchange(http, endpoints, &credentials).await;
    }

    debug!("using metadata server credentials");
    metadata_server_token(http, endpoints).await
}

fn application_default_path(endpoints: &GoogleEndpoints) -> Option<PathBuf> {
    if let Some(path) = endpoints.application_default_path.clone() {
        return Some(path);
    }
    std::env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("gcloud")
            .join("application_default_credentials.json")
    })
}

async fn exchange(
    http: &reqwest::Client,
    endpoints: &GoogleEndpoints,
    credentials: &CredentialsFile,
) -> WarehouseResult<AccessToken> {
    match credentials {
        CredentialsFile::ServiceAccount(key) => {
            let token_uri = key
                .token_uri
                .as_deref()
                .unwrap_or(endpoints.token_uri.as_str());
            let assertion = sign_assertion(key, token_uri)?;
            let form = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
            request_token(http.post(token_uri).form(&form)).await
        }
        CredentialsFile::AuthorizedUser(user) => {
            let form = [
                ("grant_type", "refresh_token"),
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
                ("refresh_token", user.refresh_token.as_str()),
            ];
            request_token(http.post(&endpoints.token_uri).form(&form)).await
        }
    }
}

fn sign_assertion(key: &ServiceAccountKey, audience: &str) -> WarehouseResult<String> {
    let iat = Utc::now().timestamp();
    let claims = JwtClaims {
        iss: &key.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: audience,
        iat,
        exp: iat + TOKEN_LIFETIME_SECS,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|err| WarehouseError::Credentials(format!("invalid private key: {err}")))?;
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
        .map_err(|err| WarehouseError::Credentials(format!("failed to sign assertion: {err}")))
}

async fn metadata_server_token(
    http: &reqwest::Client,
    endpoints: &GoogleEndpoints,
) -> WarehouseResult<AccessToken> {
    let url = format!(
        "{}/computeMetadata/v1/instance/service-accounts/default/token",
        endpoints.metadata_base
    );
    let request = http
        .get(url)
        .header("Metadata-Flavor", "Google")
        .query(&[("scopes", CLOUD_PLATFORM_SCOPE)]);
    request_token(request).await
}

async fn request_token(request: reqwest::RequestBuilder) -> WarehouseResult<AccessToken> {
    let response = request
        .send()
        .await
        .map_err(|err| WarehouseError::Credentials(format!("token request failed: {err}")))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(WarehouseError::Credentials(format!(
            "token endpoint returned {status}: {body}"
        )));
    }
    let token: TokenResponse = response
        .json()
        .await
        .map_err(|err| WarehouseError::Credentials(format!("invalid token response: {err}")))?;
    Ok(AccessToken(token.access_token))
}
