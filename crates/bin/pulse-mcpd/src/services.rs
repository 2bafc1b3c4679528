use std::sync::Arc;

use pulse_core::clickup::{ClickUpClient, DEFAULT_CLICKUP_BASE};
use pulse_core::control::PulseControlPlane;
use pulse_core::warehouse::{BigQueryConnector, GoogleEndpoints, QueryOptions};

use crate::config::PulseConfig;

/// Builds the shared HTTP client, collaborators and control plane.
///
/// # Errors
/// Returns an error when the HTTP client cannot be constructed.
pub fn build_control_plane(
    config: &PulseConfig,
) -> Result<Arc<PulseControlPlane<BigQueryConnector>>, reqwest::Error> {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .user_agent(concat!("pulse-mcpd/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let options = QueryOptions {
        timeout: config.query_timeout,
        location: config.bigquery_location.clone(),
    };
    let connector = BigQueryConnector::new(http.clone(), GoogleEndpoints::default(), options);
    let clickup = ClickUpClient::new(http, DEFAULT_CLICKUP_BASE);

    Ok(Arc::new(PulseControlPlane::new(
        config.tool_defaults(),
        connector,
        clickup,
    )))
}
