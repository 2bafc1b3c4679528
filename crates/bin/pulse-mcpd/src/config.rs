use clap::{ArgAction, Parser, builder::BoolishValueParser};
use pulse_core::control::{
    DEFAULT_METADATA_DATASET,
    DEFAULT_PROJECT_ID,
    DEFAULT_SCHEMATA_REGION,
    ToolDefaults,
};
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:4020";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(name = "pulse-mcpd", version, about = "Pulse MCP daemon.")]
struct CliArgs {
    #[arg(long, env = "GOOGLE_PROJECT_ID", default_value = DEFAULT_PROJECT_ID)]
    project_id: String,

    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials_path: Option<PathBuf>,

    #[arg(long, env = "CLICKUP_API_KEY", hide_env_values = true)]
    clickup_api_key: Option<String>,

    #[arg(
        long,
        env = "PULSE_METADATA_DATASET",
        default_value = DEFAULT_METADATA_DATASET
    )]
    metadata_dataset: String,

    #[arg(
        long,
        env = "PULSE_SCHEMATA_REGION",
        default_value = DEFAULT_SCHEMATA_REGION
    )]
    schemata_region: String,

    #[arg(long, env = "BIGQUERY_LOCATION")]
    bigquery_location: Option<String>,

    #[arg(
        long,
        env = "PULSE_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_HTTP_TIMEOUT_SECS
    )]
    http_timeout_secs: u64,

    #[arg(
        long,
        env = "PULSE_QUERY_TIMEOUT_SECS",
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS
    )]
    query_timeout_secs: u64,

    #[arg(
        long = "stdio",
        env = "PULSE_ENABLE_STDIO",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    enable_stdio: bool,

    #[arg(
        long,
        env = "PULSE_MCP_SERVE",
        default_value_t = false,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    mcp_serve: bool,

    #[arg(long, env = "PULSE_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
    mcp_http_addr: SocketAddr,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Clone)]
pub struct PulseConfig {
    pub project_id: String,
    pub credentials_path: Option<PathBuf>,
    pub clickup_api_key: Option<String>,
    pub metadata_dataset: String,
    pub schemata_region: String,
    pub bigquery_location: Option<String>,
    pub http_timeout: Duration,
    pub query_timeout: Duration,
    pub enable_stdio: bool,
    pub mcp_serve: bool,
    pub mcp_http_addr: SocketAddr,
}

impl fmt::Debug for PulseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulseConfig")
            .field("project_id", &self.project_id)
            .field("credentials_path", &self.credentials_path)
            .field("clickup_api_key", &self.clickup_api_key.as_ref().map(|_| "<redacted>"))
            .field("metadata_dataset", &self.metadata_dataset)
            .field("schemata_region", &self.schemata_region)
            .field("bigquery_location", &self.bigquery_location)
            .field("http_timeout", &self.http_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("enable_stdio", &self.enable_stdio)
            .field("mcp_serve", &self.mcp_serve)
            .field("mcp_http_addr", &self.mcp_http_addr)
            .finish()
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSetting(&'static str),
    InvalidSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSetting(name) => write!(f, "missing required setting: {name}"),
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
        }
    }
}

impl Error for ConfigError {}

impl PulseConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }

    /// Defaults handed to the control plane for every tool call.
    pub fn tool_defaults(&self) -> ToolDefaults {
        let mut defaults = ToolDefaults::new(self.project_id.clone())
            .with_metadata_dataset(self.metadata_dataset.clone())
            .with_schemata_region(self.schemata_region.clone());
        if let Some(path) = &self.credentials_path {
            defaults = defaults.with_credentials_path(path.clone());
        }
        if let Some(api_key) = &self.clickup_api_key {
            defaults = defaults.with_clickup_api_key(api_key.clone());
        }
        defaults
    }
}

impl TryFrom<CliArgs> for PulseConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let project_id = args.project_id.trim().to_string();
        if project_id.is_empty() {
            return Err(ConfigError::MissingSetting("GOOGLE_PROJECT_ID"));
        }
        if args.metadata_dataset.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "PULSE_METADATA_DATASET",
                value: args.metadata_dataset,
            });
        }
        if args.schemata_region.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "PULSE_SCHEMATA_REGION",
                value: args.schemata_region,
            });
        }
        if args.http_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "PULSE_HTTP_TIMEOUT_SECS",
                value: args.http_timeout_secs.to_string(),
            });
        }
        if args.query_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "PULSE_QUERY_TIMEOUT_SECS",
                value: args.query_timeout_secs.to_string(),
            });
        }
        if !args.enable_stdio && !args.mcp_serve {
            return Err(ConfigError::InvalidSetting {
                name: "PULSE_ENABLE_STDIO/PULSE_MCP_SERVE",
                value: "no transport enabled".to_string(),
            });
        }

        let credentials_path = args
            .credentials_path
            .filter(|path| !path.as_os_str().is_empty());
        let clickup_api_key = args
            .clickup_api_key
            .filter(|value| !value.trim().is_empty());
        let bigquery_location = args
            .bigquery_location
            .filter(|value| !value.trim().is_empty());

        Ok(Self {
            project_id,
            credentials_path,
            clickup_api_key,
            metadata_dataset: args.metadata_dataset,
            schemata_region: args.schemata_region,
            bigquery_location,
            http_timeout: Duration::from_secs(args.http_timeout_secs),
            query_timeout: Duration::from_secs(args.query_timeout_secs),
            enable_stdio: args.enable_stdio,
            mcp_serve: args.mcp_serve,
            mcp_http_addr: args.mcp_http_addr,
        })
    }
}
