use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default per-request timeout applied to a backend, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
/// Lower bound for a backend's configured request timeout.
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 1;
/// Upper bound for a backend's configured request timeout.
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default number of retry attempts the supervisor makes before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Upper bound for `max_retries`.
pub const MAX_MAX_RETRIES: u32 = 10;

/// Default interval between registry health probes, in seconds.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
/// Default inactivity window after which a client session is evicted.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30 * 60;

/// Root configuration for the gateway: where to listen and which backends to federate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    pub backends: Vec<BackendConfig>,
}

impl GatewayConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8800".to_string()
}

fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

fn default_health_check_interval_secs() -> u64 {
    DEFAULT_HEALTH_CHECK_INTERVAL_SECS
}

/// A single upstream MCP backend, admitted once and treated as immutable thereafter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub id: String,
    #[serde(flatten)]
    pub transport: TransportConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub lazy_start: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Transport-specific configuration for a backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportConfig {
    ChildProcess {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    EventStream {
        url: String,
        #[serde(default)]
        token: Option<TokenConfig>,
    },
}

/// Client-credentials-style bearer token acquisition for an event-stream backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_refresh_window_secs")]
    pub refresh_window_secs: u64,
}

impl TokenConfig {
    pub fn refresh_window(&self) -> Duration {
        Duration::from_secs(self.refresh_window_secs)
    }
}

fn default_refresh_window_secs() -> u64 {
    60
}
