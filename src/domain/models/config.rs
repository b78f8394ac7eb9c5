use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::platform::SelectionStrategy;

/// Main configuration structure for the curator
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Inbound HTTP server
    #[serde(default)]
    pub server: ServerConfig,

    /// Base URLs of the collaborating services
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,

    /// Workflow timeouts and planner fallback
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Platform selection
    #[serde(default)]
    pub platforms: PlatformsConfig,

    /// Probe image handling
    #[serde(default)]
    pub images: ImagesConfig,

    /// Outbound HTTP client behaviour
    #[serde(default)]
    pub http_client: HttpClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, used to build callback URLs
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    6200
}

fn default_public_url() -> String {
    "http://tng-vnv-curator:6200".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

/// Collaborator base URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CollaboratorsConfig {
    #[serde(default = "default_catalogue_url")]
    pub catalogue_url: String,

    #[serde(default = "default_platform_adapter_url")]
    pub platform_adapter_url: String,

    #[serde(default = "default_executor_url")]
    pub executor_url: String,

    #[serde(default = "default_planner_url")]
    pub planner_url: String,
}

fn default_catalogue_url() -> String {
    "http://tng-cat:4011".to_string()
}

fn default_platform_adapter_url() -> String {
    "http://tng-vnv-platform-mngr:6100".to_string()
}

fn default_executor_url() -> String {
    "http://tng-vnv-executor:6400".to_string()
}

fn default_planner_url() -> String {
    "http://tng-vnv-planner:6100".to_string()
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            catalogue_url: default_catalogue_url(),
            platform_adapter_url: default_platform_adapter_url(),
            executor_url: default_executor_url(),
            planner_url: default_planner_url(),
        }
    }
}

/// Workflow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// How long a worker waits for the adapter's instantiation callback
    #[serde(default = "default_instantiation_timeout_secs")]
    pub instantiation_timeout_secs: u64,

    /// How long a cancel worker waits for the executor's acknowledgement
    #[serde(default = "default_cancel_ack_timeout_secs")]
    pub cancel_ack_timeout_secs: u64,

    /// Planner path used when no registered callback applies
    #[serde(default = "default_planner_fallback_path")]
    pub planner_fallback_path: String,
}

const fn default_instantiation_timeout_secs() -> u64 {
    1800
}

const fn default_cancel_ack_timeout_secs() -> u64 {
    300
}

fn default_planner_fallback_path() -> String {
    "/api/v1/test-plans/on-change".to_string()
}

impl OrchestratorConfig {
    pub fn instantiation_timeout(&self) -> Duration {
        Duration::from_secs(self.instantiation_timeout_secs)
    }

    pub fn cancel_ack_timeout(&self) -> Duration {
        Duration::from_secs(self.cancel_ack_timeout_secs)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            instantiation_timeout_secs: default_instantiation_timeout_secs(),
            cancel_ack_timeout_secs: default_cancel_ack_timeout_secs(),
            planner_fallback_path: default_planner_fallback_path(),
        }
    }
}

/// Platform selection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct PlatformsConfig {
    #[serde(default)]
    pub strategy: SelectionStrategy,

    /// Platform type (lower case) to platform name, used by `override`
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

/// Probe image configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ImagesConfig {
    /// Pull and remove probe images through docker
    #[serde(default = "default_images_enabled")]
    pub enabled: bool,

    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,
}

const fn default_images_enabled() -> bool {
    true
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enabled: default_images_enabled(),
            docker_binary: default_docker_binary(),
        }
    }
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpClientConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries for idempotent lookups
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,

    /// Rotation: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_enable_stdout() -> bool {
    true
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: default_enable_stdout(),
            rotation: default_rotation(),
        }
    }
}
