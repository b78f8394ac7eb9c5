use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::SelectionStrategy;

/// Environment variables of the original deployment, mapped onto config keys
const LEGACY_ENV: [(&str, &str); 4] = [
    ("cat_base", "collaborators.catalogue_url"),
    ("platform_adapter_base", "collaborators.platform_adapter_url"),
    ("executor_base", "collaborators.executor_url"),
    ("planner_base", "collaborators.planner_url"),
];

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port: {0}. Must be between 1 and 65535")]
    InvalidPort(u16),

    #[error("Invalid URL for {field}: '{value}'")]
    InvalidUrl { field: &'static str, value: String },

    #[error("Invalid {0}: must be greater than zero")]
    InvalidTimeout(&'static str),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Platform strategy 'override' needs at least one entry in platforms.overrides")]
    MissingOverride,

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .curator/config.yaml (project config)
    /// 3. .curator/local.yaml (local overrides, optional)
    /// 4. Legacy collaborator variables (`cat_base`, `executor_base`, ...)
    /// 5. Environment variables (CURATOR_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment(&[
            Path::new(".curator/config.yaml"),
            Path::new(".curator/local.yaml"),
        ])
        .extract()
        .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment variables still apply
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config: Config = Self::figment(&[path])
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(files: &[&Path]) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        for file in files {
            figment = figment.merge(Yaml::file(file));
        }
        figment
            .merge(Self::legacy_env())
            .merge(Env::prefixed("CURATOR_").split("__"))
    }

    fn legacy_env() -> Env {
        Env::raw()
            .only(&LEGACY_ENV.map(|(name, _)| name))
            .map(|key| {
                LEGACY_ENV
                    .iter()
                    .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
                    .map_or_else(|| key.as_str().to_string(), |(_, path)| (*path).to_string())
                    .into()
            })
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.server.port == 0 {
            return Err(ConfigError::InvalidPort(config.server.port));
        }

        let urls = [
            ("server.public_url", &config.server.public_url),
            ("collaborators.catalogue_url", &config.collaborators.catalogue_url),
            (
                "collaborators.platform_adapter_url",
                &config.collaborators.platform_adapter_url,
            ),
            ("collaborators.executor_url", &config.collaborators.executor_url),
            ("collaborators.planner_url", &config.collaborators.planner_url),
        ];
        for (field, value) in urls {
            let parsed = url::Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
                field,
                value: value.clone(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidUrl {
                    field,
                    value: value.clone(),
                });
            }
        }

        if config.orchestrator.instantiation_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "orchestrator.instantiation_timeout_secs",
            ));
        }
        if config.orchestrator.cancel_ack_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "orchestrator.cancel_ack_timeout_secs",
            ));
        }
        if config.http_client.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("http_client.timeout_secs"));
        }
        if config.orchestrator.planner_fallback_path.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "orchestrator.planner_fallback_path cannot be empty".to_string(),
            ));
        }

        if config.platforms.strategy == SelectionStrategy::Override
            && config.platforms.overrides.is_empty()
        {
            return Err(ConfigError::MissingOverride);
        }

        if config.images.enabled && config.images.docker_binary.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "images.docker_binary cannot be empty when images are enabled".to_string(),
            ));
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.http_client.initial_backoff_ms >= config.http_client.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.http_client.initial_backoff_ms,
                config.http_client.max_backoff_ms,
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        file
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 6200);
        assert_eq!(config.collaborators.catalogue_url, "http://tng-cat:4011");
        assert_eq!(config.orchestrator.instantiation_timeout_secs, 1800);
        assert_eq!(config.platforms.strategy, SelectionStrategy::First);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
server:
  port: 7000
  public_url: http://curator.local:7000
platforms:
  strategy: round_robin
orchestrator:
  instantiation_timeout_secs: 60
logging:
  level: debug
  format: pretty
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.platforms.strategy, SelectionStrategy::RoundRobin);
        assert_eq!(config.orchestrator.instantiation_timeout_secs, 60);
        assert_eq!(config.orchestrator.cancel_ack_timeout_secs, 300);
        assert_eq!(config.logging.format, "pretty");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_load_from_file_with_env_override() {
        let file = yaml_file("server:\n  port: 7000\n");

        let config = temp_env::with_vars(
            [
                ("CURATOR_SERVER__PORT", Some("7100")),
                ("CURATOR_PLATFORMS__STRATEGY", Some("random")),
            ],
            || ConfigLoader::load_from_file(file.path()),
        )
        .expect("config should load");

        assert_eq!(config.server.port, 7100);
        assert_eq!(config.platforms.strategy, SelectionStrategy::Random);
    }

    #[test]
    fn test_legacy_env_variables() {
        let file = yaml_file("collaborators:\n  executor_url: http://from-file:1\n");

        let config = temp_env::with_vars(
            [
                ("cat_base", Some("http://legacy-cat:4011")),
                ("executor_base", Some("http://legacy-exec:6400")),
            ],
            || ConfigLoader::load_from_file(file.path()),
        )
        .expect("config should load");

        assert_eq!(config.collaborators.catalogue_url, "http://legacy-cat:4011");
        assert_eq!(config.collaborators.executor_url, "http://legacy-exec:6400");
        assert_eq!(
            config.collaborators.planner_url,
            "http://tng-vnv-planner:6100"
        );
    }

    #[test]
    fn test_prefixed_env_beats_legacy_env() {
        let file = yaml_file("{}\n");

        let config = temp_env::with_vars(
            [
                ("planner_base", Some("http://legacy:1")),
                ("CURATOR_COLLABORATORS__PLANNER_URL", Some("http://modern:2")),
            ],
            || ConfigLoader::load_from_file(file.path()),
        )
        .expect("config should load");

        assert_eq!(config.collaborators.planner_url, "http://modern:2");
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let file = yaml_file("logging:\n  level: loud\n");
        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPort(0)
        ));
    }

    #[test]
    fn test_validate_invalid_url() {
        let mut config = Config::default();
        config.collaborators.executor_url = "tng-vnv-executor".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidUrl { field, .. } => {
                assert_eq!(field, "collaborators.executor_url");
            }
            other => panic!("Expected InvalidUrl error, got {other}"),
        }
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.orchestrator.instantiation_timeout_secs = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidTimeout(_)
        ));
    }

    #[test]
    fn test_validate_override_without_entries() {
        let mut config = Config::default();
        config.platforms.strategy = SelectionStrategy::Override;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::MissingOverride
        ));

        config
            .platforms
            .overrides
            .insert("sonata".to_string(), "sp1".to_string());
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogFormat(format) => assert_eq!(format, "xml"),
            _ => panic!("Expected InvalidLogFormat error"),
        }
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.http_client.initial_backoff_ms = 30000;
        config.http_client.max_backoff_ms = 10000;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff(30000, 10000)
        ));
    }
}
