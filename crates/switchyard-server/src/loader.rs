//! Layered application configuration.
//!
//! Configuration is applied in layers, later ones overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. A TOML file
//! 3. Environment variables named `PREFIX__SECTION__KEY`
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! request_timeout_ms = 10000
//! max_body_bytes = 1000000
//!
//! [telemetry.logging]
//! level = "info"
//!
//! [access]
//! deny_prefixes = ["/session"]
//! ```

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use switchyard_core::DEFAULT_DIAGNOSTIC_CAPACITY;
use switchyard_telemetry::{LogConfig, TelemetryConfig};

use crate::config::{
    ServerConfig, DEFAULT_HTTP_ADDR, DEFAULT_MAX_BODY_BYTES, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
use crate::error::ConfigError;

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "SWITCHYARD";

/// Complete configuration of the `switchyard` binary.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Listener and per-request limits.
    pub server: ServerSettings,

    /// Logging and metrics.
    pub telemetry: TelemetryConfig,

    /// Prefix-based access rules.
    pub access: AccessConfig,
}

/// The `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// Bind address.
    pub http_addr: String,
    /// Graceful shutdown timeout in seconds.
    pub shutdown_timeout_secs: u64,
    /// Body and handler timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Request body limit in bytes.
    pub max_body_bytes: usize,
    /// Connection limit, unlimited when absent.
    pub max_connections: Option<usize>,
    /// HTTP/1.1 keep-alive.
    pub keep_alive: bool,
    /// Diagnostic records kept per request.
    pub diagnostic_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_connections: None,
            keep_alive: true,
            diagnostic_capacity: DEFAULT_DIAGNOSTIC_CAPACITY,
        }
    }
}

impl ServerSettings {
    /// Converts the section into a [`ServerConfig`].
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        let builder = ServerConfig::builder()
            .http_addr(self.http_addr.clone())
            .shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs))
            .request_timeout(Duration::from_millis(self.request_timeout_ms))
            .max_body_bytes(self.max_body_bytes)
            .keep_alive(self.keep_alive)
            .diagnostic_capacity(self.diagnostic_capacity);

        match self.max_connections {
            Some(max) => builder.max_connections(max).build(),
            None => builder.build(),
        }
    }
}

/// The `[access]` section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessConfig {
    /// Requests whose path starts with one of these are denied.
    pub deny_prefixes: Vec<String>,
}

impl AccessConfig {
    /// Returns `true` if `path` falls under a denied prefix.
    #[must_use]
    pub fn denies(&self, path: &str) -> bool {
        self.deny_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl AppConfig {
    /// Development preset: pretty debug logging, metrics off.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging = LogConfig::development();
        config.telemetry.metrics.enabled = false;
        config.server.http_addr = "127.0.0.1:8080".to_string();
        config
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .http_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid_value("server.http_addr", e.to_string()))?;

        if self.server.shutdown_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.shutdown_timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than zero",
            ));
        }
        if self.server.max_connections == Some(0) {
            return Err(ConfigError::invalid_value(
                "server.max_connections",
                "must be greater than zero when set",
            ));
        }
        if self.server.diagnostic_capacity == 0 {
            return Err(ConfigError::invalid_value(
                "server.diagnostic_capacity",
                "must be greater than zero",
            ));
        }

        if self.telemetry.metrics.enabled {
            self.telemetry
                .metrics
                .addr
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::invalid_value("telemetry.metrics.addr", e.to_string()))?;
        }

        if let Some(index) = self.access.deny_prefixes.iter().position(String::is_empty) {
            return Err(ConfigError::invalid_value(
                format!("access.deny_prefixes[{index}]"),
                "an empty prefix would deny every request",
            ));
        }

        Ok(())
    }
}

/// Builds an [`AppConfig`] from defaults, a file and the environment.
///
/// ```no_run
/// use switchyard_server::ConfigLoader;
///
/// # fn main() -> Result<(), switchyard_server::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("switchyard.toml")?
///     .with_env_prefix("SWITCHYARD")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: AppConfig,
    env_prefix: Option<String>,
    file_loaded: bool,
}

impl ConfigLoader {
    /// Creates a loader holding the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to the default configuration.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = AppConfig::default();
        self
    }

    /// Resets to the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = AppConfig::development();
        self
    }

    /// Loads a TOML file, replacing everything it sets.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = toml::from_str(&content)?;
        self.file_loaded = true;

        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(self)
    }

    /// Loads a TOML file if it exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a TOML string.
    pub fn with_string(mut self, content: &str) -> Result<Self, ConfigError> {
        self.config = toml::from_str(content)?;
        Ok(self)
    }

    /// Enables environment overrides named `{prefix}__SECTION__KEY`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Loads variables from a `.env` file into the process environment.
    ///
    /// A missing `.env` file is not an error.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "Ignoring unreadable .env file"),
        }
        self
    }

    /// Returns `true` if a configuration file was loaded.
    #[must_use]
    pub fn file_loaded(&self) -> bool {
        self.file_loaded
    }

    /// Applies environment overrides and validates.
    pub fn load(self) -> Result<AppConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides without validating.
    pub fn load_unvalidated(mut self) -> Result<AppConfig, ConfigError> {
        if let Some(prefix) = &self.env_prefix {
            apply_env_overrides(&mut self.config, prefix, env::vars())?;
        }
        self.config.telemetry = self.config.telemetry.normalized();
        Ok(self.config)
    }
}

fn apply_env_overrides(
    config: &mut AppConfig,
    prefix: &str,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<(), ConfigError> {
    let marker = format!("{}__", prefix.to_uppercase());

    for (key, value) in vars {
        let Some(path) = key.strip_prefix(&marker) else {
            continue;
        };
        let parts: Vec<String> = path.split("__").map(str::to_uppercase).collect();
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        apply_env_var(config, &key, &parts, &value)?;
    }

    Ok(())
}

fn apply_env_var(
    config: &mut AppConfig,
    key: &str,
    parts: &[&str],
    value: &str,
) -> Result<(), ConfigError> {
    match parts {
        ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
        ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
            config.server.shutdown_timeout_secs = parse_number(key, value)?;
        }
        ["SERVER", "REQUEST_TIMEOUT_MS"] => {
            config.server.request_timeout_ms = parse_number(key, value)?;
        }
        ["SERVER", "MAX_BODY_BYTES"] => config.server.max_body_bytes = parse_number(key, value)?,
        ["SERVER", "MAX_CONNECTIONS"] => {
            config.server.max_connections = Some(parse_number(key, value)?);
        }
        ["SERVER", "KEEP_ALIVE"] => config.server.keep_alive = parse_bool(key, value)?,
        ["SERVER", "DIAGNOSTIC_CAPACITY"] => {
            config.server.diagnostic_capacity = parse_number(key, value)?;
        }
        ["TELEMETRY", "SERVICE_NAME"] => config.telemetry.service_name = value.to_string(),
        ["TELEMETRY", "LOGGING", "LEVEL"] => config.telemetry.logging.level = value.to_string(),
        ["TELEMETRY", "LOGGING", "FORMAT"] => {
            config.telemetry.logging.json_format = match value.to_lowercase().as_str() {
                "json" => true,
                "pretty" => false,
                _ => return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'")),
            };
        }
        ["TELEMETRY", "METRICS", "ENABLED"] => {
            config.telemetry.metrics.enabled = parse_bool(key, value)?;
        }
        ["TELEMETRY", "METRICS", "ADDR"] => config.telemetry.metrics.addr = value.to_string(),
        ["ACCESS", "DENY_PREFIXES"] => {
            config.access.deny_prefixes = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        _ => tracing::debug!(var = key, "Ignoring unknown configuration variable"),
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse_error(key, "expected boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_validate() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.http_addr, DEFAULT_HTTP_ADDR);
        assert!(config.access.deny_prefixes.is_empty());
    }

    #[test]
    fn test_development_preset() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.server.http_addr, "127.0.0.1:8080");
        assert!(!config.telemetry.metrics.enabled);
        assert!(!config.telemetry.logging.json_format);
    }

    #[test]
    fn test_with_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [server]
            http_addr = "127.0.0.1:9000"
            max_body_bytes = 2048

            [telemetry]
            service_name = "edge"

            [access]
            deny_prefixes = ["/session"]
            "#
        )
        .unwrap();

        let loader = ConfigLoader::new().with_file(file.path()).unwrap();
        assert!(loader.file_loaded());
        let config = loader.load().unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:9000");
        assert_eq!(config.server.max_body_bytes, 2048);
        assert_eq!(config.server.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert_eq!(config.telemetry.logging.service_name, "edge");
        assert_eq!(config.access.deny_prefixes, vec!["/session".to_string()]);
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::new()
            .with_file("/nonexistent/switchyard.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_optional_missing_file() {
        let loader = ConfigLoader::new()
            .with_optional_file("/nonexistent/switchyard.toml")
            .unwrap();
        assert!(!loader.file_loaded());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ConfigLoader::new()
            .with_string("[server]\nhttp_adr = \"127.0.0.1:1\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            "SWITCHYARD",
            vars(&[
                ("SWITCHYARD__SERVER__HTTP_ADDR", "127.0.0.1:7000"),
                ("SWITCHYARD__SERVER__REQUEST_TIMEOUT_MS", "250"),
                ("SWITCHYARD__SERVER__MAX_CONNECTIONS", "16"),
                ("SWITCHYARD__SERVER__KEEP_ALIVE", "off"),
                ("SWITCHYARD__TELEMETRY__LOGGING__FORMAT", "pretty"),
                ("SWITCHYARD__TELEMETRY__METRICS__ENABLED", "false"),
                ("SWITCHYARD__ACCESS__DENY_PREFIXES", "/session, /file ,"),
                ("SWITCHYARD__UNKNOWN__KEY", "ignored"),
                ("OTHER__SERVER__HTTP_ADDR", "ignored"),
            ]),
        )
        .unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:7000");
        assert_eq!(config.server.request_timeout_ms, 250);
        assert_eq!(config.server.max_connections, Some(16));
        assert!(!config.server.keep_alive);
        assert!(!config.telemetry.logging.json_format);
        assert!(!config.telemetry.metrics.enabled);
        assert_eq!(
            config.access.deny_prefixes,
            vec!["/session".to_string(), "/file".to_string()]
        );
    }

    #[test]
    fn test_env_parse_failure() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(
            &mut config,
            "SWITCHYARD",
            vars(&[("SWITCHYARD__SERVER__MAX_BODY_BYTES", "lots")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));
        assert!(err.to_string().contains("expected integer"));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = AppConfig::default();
        config.server.request_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.request_timeout_ms"));
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let mut config = AppConfig::default();
        config.server.http_addr = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_deny_prefix() {
        let mut config = AppConfig::default();
        config.access.deny_prefixes = vec!["/admin".to_string(), String::new()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("access.deny_prefixes[1]"));
    }

    #[test]
    fn test_server_config_conversion() {
        let settings = ServerSettings {
            max_connections: Some(4),
            request_timeout_ms: 1500,
            ..ServerSettings::default()
        };
        let config = settings.server_config();
        assert_eq!(config.max_connections(), Some(4));
        assert_eq!(config.request_timeout(), Duration::from_millis(1500));
    }

    #[test]
    fn test_access_denies_prefix() {
        let access = AccessConfig {
            deny_prefixes: vec!["/session".to_string()],
        };
        assert!(access.denies("/session/new"));
        assert!(!access.denies("/dump"));
    }
}
