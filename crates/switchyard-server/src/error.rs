//! Server and configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop the server from starting or serving.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The configured address could not be parsed or bound.
    #[error("failed to bind to {addr}: {reason}")]
    Bind {
        /// The address that was requested.
        addr: String,
        /// Why binding failed.
        reason: String,
    },

    /// The listener failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Creates a bind error.
    pub fn bind(addr: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Bind {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field with the invalid value.
        field: String,
        /// Explanation of why the value is invalid.
        reason: String,
    },

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates a read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an environment variable parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = ServerError::bind("invalid", "invalid socket address syntax");
        let message = err.to_string();
        assert!(message.contains("invalid"));
        assert!(message.contains("socket address"));
    }

    #[test]
    fn test_file_not_found_error() {
        let err = ConfigError::file_not_found("/etc/switchyard.toml");
        assert!(err.to_string().contains("/etc/switchyard.toml"));
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::invalid_value("server.http_addr", "not a socket address");
        assert!(err.to_string().contains("server.http_addr"));
        assert!(err.to_string().contains("not a socket address"));
    }

    #[test]
    fn test_env_parse_error() {
        let err = ConfigError::env_parse_error("SWITCHYARD__SERVER__MAX_BODY_BYTES", "expected integer");
        assert!(err.to_string().contains("SWITCHYARD__SERVER__MAX_BODY_BYTES"));
        assert!(err.to_string().contains("expected integer"));
    }
}
