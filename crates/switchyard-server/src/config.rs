//! Server configuration types.
//!
//! ```rust
//! use switchyard_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .http_addr("127.0.0.1:8080")
//!     .request_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.http_addr(), "127.0.0.1:8080");
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use switchyard_core::DEFAULT_DIAGNOSTIC_CAPACITY;

/// Default HTTP bind address.
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default time allowed for receiving a body and for the handler, each.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default upper bound on a request body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1_000_000;

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:8080")
    http_addr: String,

    /// How long shutdown waits for open connections before cancelling them
    shutdown_timeout: Duration,

    /// Whether HTTP/1.1 connections are kept open between requests
    keep_alive: bool,

    /// Maximum concurrent connections (None = unlimited)
    max_connections: Option<usize>,

    /// Deadline for the body phase and, separately, for the handler
    request_timeout: Duration,

    /// Largest accepted request body
    max_body_bytes: usize,

    /// Diagnostic records kept per request
    diagnostic_capacity: usize,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the HTTP bind address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Parses the HTTP address as a `SocketAddr`.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.http_addr.parse()
    }

    /// Returns the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns whether keep-alive is enabled.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Returns the maximum number of concurrent connections, if configured.
    #[must_use]
    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Returns the request body limit in bytes.
    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Returns the per-request diagnostic buffer capacity.
    #[must_use]
    pub fn diagnostic_capacity(&self) -> usize {
        self.diagnostic_capacity
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    http_addr: String,
    shutdown_timeout: Duration,
    keep_alive: bool,
    max_connections: Option<usize>,
    request_timeout: Duration,
    max_body_bytes: usize,
    diagnostic_capacity: usize,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            keep_alive: true,
            max_connections: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            diagnostic_capacity: DEFAULT_DIAGNOSTIC_CAPACITY,
        }
    }

    /// Sets the HTTP bind address (e.g., "0.0.0.0:8080", "127.0.0.1:0").
    #[must_use]
    pub fn http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Sets the graceful shutdown timeout.
    ///
    /// Connections still open after this long are cancelled, and their
    /// in-flight requests are reported as expired.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enables or disables HTTP/1.1 keep-alive.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Sets the maximum number of concurrent connections.
    ///
    /// Connections accepted beyond the limit are closed immediately.
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the request body limit.
    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Sets how many diagnostic records a request may buffer.
    #[must_use]
    pub fn diagnostic_capacity(mut self, capacity: usize) -> Self {
        self.diagnostic_capacity = capacity;
        self
    }

    /// Builds the server configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            http_addr: self.http_addr,
            shutdown_timeout: self.shutdown_timeout,
            keep_alive: self.keep_alive,
            max_connections: self.max_connections,
            request_timeout: self.request_timeout,
            max_body_bytes: self.max_body_bytes,
            diagnostic_capacity: self.diagnostic_capacity,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.http_addr(), DEFAULT_HTTP_ADDR);
        assert_eq!(
            config.shutdown_timeout(),
            Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS)
        );
        assert!(config.keep_alive());
        assert!(config.max_connections().is_none());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_body_bytes(), DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.diagnostic_capacity(), DEFAULT_DIAGNOSTIC_CAPACITY);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::builder()
            .http_addr("127.0.0.1:3000")
            .shutdown_timeout(Duration::from_secs(5))
            .keep_alive(false)
            .max_connections(128)
            .request_timeout(Duration::from_millis(250))
            .max_body_bytes(4096)
            .diagnostic_capacity(8)
            .build();

        assert_eq!(config.http_addr(), "127.0.0.1:3000");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert!(!config.keep_alive());
        assert_eq!(config.max_connections(), Some(128));
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_body_bytes(), 4096);
        assert_eq!(config.diagnostic_capacity(), 8);
    }

    #[test]
    fn test_socket_addr_parsing() {
        let config = ServerConfig::builder().http_addr("127.0.0.1:8080").build();
        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_invalid_socket_addr() {
        let config = ServerConfig::builder().http_addr("not-an-address").build();
        assert!(config.socket_addr().is_err());
    }
}
