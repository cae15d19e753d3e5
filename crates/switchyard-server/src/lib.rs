//! # Switchyard Server
//!
//! HTTP/1.1 transport for Switchyard.
//!
//! This crate drives a root [`RequestHandler`](switchyard_core::RequestHandler)
//! over Hyper:
//!
//! - One [`Exchange`] per request, firing every lifecycle stage in order
//! - Authorization after the headers, before the body is read
//! - Body size limit and request timeout
//! - Graceful shutdown with a connection drain timeout
//! - Layered configuration: defaults, TOML file, environment
//!
//! ## Example
//!
//! ```rust,ignore
//! use switchyard_server::{demo::demo_router, AccessConfig, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = demo_router(&AccessConfig::default(), 64)?;
//!     let config = ServerConfig::builder().http_addr("0.0.0.0:8080").build();
//!
//!     Server::new(config, router).run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/switchyard-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod demo;
pub mod error;
pub mod exchange;
pub mod loader;
pub mod server;
pub mod shutdown;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{ConfigError, ServerError};
pub use exchange::{Exchange, HttpResponse, ResponseBody};
pub use loader::{AccessConfig, AppConfig, ConfigLoader, ServerSettings, DEFAULT_ENV_PREFIX};
pub use server::Server;
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
