//! # Switchyard
//!
//! **Path-prefix HTTP routing with a per-request lifecycle contract**
//!
//! Switchyard maps request paths to handlers by first-matching prefix and
//! reports every step of a request's life to the handler and its observers:
//!
//! - **Prefix routing** – ordered bindings, first match wins, one fresh
//!   handler per request, a shared fallback for everything else
//! - **Lifecycle hooks** – incoming, headers, body chunks, completion,
//!   denial, abort, timeout, expiry and finish, each delivered at most once
//!   and in order
//! - **Diagnostics** – a bounded per-request buffer that is flushed on
//!   failure and discarded otherwise
//! - **Observability** – structured logs and Prometheus metrics per stage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchyard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = PrefixRouter::builder(NotFound)
//!         .route("/hello", || Hello)
//!         .observer(TracingObserver::new())
//!         .build()?;
//!
//!     let config = ServerConfig::builder().http_addr("0.0.0.0:8080").build();
//!     Server::new(config, router).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! ConnectionOpened (once per connection)
//!   RequestIncoming → HeaderReceived ─┬→ BodyReceived* → Completed ─┬→ Finished
//!                                     └→ AccessDenied ──────────────┘
//!   Aborted | TimedOut | Expired may end the request at any point before Finished
//! ```

#![doc(html_root_url = "https://docs.rs/switchyard/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use switchyard_core as core;

// Re-export router types
pub use switchyard_router as router;

// Re-export server types
pub use switchyard_server as server;

// Re-export telemetry types
pub use switchyard_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust
/// use switchyard::prelude::*;
///
/// let stages = StageSet::anomalies();
/// assert!(stages.contains(Stage::Expired));
/// ```
pub mod prelude {
    pub use switchyard_core::{
        DiagnosticBuffer, HandlerError, HandlerResult, LifecycleObserver, ObserverRegistry,
        Request, RequestHandler, RequestId, RequestStatus, Response, Stage, StageContext,
        StageSet,
    };

    pub use switchyard_router::{PrefixRouter, PrefixRouterBuilder, RouteTarget, RouterError};

    pub use switchyard_server::{AppConfig, ConfigLoader, Server, ServerConfig, ShutdownSignal};

    pub use switchyard_telemetry::{init_telemetry, MetricsObserver, TelemetryConfig, TracingObserver};
}
