//! First-match path-prefix router for Switchyard.
//!
//! This crate provides [`PrefixRouter`], the single entry point that every
//! inbound request passes through. It owns an ordered list of
//! `(prefix, factory)` bindings plus one shared fallback handler:
//!
//! - **First match wins**: bindings are scanned in declaration order. The
//!   first prefix the path starts with is chosen, even if a later, longer
//!   prefix would also match.
//! - **Fresh handlers**: a matched binding builds a new handler for every
//!   request; it is dropped as soon as `service` returns.
//! - **Shared fallback**: paths matching nothing (including the empty path)
//!   go to one handler instance shared by all requests.
//! - **Observers**: lifecycle notifications sent to the router are fanned
//!   out to its [`ObserverRegistry`](switchyard_core::ObserverRegistry).
//!
//! # Example
//!
//! ```rust
//! use switchyard_core::fixtures::TextHandler;
//! use switchyard_router::{PrefixRouter, RouteTarget};
//!
//! let router = PrefixRouter::builder(TextHandler::new("static"))
//!     .route("/dump", || TextHandler::new("dump"))
//!     .route("/session", || TextHandler::new("session"))
//!     .build()
//!     .unwrap();
//!
//! assert!(matches!(router.resolve("/dump/x"), RouteTarget::Binding { index: 0, .. }));
//! assert_eq!(router.resolve("/"), RouteTarget::Fallback);
//! ```
//!
//! # Matching
//!
//! ```text
//!   bindings: ["/file", "/files"]
//!
//!   "/files/x"  ──▶ "/file"   (first match, "/files" is shadowed)
//!   "/file"     ──▶ "/file"
//!   "/fil"      ──▶ fallback
//!   ""          ──▶ fallback
//! ```

mod binding;
mod error;
mod router;

pub use binding::{HandlerFactory, RouteBinding};
pub use error::RouterError;
pub use router::{Authorizer, PrefixRouter, PrefixRouterBuilder, RouteTarget};
