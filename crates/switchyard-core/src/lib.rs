//! # Switchyard Core
//!
//! Core types and traits for the Switchyard request router.
//!
//! This crate provides the foundational types used throughout Switchyard:
//!
//! - [`Request`] / [`Response`] - The exchange a handler works on
//! - [`RequestHandler`] - The handler contract (`service`, `authorize`, `notify`)
//! - [`Stage`] / [`RequestLifecycle`] - Lifecycle stages and their ordering rules
//! - [`ObserverRegistry`] - Table-driven lifecycle observers
//! - [`DiagnosticBuffer`] - Per-request diagnostic messages, flushed on failure
//! - [`HandlerError`] - Standard error types

#![doc(html_root_url = "https://docs.rs/switchyard-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod diagnostics;
mod error;
pub mod fixtures;
mod handler;
mod lifecycle;
mod observer;
mod request;
mod response;

pub use context::{RequestId, StageContext};
pub use diagnostics::{
    DiagnosticBuffer, DiagnosticEntry, DiagnosticScope, DEFAULT_DIAGNOSTIC_CAPACITY,
};
pub use error::{HandlerError, HandlerResult, LifecycleViolation, ResponseError};
pub use handler::{RequestHandler, NOT_IMPLEMENTED_BODY};
pub use lifecycle::{RequestLifecycle, Stage, StageSet};
pub use observer::{LifecycleObserver, ObserverRegistry};
pub use request::{Request, RequestBuilder, RequestStatus};
pub use response::Response;
