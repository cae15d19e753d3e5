//! Error types for Switchyard.
//!
//! Three families of errors exist in the core:
//!
//! - [`ResponseError`] - misuse of the [`Response`](crate::Response) sink
//! - [`HandlerError`] - a failure raised by [`RequestHandler::service`](crate::RequestHandler::service)
//! - [`LifecycleViolation`] - a lifecycle transition the state machine refuses
//!
//! Handler faults are never swallowed by the router. They surface to whoever
//! invoked `dispatch`, which decides how to answer the client (usually a
//! generic 500).

use http::StatusCode;
use thiserror::Error;

use crate::lifecycle::Stage;

/// Result type returned by [`RequestHandler::service`](crate::RequestHandler::service).
pub type HandlerResult = Result<(), HandlerError>;

/// Errors raised while writing to a [`Response`](crate::Response).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    /// The last part of the body was already written.
    #[error("response already finished")]
    AlreadyFinished,

    /// Status or headers were changed after body bytes were written.
    #[error("headers already sent, cannot modify {what}")]
    HeadersSent {
        /// What the caller tried to modify.
        what: &'static str,
    },

    /// A header name or value could not be represented.
    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        /// The offending header name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Errors raised by a handler's `service` implementation.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Writing the response failed.
    #[error("response error: {0}")]
    Response(#[from] ResponseError),

    /// The handler hit an unrecoverable fault.
    #[error("handler fault: {message}")]
    Fault {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl HandlerError {
    /// Creates a fault with a message.
    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a fault wrapping an underlying error.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Fault {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the HTTP status a transport should answer with.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Returns a stable machine-readable code for the error envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Response(_) => "RESPONSE_ERROR",
            Self::Fault { .. } => "HANDLER_FAULT",
        }
    }
}

/// A lifecycle transition refused by [`RequestLifecycle`](crate::RequestLifecycle).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleViolation {
    /// A non-recurring stage fired a second time.
    #[error("stage {0} already fired")]
    Duplicate(Stage),

    /// A stage fired after a later stage.
    #[error("stage {stage} cannot follow {after}")]
    OutOfOrder {
        /// The rejected stage.
        stage: Stage,
        /// The most recent normal stage.
        after: Stage,
    },

    /// A stage conflicts with one that already fired for the same request.
    #[error("stage {stage} is exclusive with {conflicts_with}")]
    Exclusive {
        /// The rejected stage.
        stage: Stage,
        /// The stage it conflicts with.
        conflicts_with: Stage,
    },

    /// A stage fired after the request reached a terminal stage.
    #[error("stage {stage} fired after terminal stage {terminal}")]
    AfterTerminal {
        /// The rejected stage.
        stage: Stage,
        /// The terminal stage already reached.
        terminal: Stage,
    },

    /// A connection-scoped stage was fed to a request lifecycle.
    #[error("stage {0} is connection-scoped")]
    ConnectionScoped(Stage),
}
