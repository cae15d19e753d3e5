//! Test fixtures for Switchyard development and testing.
//!
//! This module provides small handlers and a recording observer that are
//! reused by the tests of every Switchyard crate.
//!
//! # Example
//!
//! ```
//! use switchyard_core::fixtures::{RecordingObserver, TextHandler};
//! use switchyard_core::{RequestHandler, Stage, StageContext};
//!
//! let observer = RecordingObserver::new();
//! let handler = TextHandler::new("hello").observed_by(observer.clone());
//!
//! handler.notify(Stage::Completed, &StageContext::detached());
//! assert_eq!(observer.stages(), vec![Stage::Completed]);
//! ```

use std::sync::Arc;

use http::StatusCode;
use parking_lot::Mutex;

use crate::context::{RequestId, StageContext};
use crate::diagnostics::DiagnosticBuffer;
use crate::error::{HandlerError, HandlerResult};
use crate::lifecycle::Stage;
use crate::observer::LifecycleObserver;
use crate::request::Request;
use crate::response::Response;
use crate::handler::RequestHandler;

/// An observer that records every notification it receives.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<(Stage, Option<RequestId>)>>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded stages in arrival order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.events.lock().iter().map(|(stage, _)| *stage).collect()
    }

    /// Returns the recorded stages together with their request ids.
    #[must_use]
    pub fn events(&self) -> Vec<(Stage, Option<RequestId>)> {
        self.events.lock().clone()
    }

    /// Returns how often `stage` was recorded.
    #[must_use]
    pub fn count(&self, stage: Stage) -> usize {
        self.events.lock().iter().filter(|(s, _)| *s == stage).count()
    }

    /// Forgets everything recorded so far.
    pub fn reset(&self) {
        self.events.lock().clear();
    }
}

impl LifecycleObserver for RecordingObserver {
    fn on_stage(&self, stage: Stage, ctx: &StageContext<'_>) {
        self.events.lock().push((stage, ctx.request_id()));
    }
}

/// A handler that answers `200` with a fixed text body.
#[derive(Debug, Clone)]
pub struct TextHandler {
    body: String,
    observer: Option<RecordingObserver>,
}

impl TextHandler {
    /// Creates a handler answering with `body`.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            observer: None,
        }
    }

    /// Forwards this handler's notifications to `observer`.
    #[must_use]
    pub fn observed_by(mut self, observer: RecordingObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl RequestHandler for TextHandler {
    fn service(
        &self,
        _request: &Request,
        response: &mut Response,
        diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        diagnostics.debug(format!("writing {} bytes", self.body.len()));
        response.set_header("content-type", "text/plain; charset=utf-8")?;
        response.write(&self.body, true)?;
        Ok(())
    }

    fn notify(&self, stage: Stage, ctx: &StageContext<'_>) {
        if let Some(observer) = &self.observer {
            observer.on_stage(stage, ctx);
        }
    }
}

/// A handler that always fails with a fault.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingHandler;

impl RequestHandler for FailingHandler {
    fn service(
        &self,
        _request: &Request,
        _response: &mut Response,
        diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        diagnostics.debug("about to fail");
        Err(HandlerError::fault("fixture failure"))
    }
}

/// A handler that panics inside `service`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingHandler;

impl RequestHandler for PanickingHandler {
    fn service(
        &self,
        _request: &Request,
        _response: &mut Response,
        _diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        panic!("fixture panic")
    }
}

/// A handler that refuses every request with `403`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyingHandler;

impl RequestHandler for DenyingHandler {
    fn authorize(&self, _request: &Request, response: &mut Response) -> bool {
        // Ignore errors: the response may already be started by an earlier writer.
        let _ = response.set_status(StatusCode::FORBIDDEN, "forbidden");
        let _ = response.write("403 forbidden", true);
        false
    }

    fn service(
        &self,
        _request: &Request,
        _response: &mut Response,
        _diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        Err(HandlerError::fault("service called on a denied request"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_recording_observer_shares_log() {
        let observer = RecordingObserver::new();
        let clone = observer.clone();
        let request = Request::new(Method::GET, "/");

        clone.on_stage(Stage::RequestIncoming, &StageContext::for_request(&request));
        assert_eq!(observer.events(), vec![(Stage::RequestIncoming, Some(request.id()))]);
        assert_eq!(observer.count(Stage::RequestIncoming), 1);

        observer.reset();
        assert!(clone.stages().is_empty());
    }

    #[test]
    fn test_text_handler_writes_body() {
        let mut response = Response::new();
        TextHandler::new("ok")
            .service(
                &Request::new(Method::GET, "/"),
                &mut response,
                &mut DiagnosticBuffer::new(),
            )
            .expect("service");
        assert_eq!(response.body(), b"ok");
    }

    #[test]
    fn test_denying_handler() {
        let mut response = Response::new();
        assert!(!DenyingHandler.authorize(&Request::new(Method::GET, "/"), &mut response));
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
