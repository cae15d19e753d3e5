//! The request handler contract.
//!
//! Every unit that can serve a request implements [`RequestHandler`]. The
//! transport drives it through three entry points:
//!
//! 1. [`authorize`](RequestHandler::authorize) once the headers are parsed,
//! 2. [`service`](RequestHandler::service) once the request is complete,
//! 3. [`notify`](RequestHandler::notify) at every lifecycle [`Stage`].
//!
//! All three have defaults, so a handler only overrides what it needs. A
//! handler that overrides nothing answers `501 not implemented`.

use std::sync::Arc;

use http::StatusCode;

use crate::context::StageContext;
use crate::diagnostics::DiagnosticBuffer;
use crate::error::HandlerResult;
use crate::lifecycle::Stage;
use crate::request::Request;
use crate::response::Response;

/// Body written by the default [`RequestHandler::service`].
pub const NOT_IMPLEMENTED_BODY: &str = "501 not implemented";

/// A unit that produces a response for a request.
///
/// Handlers are `Send + Sync` so the transport can run them on any worker
/// thread. A handler created per request is used by exactly one request.
///
/// # Example
///
/// ```
/// use switchyard_core::{DiagnosticBuffer, HandlerResult, Request, RequestHandler, Response};
/// use http::Method;
///
/// struct Hello;
///
/// impl RequestHandler for Hello {
///     fn service(
///         &self,
///         _request: &Request,
///         response: &mut Response,
///         _diagnostics: &mut DiagnosticBuffer,
///     ) -> HandlerResult {
///         response.write("hello", true)?;
///         Ok(())
///     }
/// }
///
/// let mut response = Response::new();
/// Hello
///     .service(&Request::new(Method::GET, "/"), &mut response, &mut DiagnosticBuffer::new())
///     .unwrap();
/// assert_eq!(response.body(), b"hello");
/// ```
pub trait RequestHandler: Send + Sync {
    /// Produces the response for a complete request.
    ///
    /// The default logs the unhandled request and answers `501`.
    fn service(
        &self,
        request: &Request,
        response: &mut Response,
        diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        tracing::error!(
            request_id = %request.id(),
            path = request.path(),
            "request handler has no service implementation"
        );
        diagnostics.debug(format!(
            "unhandled request: {} {} {:?}",
            request.method(),
            request.path(),
            request.version()
        ));
        response.set_status(StatusCode::NOT_IMPLEMENTED, "not implemented")?;
        response.write(NOT_IMPLEMENTED_BODY, true)?;
        Ok(())
    }

    /// Decides whether the request may proceed. Called after the headers are
    /// parsed and before any body bytes are read.
    ///
    /// Returning `false` makes the transport fire
    /// [`Stage::AccessDenied`]; `service` is then never called. A handler
    /// may write its own denial into `response`.
    fn authorize(&self, request: &Request, response: &mut Response) -> bool {
        let _ = (request, response);
        true
    }

    /// Lifecycle notification. The default does nothing.
    fn notify(&self, stage: Stage, ctx: &StageContext<'_>) {
        let _ = (stage, ctx);
    }
}

impl<T: RequestHandler + ?Sized> RequestHandler for Arc<T> {
    fn service(
        &self,
        request: &Request,
        response: &mut Response,
        diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        (**self).service(request, response, diagnostics)
    }

    fn authorize(&self, request: &Request, response: &mut Response) -> bool {
        (**self).authorize(request, response)
    }

    fn notify(&self, stage: Stage, ctx: &StageContext<'_>) {
        (**self).notify(stage, ctx);
    }
}

impl<T: RequestHandler + ?Sized> RequestHandler for Box<T> {
    fn service(
        &self,
        request: &Request,
        response: &mut Response,
        diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        (**self).service(request, response, diagnostics)
    }

    fn authorize(&self, request: &Request, response: &mut Response) -> bool {
        (**self).authorize(request, response)
    }

    fn notify(&self, stage: Stage, ctx: &StageContext<'_>) {
        (**self).notify(stage, ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    struct Bare;

    impl RequestHandler for Bare {}

    #[test]
    fn test_default_service_answers_501() {
        let request = Request::new(Method::GET, "/nothing");
        let mut response = Response::new();
        let mut diagnostics = DiagnosticBuffer::new();

        Bare.service(&request, &mut response, &mut diagnostics)
            .expect("default service succeeds");

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(response.reason(), Some("not implemented"));
        assert_eq!(response.body(), NOT_IMPLEMENTED_BODY.as_bytes());
        assert!(response.is_finished());
    }

    #[test]
    fn test_default_service_on_finished_response_errors() {
        let request = Request::new(Method::GET, "/nothing");
        let mut response = Response::new();
        response.write("already", true).expect("write");

        let result = Bare.service(&request, &mut response, &mut DiagnosticBuffer::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_default_authorize_and_notify() {
        let request = Request::new(Method::GET, "/");
        let mut response = Response::new();
        assert!(Bare.authorize(&request, &mut response));
        assert!(!response.has_started());

        for stage in Stage::ALL {
            Bare.notify(stage, &StageContext::for_request(&request));
        }
    }

    #[test]
    fn test_arc_and_box_delegate() {
        let shared: Arc<dyn RequestHandler> = Arc::new(Bare);
        let boxed: Box<dyn RequestHandler> = Box::new(Bare);
        let request = Request::new(Method::GET, "/");

        let mut response = Response::new();
        shared
            .service(&request, &mut response, &mut DiagnosticBuffer::new())
            .expect("service");
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

        let mut response = Response::new();
        boxed
            .service(&request, &mut response, &mut DiagnosticBuffer::new())
            .expect("service");
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
