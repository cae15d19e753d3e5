//! The demo application served by the `switchyard` binary.
//!
//! | Prefix      | Handler            |
//! |-------------|--------------------|
//! | `/dump`     | [`DumpHandler`]    |
//! | `/template` | [`TemplateHandler`]|
//! | `/form`     | [`FormHandler`]    |
//! | `/file`     | [`FileUploadHandler`] |
//! | `/session`  | [`SessionHandler`] |
//! | anything else | [`NotFoundHandler`] |
//!
//! Only `/dump` has a real implementation; the others exercise the
//! `501 not implemented` default of [`RequestHandler::service`].

use http::StatusCode;
use switchyard_core::{DiagnosticBuffer, HandlerResult, Request, RequestHandler, Response};
use switchyard_router::{PrefixRouter, RouterError};
use switchyard_telemetry::{MetricsObserver, TracingObserver};

use crate::loader::AccessConfig;

/// Echoes the request line, headers and body back as plain text.
#[derive(Debug, Default)]
pub struct DumpHandler;

impl RequestHandler for DumpHandler {
    fn service(
        &self,
        request: &Request,
        response: &mut Response,
        diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        let mut lines = vec![
            format!("request-id: {}", request.id()),
            format!("method: {}", request.method()),
            format!("path: {}", request.path()),
        ];
        if let Some(query) = request.query() {
            lines.push(format!("query: {query}"));
        }
        lines.push(format!("version: {:?}", request.version()));
        if let Some(peer) = request.peer_addr() {
            lines.push(format!("peer: {peer}"));
        }
        lines.push(format!("status: {}", request.status()));
        lines.extend(request.headers().iter().map(|(name, value)| {
            format!("header {name}: {}", String::from_utf8_lossy(value.as_bytes()))
        }));
        lines.push(format!("body-length: {}", request.body().len()));
        if !request.body().is_empty() {
            lines.push(format!("body: {}", String::from_utf8_lossy(request.body())));
        }

        let mut dump = lines.join("\n");
        dump.push('\n');

        diagnostics.debug(format!("dumping {} bytes", dump.len()));
        response.set_header("content-type", "text/plain; charset=utf-8")?;
        response.write(dump, true)?;
        Ok(())
    }
}

/// Template rendering endpoint, left to the `501` default.
#[derive(Debug, Default)]
pub struct TemplateHandler;

impl RequestHandler for TemplateHandler {}

/// Form processing endpoint, left to the `501` default.
#[derive(Debug, Default)]
pub struct FormHandler;

impl RequestHandler for FormHandler {}

/// File upload endpoint, left to the `501` default.
#[derive(Debug, Default)]
pub struct FileUploadHandler;

impl RequestHandler for FileUploadHandler {}

/// Session endpoint, left to the `501` default.
#[derive(Debug, Default)]
pub struct SessionHandler;

impl RequestHandler for SessionHandler {}

/// Fallback for every unmapped path.
#[derive(Debug, Default)]
pub struct NotFoundHandler;

impl RequestHandler for NotFoundHandler {
    fn service(
        &self,
        request: &Request,
        response: &mut Response,
        _diagnostics: &mut DiagnosticBuffer,
    ) -> HandlerResult {
        response.set_status(StatusCode::NOT_FOUND, "Not Found")?;
        response.set_header("content-type", "text/plain; charset=utf-8")?;
        response.write(format!("404 not found: {}", request.path()), true)?;
        Ok(())
    }
}

/// Builds the demo router with logging and metrics observers.
///
/// Paths under any of `access.deny_prefixes` are refused during
/// authorization.
pub fn demo_router(access: &AccessConfig, diagnostic_capacity: usize) -> Result<PrefixRouter, RouterError> {
    let access = access.clone();

    PrefixRouter::builder(NotFoundHandler)
        .route("/dump", || DumpHandler)
        .route("/template", || TemplateHandler)
        .route("/form", || FormHandler)
        .route("/file", || FileUploadHandler)
        .route("/session", || SessionHandler)
        .observer(TracingObserver::new())
        .observer(MetricsObserver::new())
        .authorizer(move |request| !access.denies(request.path()))
        .diagnostic_capacity(diagnostic_capacity)
        .build()
}
