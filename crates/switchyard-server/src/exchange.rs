//! One request/response exchange as seen by the transport.
//!
//! An [`Exchange`] owns the [`Request`] and its [`RequestLifecycle`] and is
//! the only place the transport notifies the root handler from. Every
//! notification passes through the lifecycle first; a transition it rejects
//! is logged and suppressed, so observers never see a duplicate or
//! out-of-order stage.
//!
//! A finished exchange rides along inside its [`ResponseBody`] and reports
//! `Finished` only once hyper has taken the last chunk of the body.
//!
//! Dropping an exchange that is still in flight reports it as aborted, or as
//! expired when the server is shutting down. This covers a client that
//! disconnects mid-request or mid-response as well as connections cancelled
//! at the end of the shutdown grace period.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode};
use hyper::body::{Body, Frame, SizeHint};
use switchyard_core::{
    Request, RequestHandler, RequestLifecycle, RequestStatus, Response, Stage, StageContext,
};
use switchyard_telemetry::metrics::{record_request, record_request_size, record_response_size};
use switchyard_telemetry::InFlightGuard;

use crate::shutdown::ShutdownSignal;

/// Largest frame a [`ResponseBody`] yields at once.
pub const RESPONSE_CHUNK_SIZE: usize = 64 * 1024;

/// Response type handed to hyper.
pub type HttpResponse = http::Response<ResponseBody>;

/// Drives the lifecycle of a single request.
pub struct Exchange {
    root: Arc<dyn RequestHandler>,
    request: Request,
    lifecycle: RequestLifecycle,
    shutdown: ShutdownSignal,
    started: Instant,
    _in_flight: InFlightGuard,
}

impl Exchange {
    /// Starts an exchange for a request whose headers have been parsed.
    ///
    /// Fires `RequestIncoming` and `HeaderReceived`.
    pub fn begin(
        root: Arc<dyn RequestHandler>,
        request: Request,
        shutdown: ShutdownSignal,
    ) -> Self {
        let mut exchange = Self {
            root,
            request,
            lifecycle: RequestLifecycle::new(),
            shutdown,
            started: Instant::now(),
            _in_flight: InFlightGuard::new(),
        };

        exchange.request.set_status(RequestStatus::WaitingForHeader);
        exchange.fire(Stage::RequestIncoming);
        exchange.request.set_status(RequestStatus::WaitingForBody);
        exchange.fire(Stage::HeaderReceived);
        exchange
    }

    /// Returns the request.
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the lifecycle tracked so far.
    pub const fn lifecycle(&self) -> &RequestLifecycle {
        &self.lifecycle
    }

    /// Asks the root handler whether the request may proceed.
    ///
    /// A refusal fires `AccessDenied`.
    pub fn authorize(&mut self, response: &mut Response) -> bool {
        let allowed = self.root.authorize(&self.request, response);
        if !allowed {
            self.fire(Stage::AccessDenied);
        }
        allowed
    }

    /// Accounts for one body chunk and fires `BodyReceived`.
    pub fn receive_chunk(&mut self, chunk: &[u8]) {
        self.request.record_received(chunk.len());
        self.fire(Stage::BodyReceived);
    }

    /// Stores the full body and fires `Completed`.
    pub fn complete(&mut self, body: Bytes) {
        self.request.set_body(body);
        self.request.set_status(RequestStatus::Complete);
        self.fire(Stage::Completed);
    }

    /// Attaches the exchange to the body of `response`.
    ///
    /// `Finished` fires once hyper has taken the last chunk of the body.
    /// Responses that send no body (`HEAD`, 1xx, 204, 304) finish here.
    pub fn finish(self, response: HttpResponse) -> HttpResponse {
        let status = response.status();
        if *self.request.method() == Method::HEAD || !sends_body(status) {
            self.delivered(status.as_u16(), 0);
            return response;
        }
        response.map(|body| body.finishing(self, status.as_u16()))
    }

    /// Ends the exchange with an anomaly instead of `Finished`.
    pub fn fail(mut self, stage: Stage, response: HttpResponse) -> HttpResponse {
        debug_assert!(stage.is_anomaly());
        if stage == Stage::Aborted {
            self.request.set_status(RequestStatus::Aborted);
        }
        self.fire(stage);
        let status = response.status().as_u16();
        self.record(status, response.body().size_hint().exact().unwrap_or(0));
        tracing::warn!(
            request_id = %self.request.id(),
            http.path = self.request.path(),
            http.status_code = status,
            stage = %stage,
            duration_ms = elapsed_ms(self.started),
            "Request ended early"
        );
        response
    }

    fn delivered(mut self, status: u16, size: u64) {
        self.fire(Stage::Finished);
        self.record(status, size);
        switchyard_telemetry::log_request_complete!(
            self.request.id(),
            status,
            elapsed_ms(self.started)
        );
    }

    fn record(&self, status: u16, response_size: u64) {
        record_request(status, self.started.elapsed());
        record_request_size(self.request.received_bytes());
        record_response_size(response_size);
    }

    fn fire(&mut self, stage: Stage) {
        match self.lifecycle.advance(stage) {
            Ok(()) => self
                .root
                .notify(stage, &StageContext::for_request(&self.request)),
            Err(violation) => tracing::debug!(
                request_id = %self.request.id(),
                stage = %stage,
                error = %violation,
                "Suppressed lifecycle notification"
            ),
        }
    }
}

impl Drop for Exchange {
    fn drop(&mut self) {
        if !self.lifecycle.is_in_flight() {
            return;
        }
        let stage = if self.shutdown.is_shutdown() {
            Stage::Expired
        } else {
            Stage::Aborted
        };
        self.request.set_status(RequestStatus::Aborted);
        self.fire(stage);
    }
}

impl std::fmt::Debug for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("request_id", &self.request.id())
            .field("path", &self.request.path())
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

fn sends_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || matches!(status, StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED))
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Body of every response the server sends.
///
/// The payload is yielded in frames of at most [`RESPONSE_CHUNK_SIZE`], so
/// hyper pulls the next frame only after flushing what it already buffers.
/// When a finished [`Exchange`] is attached, taking the last frame fires
/// `Finished`; dropping the body before that leaves the exchange in flight,
/// which then reports `Aborted` (or `Expired` during shutdown).
pub struct ResponseBody {
    remaining: Bytes,
    pending: Option<PendingFinish>,
}

struct PendingFinish {
    exchange: Exchange,
    status: u16,
    size: u64,
}

impl ResponseBody {
    /// Creates a body that is not tied to any exchange.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            remaining: data.into(),
            pending: None,
        }
    }

    /// Returns `true` while an exchange is waiting for the body to be sent.
    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        self.pending.is_some()
    }

    fn finishing(mut self, exchange: Exchange, status: u16) -> Self {
        self.pending = Some(PendingFinish {
            exchange,
            status,
            size: self.remaining.len() as u64,
        });
        self
    }

    fn settle(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.exchange.delivered(pending.status, pending.size);
        }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.remaining.is_empty() {
            this.settle();
            return Poll::Ready(None);
        }

        let len = this.remaining.len().min(RESPONSE_CHUNK_SIZE);
        let chunk = this.remaining.split_to(len);
        if this.remaining.is_empty() {
            this.settle();
        }
        Poll::Ready(Some(Ok(Frame::data(chunk))))
    }

    fn is_end_stream(&self) -> bool {
        self.remaining.is_empty()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining.len() as u64)
    }
}

impl Drop for ResponseBody {
    fn drop(&mut self) {
        // hyper drops an empty body without polling it.
        if self.remaining.is_empty() {
            self.settle();
        }
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBody")
            .field("remaining", &self.remaining.len())
            .field("tracked", &self.is_tracked())
            .finish()
    }
}

/// Converts a handler's response into a hyper response.
///
/// A custom reason phrase is carried through hyper's `ReasonPhrase`
/// extension.
pub fn into_http_response(response: Response) -> HttpResponse {
    let reason = response.reason().map(str::to_owned);
    let (status, headers, body) = response.into_parts();

    let mut http_response = http::Response::new(ResponseBody::new(body));
    *http_response.status_mut() = status;
    *http_response.headers_mut() = headers;

    if let Some(reason) = reason {
        match hyper::ext::ReasonPhrase::try_from(reason.into_bytes()) {
            Ok(phrase) => {
                http_response.extensions_mut().insert(phrase);
            }
            Err(e) => tracing::debug!(error = ?e, "Dropping invalid reason phrase"),
        }
    }
    http_response
}

/// Builds a JSON error response: `{"error": {"code": ..., "message": ...}}`.
pub fn error_response(status: StatusCode, code: &str, message: &str) -> HttpResponse {
    let body = serde_json::json!({
        "error": {
            "code": code,
            "message": message,
        }
    });

    let mut response = http::Response::new(ResponseBody::new(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
