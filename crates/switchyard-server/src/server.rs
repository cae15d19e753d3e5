//! HTTP/1.1 server built on Hyper and Tokio.
//!
//! # Architecture
//!
//! - A TCP listener bound to the configured address, with an optional
//!   connection limit
//! - One task per connection, serving HTTP/1.1 with keep-alive
//! - One [`Exchange`] per request, which reports every lifecycle stage to
//!   the root handler
//! - The root handler's `service` running on the blocking pool, bounded by
//!   the request timeout
//! - Graceful shutdown: stop accepting, drain open connections, then cancel
//!   whatever is left after the shutdown timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use switchyard_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder().http_addr("0.0.0.0:8080").build();
//!     Server::new(config, router).run().await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::StatusCode;
use http_body_util::BodyExt;
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use switchyard_core::{
    DiagnosticBuffer, Request, RequestHandler, Response, Stage, StageContext,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::exchange::{error_response, into_http_response, Exchange, HttpResponse};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// The Switchyard HTTP server.
///
/// Every request is handed to a single root [`RequestHandler`], usually a
/// `PrefixRouter`.
pub struct Server {
    config: ServerConfig,
    root: Arc<dyn RequestHandler>,
    shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
}

impl Server {
    /// Creates a server that dispatches to `root`.
    pub fn new(config: ServerConfig, root: impl RequestHandler + 'static) -> Self {
        Self::with_shared_root(config, Arc::new(root))
    }

    /// Creates a server around an already shared root handler.
    pub fn with_shared_root(config: ServerConfig, root: Arc<dyn RequestHandler>) -> Self {
        Self {
            config,
            root,
            shutdown: ShutdownSignal::new(),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the root handler.
    #[must_use]
    pub fn root(&self) -> &Arc<dyn RequestHandler> {
        &self.root
    }

    /// Returns the number of open connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.tracker.active_connections()
    }

    /// Runs the server until SIGTERM or SIGINT.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|e| ServerError::bind(self.config.http_addr(), e))?;

        TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::bind(self.config.http_addr(), e))
    }

    /// Serves connections from `listener` until `shutdown` triggers.
    pub async fn serve(
        mut self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!("Server listening on {}", local_addr);

        self.shutdown = shutdown;
        let server = Arc::new(self);
        let limiter = server
            .config
            .max_connections()
            .map(|max| Arc::new(Semaphore::new(max)));
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let permit = match &limiter {
                                Some(limiter) => {
                                    if let Ok(permit) = Arc::clone(limiter).try_acquire_owned() {
                                        Some(permit)
                                    } else {
                                        tracing::warn!(peer = %peer, "Connection limit reached, closing connection");
                                        continue;
                                    }
                                }
                                None => None,
                            };

                            let token = server.tracker.acquire();
                            let conn_server = Arc::clone(&server);
                            connections.spawn(async move {
                                if let Err(e) = conn_server.handle_connection(stream, peer).await {
                                    tracing::debug!(peer = %peer, error = %e, "Connection error");
                                }
                                drop(permit);
                                drop(token);
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to accept connection");
                        }
                    }
                }

                () = server.shutdown.wait() => {
                    tracing::info!("Shutdown signal received, stopping server");
                    break;
                }
            }

            while connections.try_join_next().is_some() {}
        }

        drop(listener);

        let shutdown_timeout = server.config.shutdown_timeout();
        tracing::info!(
            "Waiting up to {:?} for {} connections to close",
            shutdown_timeout,
            server.tracker.active_connections()
        );

        tokio::select! {
            () = server.tracker.wait_for_shutdown() => {
                tracing::info!("All connections closed");
            }
            () = tokio::time::sleep(shutdown_timeout) => {
                tracing::warn!(
                    "Shutdown timeout reached, cancelling {} connections",
                    server.tracker.active_connections()
                );
                connections.abort_all();
            }
        }

        while connections.join_next().await.is_some() {}

        tracing::info!("Server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<(), hyper::Error> {
        self.root
            .notify(Stage::ConnectionOpened, &StageContext::for_connection(Some(peer)));

        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |req: http::Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.process(req, Some(peer)).await) }
        });

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.request_timeout())
            .keep_alive(self.config.keep_alive());

        let conn = builder.serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = self.shutdown.wait() => {
                tracing::debug!(peer = %peer, "Draining connection for shutdown");
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    /// Runs one request through its lifecycle and produces the response.
    ///
    /// Transport-independent so it can be driven with any body type. The
    /// returned body carries the exchange, so `Finished` fires only once the
    /// body has been read to the end.
    pub async fn process<B>(&self, req: http::Request<B>, peer: Option<SocketAddr>) -> HttpResponse
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: std::fmt::Display,
    {
        let (parts, mut body) = req.into_parts();
        let mut exchange = Exchange::begin(
            Arc::clone(&self.root),
            Request::from_parts(&parts, peer),
            self.shutdown.clone(),
        );

        let mut response = Response::new();
        if !exchange.authorize(&mut response) {
            let reply = if response.has_started() {
                into_http_response(response)
            } else {
                error_response(StatusCode::FORBIDDEN, "ACCESS_DENIED", "Access denied")
            };
            return exchange.finish(reply);
        }

        let deadline = self.config.request_timeout();
        let limit = self.config.max_body_bytes();
        let received =
            tokio::time::timeout(deadline, read_body(&mut exchange, &mut body, limit)).await;

        match received {
            Ok(Ok(bytes)) => exchange.complete(bytes),
            Ok(Err(BodyError::TooLarge)) => {
                return exchange.fail(
                    Stage::Aborted,
                    error_response(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "PAYLOAD_TOO_LARGE",
                        &format!("Request body exceeds {limit} bytes"),
                    ),
                );
            }
            Ok(Err(BodyError::Transport(reason))) => {
                return exchange.fail(
                    Stage::Aborted,
                    error_response(
                        StatusCode::BAD_REQUEST,
                        "BODY_READ_ERROR",
                        &format!("Failed to read request body: {reason}"),
                    ),
                );
            }
            Err(_) => {
                return exchange.fail(
                    Stage::TimedOut,
                    error_response(
                        StatusCode::REQUEST_TIMEOUT,
                        "REQUEST_TIMEOUT",
                        "Request body collection timed out",
                    ),
                );
            }
        }

        let request = exchange.request().clone();
        let root = Arc::clone(&self.root);
        let capacity = self.config.diagnostic_capacity();
        let task = tokio::task::spawn_blocking(move || {
            let mut diagnostics = DiagnosticBuffer::with_capacity(capacity);
            let result = root.service(&request, &mut response, &mut diagnostics);
            (result, response)
        });

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok((Ok(()), response))) => exchange.finish(into_http_response(response)),
            Ok(Ok((Err(err), _))) => {
                switchyard_telemetry::log_request_error!(exchange.request().id(), err);
                exchange.finish(error_response(
                    err.status_code(),
                    err.code(),
                    "Request handler failed",
                ))
            }
            Ok(Err(join_error)) => {
                tracing::error!(
                    request_id = %exchange.request().id(),
                    panicked = join_error.is_panic(),
                    "Request handler did not return"
                );
                exchange.finish(error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "HANDLER_PANIC",
                    "Request handler failed",
                ))
            }
            Err(_) => exchange.fail(
                Stage::TimedOut,
                error_response(
                    StatusCode::GATEWAY_TIMEOUT,
                    "HANDLER_TIMEOUT",
                    "Handler execution timed out",
                ),
            ),
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("active_connections", &self.tracker.active_connections())
            .finish_non_exhaustive()
    }
}

enum BodyError {
    TooLarge,
    Transport(String),
}

/// Reads the body frame by frame, firing `BodyReceived` per data frame.
async fn read_body<B>(
    exchange: &mut Exchange,
    body: &mut B,
    limit: usize,
) -> Result<Bytes, BodyError>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let limit_u64 = u64::try_from(limit).unwrap_or(u64::MAX);
    if exchange
        .request()
        .content_length()
        .is_some_and(|declared| declared > limit_u64)
    {
        return Err(BodyError::TooLarge);
    }

    let mut buffer = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| BodyError::Transport(e.to_string()))?;
        let Ok(data) = frame.into_data() else {
            continue;
        };
        if data.is_empty() {
            continue;
        }
        if buffer.len() + data.len() > limit {
            return Err(BodyError::TooLarge);
        }
        exchange.receive_chunk(&data);
        buffer.extend_from_slice(&data);
    }
    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use http::Method;
    use http_body_util::Full;
    use hyper::body::Frame;

    use crate::exchange::RESPONSE_CHUNK_SIZE;
    use switchyard_core::fixtures::{
        DenyingHandler, FailingHandler, PanickingHandler, RecordingObserver, TextHandler,
    };
    use switchyard_core::HandlerResult;
    use switchyard_router::{PrefixRouter, PrefixRouterBuilder};

    /// A body that never yields a frame.
    struct StalledBody;

    impl Body for StalledBody {
        type Data = Bytes;
        type Error = Infallible;

        fn poll_frame(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
            Poll::Pending
        }
    }

    struct SleepingHandler(Duration);

    impl RequestHandler for SleepingHandler {
        fn service(
            &self,
            _request: &Request,
            response: &mut Response,
            _diagnostics: &mut DiagnosticBuffer,
        ) -> HandlerResult {
            std::thread::sleep(self.0);
            response.write("late", true)?;
            Ok(())
        }
    }

    fn server_with(
        observer: &RecordingObserver,
        config: ServerConfig,
        build: impl FnOnce(PrefixRouterBuilder) -> PrefixRouterBuilder,
    ) -> Server {
        let builder = PrefixRouter::builder(TextHandler::new("fallback"))
            .observer(observer.clone());
        Server::new(config, build(builder).build().unwrap())
    }

    fn request(method: Method, uri: &str, body: &'static str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn body_text(response: HttpResponse) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_server_run_invalid_address() {
        let server = Server::new(
            ServerConfig::builder().http_addr("not-a-valid-address").build(),
            TextHandler::new("ok"),
        );

        let result = server.run_with_shutdown(ShutdownSignal::new()).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_server_run_and_shutdown() {
        let server = Server::new(
            ServerConfig::builder()
                .http_addr("127.0.0.1:0")
                .shutdown_timeout(Duration::from_millis(100))
                .build(),
            TextHandler::new("ok"),
        );

        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result =
            tokio::time::timeout(Duration::from_secs(5), server.run_with_shutdown(shutdown)).await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_process_routes_by_prefix() {
        let observer = RecordingObserver::new();
        let server = server_with(&observer, ServerConfig::default(), |b| {
            b.route("/dump", || TextHandler::new("dumped"))
        });

        let response = server.process(request(Method::POST, "/dump/x", "abc"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "dumped");

        assert_eq!(
            observer.stages(),
            vec![
                Stage::RequestIncoming,
                Stage::HeaderReceived,
                Stage::BodyReceived,
                Stage::Completed,
                Stage::Finished,
            ]
        );
        let ids: Vec<_> = observer.events().into_iter().map(|(_, id)| id).collect();
        assert!(ids.iter().all(|id| id.is_some() && *id == ids[0]));
    }

    #[tokio::test]
    async fn test_process_without_body_skips_body_received() {
        let observer = RecordingObserver::new();
        let server = server_with(&observer, ServerConfig::default(), |b| b);

        let response = server.process(request(Method::GET, "/", ""), None).await;
        assert_eq!(body_text(response).await, "fallback");
        assert_eq!(observer.count(Stage::BodyReceived), 0);
        assert_eq!(observer.count(Stage::Completed), 1);
    }

    #[tokio::test]
    async fn test_denied_request_gets_default_403() {
        let observer = RecordingObserver::new();
        let server = server_with(&observer, ServerConfig::default(), |b| {
            b.authorizer(|req| !req.path().starts_with("/session"))
        });

        let response = server.process(request(Method::POST, "/session", "data"), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_text(response).await.contains("ACCESS_DENIED"));

        assert_eq!(observer.count(Stage::AccessDenied), 1);
        assert_eq!(observer.count(Stage::BodyReceived), 0);
        assert_eq!(observer.count(Stage::Completed), 0);
        assert_eq!(observer.stages().last(), Some(&Stage::Finished));
    }

    #[tokio::test]
    async fn test_denial_keeps_handler_written_response() {
        let server = Server::new(ServerConfig::default(), DenyingHandler);

        let response = server.process(request(Method::GET, "/", ""), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(response).await, "403 forbidden");
    }

    #[tokio::test]
    async fn test_body_over_limit_is_aborted() {
        let observer = RecordingObserver::new();
        let config = ServerConfig::builder().max_body_bytes(4).build();
        let server = server_with(&observer, config, |b| b);

        let response = server.process(request(Method::POST, "/", "too long"), None).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(observer.count(Stage::Aborted), 1);
        assert_eq!(observer.count(Stage::Completed), 0);
        assert_eq!(observer.count(Stage::Finished), 0);
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let observer = RecordingObserver::new();
        let config = ServerConfig::builder()
            .request_timeout(Duration::from_millis(50))
            .build();
        let server = server_with(&observer, config, |b| b);

        let req = http::Request::builder()
            .method(Method::POST)
            .uri("/form")
            .body(StalledBody)
            .unwrap();
        let response = server.process(req, None).await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(observer.count(Stage::TimedOut), 1);
        assert_eq!(observer.count(Stage::Aborted), 0);
        assert_eq!(observer.count(Stage::Finished), 0);
    }

    #[tokio::test]
    async fn test_slow_handler_times_out() {
        let observer = RecordingObserver::new();
        let config = ServerConfig::builder()
            .request_timeout(Duration::from_millis(50))
            .build();
        let server = server_with(&observer, config, |b| {
            b.route("/slow", || SleepingHandler(Duration::from_millis(300)))
        });

        let response = server.process(request(Method::GET, "/slow", ""), None).await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(observer.count(Stage::Completed), 1);
        assert_eq!(observer.count(Stage::TimedOut), 1);
        assert_eq!(observer.count(Stage::Finished), 0);
    }

    #[tokio::test]
    async fn test_handler_fault_becomes_500() {
        let observer = RecordingObserver::new();
        let server = server_with(&observer, ServerConfig::default(), |b| {
            b.route("/fail", || FailingHandler)
        });

        let response = server.process(request(Method::GET, "/fail", ""), None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("HANDLER_FAULT"));
        assert_eq!(observer.count(Stage::Finished), 1);
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_500() {
        let observer = RecordingObserver::new();
        let server = server_with(&observer, ServerConfig::default(), |b| {
            b.route("/panic", || PanickingHandler)
        });

        let response = server.process(request(Method::GET, "/panic", ""), None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("HANDLER_PANIC"));
        assert_eq!(observer.count(Stage::Finished), 1);
    }

    #[tokio::test]
    async fn test_unread_response_fires_aborted() {
        let observer = RecordingObserver::new();
        let server = server_with(&observer, ServerConfig::default(), |b| {
            b.route("/bulk", || TextHandler::new("x".repeat(RESPONSE_CHUNK_SIZE * 3)))
        });

        let response = server.process(request(Method::GET, "/bulk", ""), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(observer.count(Stage::Completed), 1);
        assert_eq!(observer.count(Stage::Finished), 0);

        let mut body = response.into_body();
        body.frame().await.unwrap().unwrap();
        drop(body);

        assert_eq!(observer.count(Stage::Aborted), 1);
        assert_eq!(observer.count(Stage::Finished), 0);
    }

    #[tokio::test]
    async fn test_head_request_finishes_without_body() {
        let observer = RecordingObserver::new();
        let server = server_with(&observer, ServerConfig::default(), |b| b);

        let response = server.process(request(Method::HEAD, "/", ""), None).await;
        assert_eq!(observer.count(Stage::Finished), 1);
        drop(response);
        assert_eq!(observer.count(Stage::Aborted), 0);
    }

    #[tokio::test]
    async fn test_dropped_request_fires_aborted() {
        let observer = RecordingObserver::new();
        let server = server_with(&observer, ServerConfig::default(), |b| b);

        let req = http::Request::builder()
            .method(Method::POST)
            .uri("/form")
            .body(StalledBody)
            .unwrap();
        let pending = server.process(req, None);
        let result = tokio::time::timeout(Duration::from_millis(20), pending).await;
        assert!(result.is_err());

        assert_eq!(observer.count(Stage::Aborted), 1);
        assert_eq!(observer.count(Stage::Expired), 0);
    }

    #[tokio::test]
    async fn test_dropped_request_during_shutdown_fires_expired() {
        let observer = RecordingObserver::new();
        let mut server = server_with(&observer, ServerConfig::default(), |b| b);
        let shutdown = ShutdownSignal::new();
        server.shutdown = shutdown.clone();

        let req = http::Request::builder()
            .method(Method::POST)
            .uri("/form")
            .body(StalledBody)
            .unwrap();
        let mut pending = Box::pin(server.process(req, None));
        let first = tokio::time::timeout(Duration::from_millis(20), pending.as_mut()).await;
        assert!(first.is_err());

        shutdown.trigger();
        drop(pending);

        assert_eq!(observer.count(Stage::Expired), 1);
        assert_eq!(observer.count(Stage::Aborted), 0);
    }
}
