//! Inbound request model.
//!
//! A [`Request`] is produced by the transport once the start line and headers
//! have been parsed. The router only ever reads [`Request::path`]; every other
//! field exists so lifecycle observers can correlate and describe traffic.

use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{HeaderName, CONTENT_LENGTH};
use http::{HeaderMap, HeaderValue, Method, Version};
use serde::{Deserialize, Serialize};

use crate::context::RequestId;

/// Parsing progress of an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting for the start line.
    WaitingForRequest,
    /// Start line parsed, headers still arriving.
    WaitingForHeader,
    /// Headers parsed, body still arriving.
    WaitingForBody,
    /// Request fully received.
    Complete,
    /// Receiving was abandoned.
    Aborted,
}

impl RequestStatus {
    /// Returns the numeric code used in log lines.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::WaitingForRequest => 0,
            Self::WaitingForHeader => 1,
            Self::WaitingForBody => 2,
            Self::Complete => 3,
            Self::Aborted => 4,
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::WaitingForRequest => "waiting_for_request",
            Self::WaitingForHeader => "waiting_for_header",
            Self::WaitingForBody => "waiting_for_body",
            Self::Complete => "complete",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// An inbound HTTP request.
///
/// Cloning is cheap: the body is reference counted.
///
/// # Example
///
/// ```
/// use switchyard_core::Request;
/// use http::Method;
///
/// let request = Request::builder()
///     .method(Method::POST)
///     .path("/form/submit")
///     .header("content-length", "11")
///     .body("hello=world")
///     .build();
///
/// assert_eq!(request.path(), "/form/submit");
/// assert_eq!(request.content_length(), Some(11));
/// assert_eq!(request.received_bytes(), 11);
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    id: RequestId,
    method: Method,
    path: String,
    query: Option<String>,
    version: Version,
    headers: HeaderMap,
    peer_addr: Option<SocketAddr>,
    status: RequestStatus,
    received_bytes: u64,
    body: Bytes,
}

impl Request {
    /// Creates a request whose headers have been parsed but whose body has not.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: RequestId::new(),
            method,
            path: path.into(),
            query: None,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            peer_addr: None,
            status: RequestStatus::WaitingForBody,
            received_bytes: 0,
            body: Bytes::new(),
        }
    }

    /// Creates a request builder.
    #[must_use]
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    /// Builds a request from transport-level parts.
    ///
    /// The body is left empty; the transport feeds it in with
    /// [`record_received`](Self::record_received) and [`set_body`](Self::set_body).
    #[must_use]
    pub fn from_parts(parts: &http::request::Parts, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id: RequestId::new(),
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            version: parts.version,
            headers: parts.headers.clone(),
            peer_addr,
            status: RequestStatus::WaitingForBody,
            received_bytes: 0,
            body: Bytes::new(),
        }
    }

    /// Returns the stable identity of this request.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the raw path, exactly as received.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the HTTP version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns all headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the declared `content-length`, if present and numeric.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// Returns the peer address, if known.
    #[must_use]
    pub const fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Returns the parsing status.
    #[must_use]
    pub const fn status(&self) -> RequestStatus {
        self.status
    }

    /// Updates the parsing status.
    pub fn set_status(&mut self, status: RequestStatus) {
        self.status = status;
    }

    /// Returns the number of body bytes received so far.
    #[must_use]
    pub const fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    /// Adds `len` bytes to the received-body counter.
    pub fn record_received(&mut self, len: usize) {
        self.received_bytes = self.received_bytes.saturating_add(len as u64);
    }

    /// Returns the buffered body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Stores the fully received body.
    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }
}

/// Builder for [`Request`], mostly useful in tests and adapters.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    path: String,
    query: Option<String>,
    version: Version,
    headers: HeaderMap,
    peer_addr: Option<SocketAddr>,
    status: Option<RequestStatus>,
    body: Bytes,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            query: None,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            peer_addr: None,
            status: None,
            body: Bytes::new(),
        }
    }
}

impl RequestBuilder {
    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the query string.
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Sets the HTTP version.
    #[must_use]
    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Adds a header. Invalid names or values are skipped.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the peer address.
    #[must_use]
    pub fn peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    /// Overrides the parsing status.
    #[must_use]
    pub fn status(mut self, status: RequestStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets a fully received body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Builds the request.
    ///
    /// A request built with a body is considered complete.
    #[must_use]
    pub fn build(self) -> Request {
        let received_bytes = self.body.len() as u64;
        let status = self.status.unwrap_or(RequestStatus::Complete);
        Request {
            id: RequestId::new(),
            method: self.method,
            path: self.path,
            query: self.query,
            version: self.version,
            headers: self.headers,
            peer_addr: self.peer_addr,
            status,
            received_bytes,
            body: self.body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_new_defaults() {
        let request = Request::new(Method::GET, "/dump");
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.path(), "/dump");
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.status(), RequestStatus::WaitingForBody);
        assert_eq!(request.received_bytes(), 0);
        assert!(request.peer_addr().is_none());
        assert!(request.body().is_empty());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = Request::new(Method::GET, "/");
        let b = Request::new(Method::GET, "/");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_content_length_parsing() {
        let request = Request::builder().header("Content-Length", " 42 ").build();
        assert_eq!(request.content_length(), Some(42));

        let request = Request::builder().header("content-length", "abc").build();
        assert_eq!(request.content_length(), None);

        let request = Request::builder().build();
        assert_eq!(request.content_length(), None);
    }

    #[test]
    fn test_record_received_accumulates() {
        let mut request = Request::new(Method::POST, "/file");
        request.record_received(10);
        request.record_received(5);
        assert_eq!(request.received_bytes(), 15);
    }

    #[test]
    fn test_from_parts_keeps_path_and_query() {
        let (parts, ()) = http::Request::builder()
            .method(Method::PUT)
            .uri("/session/start?user=7")
            .header("x-trace", "abc")
            .body(())
            .expect("valid request")
            .into_parts();

        let peer: SocketAddr = "10.0.0.1:5555".parse().expect("valid addr");
        let request = Request::from_parts(&parts, Some(peer));

        assert_eq!(request.method(), Method::PUT);
        assert_eq!(request.path(), "/session/start");
        assert_eq!(request.query(), Some("user=7"));
        assert_eq!(request.header("x-trace"), Some("abc"));
        assert_eq!(request.peer_addr(), Some(peer));
        assert_eq!(request.status(), RequestStatus::WaitingForBody);
    }

    #[test]
    fn test_builder_body_marks_complete() {
        let request = Request::builder().body("abc").build();
        assert_eq!(request.status(), RequestStatus::Complete);
        assert_eq!(request.received_bytes(), 3);
        assert_eq!(request.body().as_ref(), b"abc");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RequestStatus::WaitingForRequest.code(), 0);
        assert_eq!(RequestStatus::Complete.code(), 3);
        assert_eq!(RequestStatus::Aborted.to_string(), "aborted");
    }
}
