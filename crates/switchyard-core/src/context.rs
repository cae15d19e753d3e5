//! Request identity and lifecycle notification context.
//!
//! The [`StageContext`] is what every lifecycle notification receives. It
//! wraps an optional [`Request`] so observers can correlate log lines across
//! stages, and degrades to a context-free notification when no request has
//! been framed yet (for example when a connection was just accepted).

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::request::{Request, RequestStatus};

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for log correlation.
///
/// # Example
///
/// ```
/// use switchyard_core::RequestId;
///
/// let id = RequestId::new();
/// println!("Request ID: {}", id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifying context handed to every lifecycle notification.
///
/// # Example
///
/// ```
/// use switchyard_core::{Request, StageContext};
/// use http::Method;
///
/// let request = Request::new(Method::GET, "/dump");
/// let ctx = StageContext::for_request(&request);
/// assert_eq!(ctx.request_id(), Some(request.id()));
///
/// let detached = StageContext::detached();
/// assert!(detached.request().is_none());
/// assert_eq!(detached.received_bytes(), 0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    request: Option<&'a Request>,
    peer_addr: Option<SocketAddr>,
}

impl<'a> StageContext<'a> {
    /// Context for a framed request.
    #[must_use]
    pub fn for_request(request: &'a Request) -> Self {
        Self {
            request: Some(request),
            peer_addr: request.peer_addr(),
        }
    }

    /// Context for a connection on which no request has been framed yet.
    #[must_use]
    pub const fn for_connection(peer_addr: Option<SocketAddr>) -> Self {
        Self {
            request: None,
            peer_addr,
        }
    }

    /// Context carrying no information at all.
    #[must_use]
    pub const fn detached() -> Self {
        Self {
            request: None,
            peer_addr: None,
        }
    }

    /// Returns the request, if one has been framed.
    #[must_use]
    pub const fn request(&self) -> Option<&'a Request> {
        self.request
    }

    /// Returns the stable request identity.
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        self.request.map(Request::id)
    }

    /// Returns the peer address.
    #[must_use]
    pub const fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> Option<&'a str> {
        self.request.map(Request::path)
    }

    /// Returns the current parsing status.
    #[must_use]
    pub fn status(&self) -> Option<RequestStatus> {
        self.request.map(Request::status)
    }

    /// Returns the body bytes received so far (zero without a request).
    #[must_use]
    pub fn received_bytes(&self) -> u64 {
        self.request.map_or(0, Request::received_bytes)
    }

    /// Returns the declared content length.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.request.and_then(Request::content_length)
    }
}
