//! Outbound response sink.
//!
//! Handlers write a [`Response`] once, logically: status and headers first,
//! then one or more body parts, the last of which finishes the response.
//! The router never touches it.

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

use crate::error::ResponseError;

/// An outbound HTTP response being assembled by a handler.
///
/// # Example
///
/// ```
/// use switchyard_core::Response;
/// use http::StatusCode;
///
/// let mut response = Response::new();
/// response.set_status(StatusCode::CREATED, "created").unwrap();
/// response.set_header("content-type", "text/plain").unwrap();
/// response.write("hello", true).unwrap();
///
/// assert!(response.is_finished());
/// assert!(response.write("again", true).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    body: BytesMut,
    started: bool,
    finished: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// Creates an empty `200 OK` response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            reason: None,
            headers: HeaderMap::new(),
            body: BytesMut::new(),
            started: false,
            finished: false,
        }
    }

    /// Returns the status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the custom reason phrase, if one was set.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Sets the status code and reason phrase.
    pub fn set_status(
        &mut self,
        status: StatusCode,
        reason: impl Into<String>,
    ) -> Result<(), ResponseError> {
        if self.started {
            return Err(ResponseError::HeadersSent { what: "status" });
        }
        self.status = status;
        self.reason = Some(reason.into());
        Ok(())
    }

    /// Returns all headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Sets (replaces) a header.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ResponseError> {
        if self.started {
            return Err(ResponseError::HeadersSent { what: "headers" });
        }
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| ResponseError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| ResponseError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    /// Appends body bytes. `last_part` finishes the response.
    pub fn write(&mut self, data: impl AsRef<[u8]>, last_part: bool) -> Result<(), ResponseError> {
        if self.finished {
            return Err(ResponseError::AlreadyFinished);
        }
        self.started = true;
        self.body.extend_from_slice(data.as_ref());
        if last_part {
            self.finished = true;
        }
        Ok(())
    }

    /// Returns `true` once any body bytes (or an empty last part) were written.
    #[must_use]
    pub const fn has_started(&self) -> bool {
        self.started
    }

    /// Returns `true` once the last part was written.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns the body written so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Marks the response finished without writing more data.
    pub fn finish(&mut self) {
        self.started = true;
        self.finished = true;
    }

    /// Consumes the response into status, headers and body.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body.freeze())
    }
}
