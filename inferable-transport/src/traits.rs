//! Transport trait and the request/response types that cross it.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::RETRY_AFTER;
use hyper::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

/// Result alias used by transports.
pub type TransportResult<T> = Result<T, TransportError>;

/// Error type shared by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transport is misconfigured (bad endpoint, missing credentials).
    #[error("transport not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// The request could not be assembled.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Reason describing why the request could not be built.
        reason: String,
    },

    /// Connection-level failure: DNS, connect, TLS or timeout.
    #[error("transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The server answered with a 4xx or 5xx status.
    #[error("API error: {body} (status code: {status})")]
    Status {
        /// HTTP status returned by the server.
        status: StatusCode,
        /// Response body, decoded lossily as UTF-8.
        body: String,
    },

    /// The response body could not be read or decoded.
    #[error("response error: {reason}")]
    Response {
        /// Additional context about the response failure.
        reason: String,
    },
}

impl TransportError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for invalid requests.
    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for connection failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for unreadable responses.
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }

    /// Returns the HTTP status if the server answered with an error status.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Description of a single outbound request.
#[derive(Clone, Debug)]
pub struct FetchRequest {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl FetchRequest {
    /// Creates a request for the given method and endpoint-relative path.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a `POST` request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `payload` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] if the payload cannot be
    /// encoded.
    pub fn with_json<T: Serialize + ?Sized>(self, payload: &T) -> TransportResult<Self> {
        let body = serde_json::to_vec(payload).map_err(|err| {
            TransportError::invalid_request(format!("failed to encode request body: {err}"))
        })?;
        Ok(self.with_body(body))
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the endpoint-relative path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the extra headers in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the value of the first header matching `name`, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the query parameters in insertion order.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Returns the value of the first query parameter named `key`.
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

/// A successful (non-error status) response.
#[derive(Clone, Debug)]
pub struct FetchResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl FetchResponse {
    /// Creates a response from its parts.
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Creates a `200 OK` response with a JSON body and no headers.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] if the payload cannot be
    /// encoded.
    pub fn json_ok<T: Serialize + ?Sized>(payload: &T) -> TransportResult<Self> {
        let body = serde_json::to_vec(payload).map_err(|err| {
            TransportError::invalid_request(format!("failed to encode response body: {err}"))
        })?;
        Ok(Self::new(StatusCode::OK, HeaderMap::new(), body))
    }

    /// Returns the HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns mutable access to the response headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Returns the raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Response`] if the body is not valid JSON for
    /// `T`.
    pub fn json<T: DeserializeOwned>(&self) -> TransportResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|err| TransportError::response(format!("failed to decode body: {err}")))
    }

    /// Parses the `Retry-After` header as a whole number of seconds.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get_all(RETRY_AFTER)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.trim().parse::<u64>().ok())
            .last()
            .map(Duration::from_secs)
    }
}

/// Joins `segments` into an absolute request path, percent-encoding each one
/// so ids containing `/`, `?` or `#` stay inside their segment.
///
/// # Errors
///
/// Returns [`TransportError::InvalidRequest`] if the path cannot be built.
pub fn path_from_segments<'a, I>(segments: I) -> TransportResult<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut url = Url::parse("http://control-plane.invalid/")
        .map_err(|err| TransportError::invalid_request(format!("invalid path base: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| TransportError::invalid_request("path base cannot have segments"))?
        .clear()
        .extend(segments);
    Ok(url.path().to_owned())
}

/// Issues authenticated requests against the control plane.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request`, returning the response for 1xx-3xx statuses.
    ///
    /// 4xx/5xx answers are reported as [`TransportError::Status`], connection
    /// problems as [`TransportError::Transport`].
    async fn fetch(&self, request: FetchRequest) -> TransportResult<FetchResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    #[test]
    fn request_builder_collects_parts() {
        let request = FetchRequest::get("/clusters/c1/calls")
            .with_header("X-Machine-ID", "m1")
            .with_query("limit", "10")
            .with_query("status", "pending");

        assert_eq!(*request.method(), Method::GET);
        assert_eq!(request.header("x-machine-id"), Some("m1"));
        assert_eq!(request.query_param("limit"), Some("10"));
        assert!(request.body().is_none());
    }

    #[test]
    fn json_body_is_encoded() {
        let request = FetchRequest::post("/v2/ping")
            .with_json(&serde_json::json!({ "services": ["default"] }))
            .unwrap();
        assert_eq!(request.body(), Some(&br#"{"services":["default"]}"#[..]));
    }

    #[test]
    fn retry_after_parses_seconds() {
        let mut response = FetchResponse::json_ok(&serde_json::json!([])).unwrap();
        assert_eq!(response.retry_after(), None);

        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(response.retry_after(), Some(Duration::from_secs(7)));

        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(response.retry_after(), None);
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        assert_eq!(
            path_from_segments(["clusters", "c1", "calls"]).unwrap(),
            "/clusters/c1/calls"
        );
        assert_eq!(
            path_from_segments(["clusters", "c1", "calls", "a?b#c", "result"]).unwrap(),
            "/clusters/c1/calls/a%3Fb%23c/result"
        );
        assert_eq!(
            path_from_segments(["calls", "x/y z"]).unwrap(),
            "/calls/x%2Fy%20z"
        );
    }

    #[test]
    fn json_decode_failure_is_response_error() {
        let response = FetchResponse::new(StatusCode::OK, HeaderMap::new(), "not json");
        let err = response
            .json::<serde_json::Value>()
            .expect_err("invalid JSON should fail");
        assert!(matches!(err, TransportError::Response { .. }));
    }
}
