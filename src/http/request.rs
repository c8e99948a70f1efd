//! HTTP/1.x request parsing using the [`httparse`] crate.

use std::collections::HashMap;

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method, form};

/// Errors that can occur while parsing an HTTP/1.x request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// A parsed HTTP/1.x request as it came off the wire.
///
/// The dispatcher wraps it in a [`Context`](crate::context::Context) together
/// with decoded form values and path parameters.
///
/// # Examples
///
/// ```
/// use gaga::http::Request;
///
/// let raw = b"GET /users/7?tab=posts HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.path(), "/users/7");
/// assert_eq!(request.uri(), "/users/7?tab=posts");
/// assert_eq!(request.query_param("tab"), Some("posts"));
/// assert_eq!(request.protocol(), "HTTP/1.1");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    query: Option<String>,
    body: Bytes,
    params: HashMap<String, String>,
}

impl Request {
    const MAX_HEADERS: usize = 64;

    /// Parses a request from `buf`.
    ///
    /// Returns the request and the offset at which its body starts. Every byte
    /// after the head is copied in as body; trim it to `Content-Length` with
    /// [`Request::with_body_len`].
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the head is not fully buffered yet.
    /// - [`RequestError::Parse`] — the head is malformed.
    /// - [`RequestError::MissingField`] — method, path or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let (request, body_offset) = Self::parse_head(buf)?;
        let body = Bytes::copy_from_slice(&buf[body_offset..]);
        Ok((request.with_body(body), body_offset))
    }

    /// Like [`Request::parse`] but leaves the body empty, so the caller can
    /// attach it with [`Request::with_body`] without copying.
    pub fn parse_head(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw_req.method {
            Some(m) => m.parse::<Method>().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let mut params = HashMap::new();
        if let Some(query) = query.as_deref() {
            for (key, value) in form::parse_urlencoded(query) {
                params.entry(key).or_insert(value);
            }
        }

        Ok((
            Self {
                method,
                path,
                version,
                headers: header_map,
                query,
                body: Bytes::new(),
                params,
            },
            body_offset,
        ))
    }

    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Keeps only the first `len` body bytes.
    #[must_use]
    pub fn with_body_len(mut self, len: usize) -> Self {
        self.body.truncate(len);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The request target exactly as sent: path plus `?query` when present.
    pub fn uri(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Protocol string for the request line, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> &'static str {
        if self.version == 0 { "HTTP/1.0" } else { "HTTP/1.1" }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the first decoded value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub(crate) fn query_params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// HTTP/1.1 defaults to keep-alive, HTTP/1.0 to close.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/");
        assert_eq!(req.uri(), "/");
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let raw = b"GET /search?q=hello%20world&tag=a+b&tag=c HTTP/1.1\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_param("q"), Some("hello world"));
        // the first occurrence wins
        assert_eq!(req.query_param("tag"), Some("a b"));
        assert_eq!(req.uri(), "/search?q=hello%20world&tag=a+b&tag=c");
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn http10_defaults_to_close() {
        let raw = b"GET / HTTP/1.0\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.protocol(), "HTTP/1.0");
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn body_is_trimmed_to_content_length() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloGET / HTTP/1.1\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        let len = req.content_length().unwrap();
        let req = req.with_body_len(len);
        assert_eq!(&req.body()[..], b"hello");
    }

    #[test]
    fn head_parse_leaves_body_to_the_caller() {
        let raw = b"POST /up HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc";
        let (req, offset) = Request::parse_head(raw).unwrap();
        assert!(req.body().is_empty());
        let req = req.with_body(Bytes::copy_from_slice(&raw[offset..]));
        assert_eq!(&req.body()[..], b"abc");
    }
}
