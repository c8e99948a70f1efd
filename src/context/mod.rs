//! Per-request context handed to every handler.
//!
//! A [`Context`] is created once per inbound request by the dispatcher and
//! owned by it for the lifetime of that call. Handlers read the request
//! through it and shape the response by mutating its [`ResponseHead`].

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::http::form::{self, UploadedFile};
use crate::http::{Headers, Method, Request, StatusCode};

/// A named request value whose shape depends on where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    Text(&'a str),
    File(&'a UploadedFile),
    Missing,
}

impl<'a> Value<'a> {
    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            Value::Text(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&'a UploadedFile> {
        match self {
            Value::File(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

/// Path parameters captured by the matched route.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Status and headers of the response being built.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: Headers,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: StatusCode::NotFound,
            headers: Headers::new(),
        }
    }
}

/// Per-request state: the parsed request, decoded inputs, path parameters
/// and the response head.
#[derive(Debug)]
pub struct Context {
    request: Request,
    peer: SocketAddr,
    form: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
    params: Parameters,
    response: ResponseHead,
}

impl Context {
    /// Builds the context for `request`, decoding its body by content type.
    ///
    /// For repeated names the first value wins, for fields and files alike.
    pub fn new(request: Request, peer: SocketAddr) -> Self {
        let decoded = form::parse_body(request.headers().get("content-type"), request.body());

        let mut form = HashMap::new();
        for (key, value) in decoded.fields {
            form.entry(key).or_insert(value);
        }
        let mut files = HashMap::new();
        for (key, file) in decoded.files {
            files.entry(key).or_insert(file);
        }

        Self {
            request,
            peer,
            form,
            files,
            params: Parameters::new(),
            response: ResponseHead::default(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Client address as seen by the transport.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name)
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Shorthand for `params().get(name)`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub(crate) fn set_params(&mut self, params: Parameters) {
        self.params = params;
    }

    /// A query string value.
    pub fn query(&self, name: &str) -> Value<'_> {
        match self.request.query_params().get(name) {
            Some(v) => Value::Text(v.as_str()),
            None => Value::Missing,
        }
    }

    /// A value from a urlencoded or multipart body.
    pub fn post(&self, name: &str) -> Value<'_> {
        match self.form.get(name) {
            Some(v) => Value::Text(v.as_str()),
            None => Value::Missing,
        }
    }

    /// An uploaded file from a multipart body.
    pub fn file(&self, name: &str) -> Value<'_> {
        match self.files.get(name) {
            Some(f) => Value::File(f),
            None => Value::Missing,
        }
    }

    /// Looks in the body first, then the query string.
    pub fn input(&self, name: &str) -> Value<'_> {
        match self.post(name) {
            Value::Missing => self.query(name),
            found => found,
        }
    }

    /// Deserializes the raw request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }

    pub fn response(&self) -> &ResponseHead {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseHead {
        &mut self.response
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.response.status = status;
    }

    /// Sets a response header, replacing earlier values of the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.response.headers.set(name, value);
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.set_header("Content-Type", content_type);
    }
}
