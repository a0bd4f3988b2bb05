//! Request descriptors and the builder that produces them.
//!
//! # Design
//! `RequestBuilder` is consumed by every setter and frozen by `build()`, so a
//! `Request` handed to a dispatcher can no longer be changed by the caller.
//! Nothing is validated here: a bad host, port or target only shows up as a
//! submission failure, because the transport is the one that knows what it
//! accepts.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use indexmap::IndexMap;

use crate::completion::Completion;
use crate::error::UnknownMethod;

/// Content type every new request starts with.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    Get,
    #[default]
    Post,
    Head,
    Put,
    Delete,
    Options,
    Trace,
    Connect,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Patch => "PATCH",
        }
    }

    /// Methods that announce a `Content-Length` even when the body is empty.
    pub fn expects_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "HEAD" => Method::Head,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            "PATCH" => Method::Patch,
            other => return Err(UnknownMethod(other.to_string())),
        })
    }
}

/// Header map that keeps insertion order and holds each name once.
///
/// Names compare ASCII case-insensitively. Inserting an existing name keeps
/// its position and replaces both the spelling and the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: IndexMap<String, (String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or override a header, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        self.entries
            .insert(key, (name, value.into()))
            .map(|(_, previous)| previous)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Remove a header; the remaining entries keep their order.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .shift_remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

/// Callback run once when a submitted request reaches a terminal state.
pub type CompletionHandler = Box<dyn FnOnce(Completion) + 'static>;

/// A frozen request description.
///
/// Built with `Request::builder()`. Ownership moves into the dispatcher on
/// submission and the request is released there, whatever the outcome.
pub struct Request {
    method: Method,
    host: String,
    port: u16,
    target: String,
    headers: Headers,
    body: Bytes,
    timeout_secs: u32,
    close_after_complete: bool,
    handler: Option<CompletionHandler>,
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::default()
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path and query string, exactly as configured.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn timeout_secs(&self) -> u32 {
        self.timeout_secs
    }

    /// `None` when the timeout is 0, leaving the choice to the reactor.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(u64::from(secs))),
        }
    }

    pub fn close_after_complete(&self) -> bool {
        self.close_after_complete
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub(crate) fn take_handler(&mut self) -> Option<CompletionHandler> {
        self.handler.take()
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("target", &self.target)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("timeout_secs", &self.timeout_secs)
            .field("close_after_complete", &self.close_after_complete)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Fluent, by-value builder for `Request`.
///
/// Defaults: `POST`, empty target, `Content-Type:
/// application/json;charset=UTF-8`, no body, timeout 0 and
/// `close_after_complete = true`.
#[must_use]
pub struct RequestBuilder {
    request: Request,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        let mut headers = Headers::new();
        headers.insert("Content-Type", DEFAULT_CONTENT_TYPE);
        Self {
            request: Request {
                method: Method::default(),
                host: String::new(),
                port: 0,
                target: String::new(),
                headers,
                body: Bytes::new(),
                timeout_secs: 0,
                close_after_complete: true,
                handler: None,
            },
        }
    }
}

impl RequestBuilder {
    pub fn remote(mut self, host: impl Into<String>, port: u16) -> Self {
        self.request.host = host.into();
        self.request.port = port;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.request.method = method;
        self
    }

    /// Request target: path plus optional query string.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.request.target = target.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.insert(name, value);
        self
    }

    /// Body bytes, written verbatim. An empty body is not sent.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Connection timeout in seconds; 0 defers to the reactor.
    pub fn timeout_secs(mut self, secs: u32) -> Self {
        self.request.timeout_secs = secs;
        self
    }

    /// Send `Connection: close` so the transport never tries to reuse the
    /// connection.
    pub fn close_after_complete(mut self, close: bool) -> Self {
        self.request.close_after_complete = close;
        self
    }

    pub fn on_complete<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(Completion) + 'static,
    {
        self.request.handler = Some(Box::new(handler));
        self
    }

    /// Register a handler that only wants the response body, which is empty
    /// when no response arrived.
    pub fn on_body<F>(self, handler: F) -> Self
    where
        F: FnOnce(Bytes) + 'static,
    {
        self.on_complete(move |completion| handler(completion.into_body()))
    }

    pub fn build(self) -> Request {
        self.request
    }
}
