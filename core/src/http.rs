//! HTTP/1.1 wire types: the outgoing request and the raw response.
//!
//! # Design
//! `OutgoingRequest` is plain data derived from a `Request`: the caller's
//! headers in insertion order followed by the synthesized `Host`,
//! `Connection` and `Content-Length` headers. Reactors receive this value and
//! only need `validate()` and `encode()` to put it on the wire. Response
//! parsing is incremental so an event loop can call it after every read.

use bytes::{Bytes, BytesMut};

use crate::error::TransportError;
use crate::request::{Method, Request};

/// Maximum number of response headers accepted.
const MAX_RESPONSE_HEADERS: usize = 100;

/// A serialized-ready HTTP/1.1 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingRequest {
    pub method: Method,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl OutgoingRequest {
    /// Build the wire form of `request`.
    ///
    /// Caller headers named `Host` or `Content-Length`, and `Connection` when
    /// the request closes after completion, are replaced by the synthesized
    /// ones so no name appears twice.
    pub fn from_request(request: &Request) -> Self {
        let close = request.close_after_complete();
        let synthesized = |name: &str| {
            name.eq_ignore_ascii_case("host")
                || name.eq_ignore_ascii_case("content-length")
                || (close && name.eq_ignore_ascii_case("connection"))
        };

        let mut headers: Vec<(String, String)> = request
            .headers()
            .iter()
            .filter(|(name, _)| !synthesized(name))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        headers.push((
            "Host".to_string(),
            format!("{}:{}", request.host(), request.port()),
        ));
        if close {
            // Keep-alive reuse on one-shot connections is unreliable; ask the
            // server to close instead.
            headers.push(("Connection".to_string(), "close".to_string()));
        }

        let body = request.body().clone();
        if !body.is_empty() || request.method().expects_body() {
            headers.push(("Content-Length".to_string(), body.len().to_string()));
        }

        let target = if request.target().is_empty() {
            "/".to_string()
        } else {
            request.target().to_string()
        };

        Self {
            method: request.method(),
            target,
            headers,
            body,
        }
    }

    /// First header value matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Check that the request line and headers can be written verbatim.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.target.bytes().any(|b| b <= b' ' || b == 0x7f) {
            return Err(TransportError::InvalidTarget(self.target.clone()));
        }
        for (name, value) in &self.headers {
            if name.is_empty() || !name.bytes().all(is_token) {
                return Err(TransportError::InvalidHeader(name.clone()));
            }
            if value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0) {
                return Err(TransportError::InvalidHeader(name.clone()));
            }
        }
        Ok(())
    }

    /// Encode the request line, headers and raw body.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(256 + self.body.len());
        buf.extend_from_slice(self.method.as_str().as_bytes());
        buf.extend_from_slice(b" ");
        buf.extend_from_slice(self.target.as_bytes());
        buf.extend_from_slice(b" HTTP/1.1\r\n");
        for (name, value) in &self.headers {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(&self.body);
        buf
    }
}

fn is_token(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// A fully received HTTP response, as delivered by a reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// How the response body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

/// Parsed status line and headers.
#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// Bytes consumed by the status line and headers.
    pub len: usize,
    pub framing: Framing,
}

/// Parse a response head from `buf`. `Ok(None)` means more bytes are needed.
pub(crate) fn parse_head(buf: &[u8], method: Method) -> Result<Option<ResponseHead>, TransportError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
    let mut response = httparse::Response::new(&mut slots);
    let len = match response.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(err) => return Err(TransportError::Protocol(err.to_string())),
    };
    let status = response
        .code
        .ok_or_else(|| TransportError::Protocol("missing status code".to_string()))?;
    let headers: Vec<(String, String)> = response
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();

    let framing = framing(method, status, &headers)?;
    Ok(Some(ResponseHead {
        status,
        headers,
        len,
        framing,
    }))
}

fn framing(method: Method, status: u16, headers: &[(String, String)]) -> Result<Framing, TransportError> {
    if method == Method::Head || (100..200).contains(&status) || status == 204 || status == 304 {
        return Ok(Framing::Empty);
    }
    let find = |name: &str| {
        headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    };
    if let Some(encoding) = find("transfer-encoding") {
        if encoding.to_ascii_lowercase().contains("chunked") {
            return Ok(Framing::Chunked);
        }
    }
    content_length(headers).map(|len| len.map_or(Framing::UntilClose, Framing::Length))
}

/// The declared body length. Every `Content-Length` field must be plain
/// digits and all of them must agree.
fn content_length(headers: &[(String, String)]) -> Result<Option<usize>, TransportError> {
    let mut length = None;
    for (_, value) in headers
        .iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case("content-length"))
    {
        let digits = value.trim();
        let invalid = || TransportError::Protocol(format!("invalid content-length {value:?}"));
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let parsed: usize = digits.parse().map_err(|_| invalid())?;
        match length {
            Some(previous) if previous != parsed => {
                return Err(TransportError::Protocol(
                    "conflicting content-length headers".to_string(),
                ))
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length)
}

/// Incremental decoder for a chunked response body.
///
/// Complete chunks are consumed from the read buffer as they arrive, so
/// each byte is parsed once. Chunk sizes are checked against `limit` before
/// any arithmetic on them.
#[derive(Debug)]
pub(crate) struct ChunkedDecoder {
    body: BytesMut,
    limit: usize,
    in_trailers: bool,
}

impl ChunkedDecoder {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            body: BytesMut::new(),
            limit,
            in_trailers: false,
        }
    }

    /// Consume what can be decoded from `buf`. `Ok(Some(body))` once the last
    /// chunk and the trailer section are in; `Ok(None)` when more bytes are
    /// needed.
    pub(crate) fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, TransportError> {
        loop {
            if self.in_trailers {
                // Trailer fields are skipped up to the terminating empty line.
                match buf.windows(2).position(|w| w == b"\r\n") {
                    Some(0) => {
                        let _ = buf.split_to(2);
                        return Ok(Some(std::mem::take(&mut self.body).freeze()));
                    }
                    Some(end) => {
                        let _ = buf.split_to(end + 2);
                        continue;
                    }
                    None => return Ok(None),
                }
            }

            let (consumed, size) = match httparse::parse_chunk_size(buf) {
                Ok(httparse::Status::Complete(parsed)) => parsed,
                Ok(httparse::Status::Partial) => return Ok(None),
                Err(_) => return Err(TransportError::Protocol("invalid chunk size".to_string())),
            };
            if size == 0 {
                let _ = buf.split_to(consumed);
                self.in_trailers = true;
                continue;
            }

            let remaining = self.limit.saturating_sub(self.body.len());
            let size = usize::try_from(size)
                .ok()
                .filter(|size| *size <= remaining)
                .ok_or(TransportError::ResponseTooLarge { limit: self.limit })?;
            let end = consumed
                .checked_add(size)
                .and_then(|end| end.checked_add(2))
                .ok_or_else(|| TransportError::Protocol("chunk too large".to_string()))?;
            if buf.len() < end {
                return Ok(None);
            }
            if &buf[end - 2..end] != b"\r\n" {
                return Err(TransportError::Protocol("missing chunk terminator".to_string()));
            }
            let chunk = buf.split_to(end);
            self.body.extend_from_slice(&chunk[consumed..end - 2]);
        }
    }
}
