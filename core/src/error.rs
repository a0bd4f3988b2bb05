//! Error types for request submission and transport failures.
//!
//! # Design
//! Two layers are kept apart. `SubmitError` is returned synchronously from
//! `submit` and means no completion callback will ever fire. `TransportError`
//! describes why a submitted request failed on the wire; it reaches the caller
//! inside the `Completion` handed to the callback, or wrapped in a
//! `SubmitError` when the transport refuses a request before it starts.

use std::io;

/// Failures reported by a reactor for a single request.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The host is empty or the port is zero.
    #[error("invalid remote address {host:?}:{port}")]
    InvalidAddress { host: String, port: u16 },

    /// The reactor refuses to open more connections.
    #[error("connection limit of {limit} reached")]
    ConnectionLimit { limit: usize },

    /// The request target cannot be placed on a request line.
    #[error("invalid request target: {0:?}")]
    InvalidTarget(String),

    /// A header name or value cannot be serialized.
    #[error("invalid header: {0:?}")]
    InvalidHeader(String),

    /// Name resolution failed or produced no addresses.
    #[error("failed to resolve {host}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The TCP connection could not be established (refused, unreachable).
    #[error("connect failed")]
    Connect(#[source] io::Error),

    /// Reading or writing an established connection failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The connection timeout elapsed before the response completed.
    #[error("request timed out")]
    Timeout,

    /// The peer closed the connection before a complete response arrived.
    #[error("connection closed before the response completed")]
    ConnectionClosed,

    /// The response could not be parsed as HTTP/1.x.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The response exceeded the reactor's size limit.
    #[error("response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    /// The reactor finished the request without delivering a response.
    #[error("no response received")]
    NoResponse,
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// Synchronous submission failures. The request was released and its
/// completion callback will never run.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The reactor could not create a connection handle.
    #[error("could not create a connection to {host}:{port}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: TransportError,
    },

    /// The transport rejected the request before it was started.
    #[error("request rejected by the transport")]
    Rejected(#[source] TransportError),
}

impl SubmitError {
    /// The transport-level cause of the failure.
    pub fn transport(&self) -> &TransportError {
        match self {
            SubmitError::Connect { source, .. } => source,
            SubmitError::Rejected(source) => source,
        }
    }
}

/// Returned when parsing an unrecognized method token.
#[derive(Debug, thiserror::Error)]
#[error("unknown HTTP method: {0:?}")]
pub struct UnknownMethod(pub String);
