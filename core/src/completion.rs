//! The value delivered to a request's completion handler.
//!
//! # Design
//! The body alone cannot tell an empty success apart from a failure, so every
//! `Completion` carries an explicit `Outcome` next to the body bytes.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::context::Phase;
use crate::error::TransportError;

/// Terminal state of a submitted request.
#[derive(Debug)]
pub enum Outcome {
    /// A complete response was received, whatever its status code.
    Succeeded { status: u16 },
    /// The transport failed (refused, reset, malformed, no response).
    Failed(TransportError),
    /// The connection timeout elapsed.
    TimedOut,
}

impl Outcome {
    pub fn phase(&self) -> Phase {
        match self {
            Outcome::Succeeded { .. } => Phase::Succeeded,
            Outcome::Failed(_) => Phase::Failed,
            Outcome::TimedOut => Phase::TimedOut,
        }
    }

    pub fn error(&self) -> Option<&TransportError> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Result of one request, handed to its completion handler exactly once.
#[derive(Debug)]
pub struct Completion {
    outcome: Outcome,
    status: Option<u16>,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl Completion {
    pub(crate) fn new(
        outcome: Outcome,
        status: Option<u16>,
        headers: Vec<(String, String)>,
        body: Bytes,
    ) -> Self {
        Self {
            outcome,
            status,
            headers,
            body,
        }
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded { .. })
    }

    /// Status code of the received response, if any response arrived.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First response header matching `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Response body; empty when no response arrived.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }

    pub fn into_parts(self) -> (Outcome, Bytes) {
        (self.outcome, self.body)
    }

    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
