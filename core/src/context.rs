//! Per-submission state bridging the reactor back to the caller.
//!
//! # Design
//! A `ResponseContext` owns the submitted `Request` for as long as the
//! exchange is in flight. It is move-only, and both ways out of it,
//! `complete` and `release`, consume it: the request is released on exactly
//! one path and the handler cannot run twice.
//!
//! Lifecycle: `Connecting` from creation, optionally marked `Failed` or
//! `TimedOut` by `record_error`, then `complete` resolves the terminal phase,
//! runs the handler and drops everything.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::completion::{Completion, Outcome};
use crate::error::TransportError;
use crate::http::RawResponse;
use crate::request::Request;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Observable phase of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Succeeded,
    Failed,
    TimedOut,
}

/// Owns one in-flight request and its completion handler.
pub struct ResponseContext {
    id: u64,
    request: Request,
    error: Option<TransportError>,
}

impl ResponseContext {
    pub(crate) fn new(request: Request) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            request,
            error: None,
        }
    }

    /// Process-unique id, used to correlate log events.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn phase(&self) -> Phase {
        match &self.error {
            None => Phase::Connecting,
            Some(TransportError::Timeout) => Phase::TimedOut,
            Some(_) => Phase::Failed,
        }
    }

    /// Note a transport failure. The first recorded error wins; nothing is
    /// delivered until `complete` is called.
    pub fn record_error(&mut self, error: TransportError) {
        if self.error.is_none() {
            debug!(request_id = self.id, %error, "transport error recorded");
            self.error = Some(error);
        } else {
            trace!(request_id = self.id, %error, "additional transport error ignored");
        }
    }

    /// Finish the submission: run the handler once with the response body
    /// (empty without a response), then release the request.
    pub fn complete(self, response: Option<RawResponse>) {
        let ResponseContext {
            id,
            mut request,
            error,
        } = self;

        let (status, headers, body) = match response {
            Some(response) => (Some(response.status), response.headers, response.body),
            None => (None, Vec::new(), Bytes::new()),
        };
        let outcome = match (error, status) {
            (Some(TransportError::Timeout), _) => Outcome::TimedOut,
            (Some(error), _) => Outcome::Failed(error),
            (None, Some(status)) => Outcome::Succeeded { status },
            (None, None) => Outcome::Failed(TransportError::NoResponse),
        };
        debug!(
            request_id = id,
            phase = ?outcome.phase(),
            status,
            body_len = body.len(),
            "request finished"
        );

        let completion = Completion::new(outcome, status, headers, body);
        match request.take_handler() {
            Some(handler) => handler(completion),
            None => trace!(request_id = id, "no completion handler registered"),
        }
        trace!(request_id = id, "context released");
    }

    /// Drop the request without running its handler. Only for submissions
    /// that failed before the reactor accepted them.
    pub fn release(self) {
        trace!(request_id = self.id, "context released without completion");
    }
}

impl fmt::Debug for ResponseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseContext")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .field("request", &self.request)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io;
    use std::rc::Rc;

    use super::*;

    type Seen = Rc<RefCell<Vec<Completion>>>;

    fn context() -> (ResponseContext, Seen) {
        let seen: Seen = Rc::default();
        let sink = seen.clone();
        let request = Request::builder()
            .remote("127.0.0.1", 8000)
            .on_complete(move |c| sink.borrow_mut().push(c))
            .build();
        (ResponseContext::new(request), seen)
    }

    fn response(body: &'static str) -> RawResponse {
        RawResponse {
            status: 200,
            headers: Vec::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn response_is_delivered_once() {
        let (ctx, seen) = context();
        assert_eq!(ctx.phase(), Phase::Connecting);
        ctx.complete(Some(response("Hello")));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0].outcome(), Outcome::Succeeded { status: 200 }));
        assert_eq!(seen[0].body().as_ref(), b"Hello");
    }

    #[test]
    fn missing_response_delivers_empty_body() {
        let (ctx, seen) = context();
        ctx.complete(None);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].body().is_empty());
        assert!(matches!(
            seen[0].outcome(),
            Outcome::Failed(TransportError::NoResponse)
        ));
    }

    #[test]
    fn recorded_error_does_not_deliver() {
        let (mut ctx, seen) = context();
        ctx.record_error(TransportError::Connect(io::ErrorKind::ConnectionRefused.into()));
        assert_eq!(ctx.phase(), Phase::Failed);
        assert!(seen.borrow().is_empty());

        ctx.complete(None);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0].outcome(), Outcome::Failed(TransportError::Connect(_))));
    }

    #[test]
    fn first_error_wins() {
        let (mut ctx, seen) = context();
        ctx.record_error(TransportError::Timeout);
        ctx.record_error(TransportError::ConnectionClosed);
        assert_eq!(ctx.phase(), Phase::TimedOut);
        ctx.complete(None);
        assert!(matches!(seen.borrow()[0].outcome(), Outcome::TimedOut));
    }

    #[test]
    fn error_outcome_keeps_partial_response_body() {
        let (mut ctx, seen) = context();
        ctx.record_error(TransportError::ConnectionClosed);
        ctx.complete(Some(response("partial")));

        let seen = seen.borrow();
        assert_eq!(seen[0].status(), Some(200));
        assert_eq!(seen[0].body().as_ref(), b"partial");
        assert!(!seen[0].is_success());
    }

    #[test]
    fn release_never_runs_handler() {
        let (ctx, seen) = context();
        ctx.release();
        assert!(seen.borrow().is_empty());
        assert_eq!(Rc::strong_count(&seen), 1, "handler must be dropped");
    }

    #[test]
    fn ids_are_unique() {
        let (a, _) = context();
        let (b, _) = context();
        assert_ne!(a.id(), b.id());
    }
}
