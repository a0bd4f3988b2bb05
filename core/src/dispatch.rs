//! Turning a `Request` into a live exchange on a reactor.
//!
//! # Design
//! Submission is synchronous and never waits on the network: it creates and
//! configures a connection, serializes the request, wraps it in a
//! `ResponseContext` and hands both to the reactor.
//!
//! Ownership rule: the request always moves into `submit`. If submission
//! fails, at connection creation or because the transport rejects the
//! request, the request is released here and its handler never runs. If it
//! succeeds, the reactor completes the context exactly once.

use tracing::{debug, warn};

use crate::context::ResponseContext;
use crate::error::SubmitError;
use crate::http::OutgoingRequest;
use crate::reactor::{Reactor, Rejected};
use crate::request::Request;

/// Submits requests to one reactor.
#[derive(Debug, Clone)]
pub struct Dispatcher<R> {
    reactor: R,
}

impl<R: Reactor> Dispatcher<R> {
    pub fn new(reactor: R) -> Self {
        Self { reactor }
    }

    pub fn reactor(&self) -> &R {
        &self.reactor
    }

    /// See [`submit`].
    pub fn submit(&self, request: Request) -> Result<(), SubmitError> {
        submit(&self.reactor, request)
    }
}

/// Submit `request` to `reactor`.
///
/// Returns once the exchange is registered. On `Ok` the request's handler
/// runs exactly once, later, on the reactor's thread, unless the reactor is
/// torn down first. On `Err` it never runs.
pub fn submit<R: Reactor + ?Sized>(reactor: &R, request: Request) -> Result<(), SubmitError> {
    let mut connection = match reactor.create_connection(request.host(), request.port()) {
        Ok(connection) => connection,
        Err(source) => {
            warn!(
                host = request.host(),
                port = request.port(),
                error = %source,
                "failed to create connection"
            );
            return Err(SubmitError::Connect {
                host: request.host().to_string(),
                port: request.port(),
                source,
            });
        }
    };

    let outgoing = OutgoingRequest::from_request(&request);
    reactor.set_timeout(&mut connection, request.timeout());
    reactor.release_on_completion(&mut connection);

    let context = ResponseContext::new(request);
    let request_id = context.id();
    debug!(
        request_id,
        host = context.request().host(),
        port = context.request().port(),
        method = %outgoing.method,
        target = %outgoing.target,
        body_len = outgoing.body.len(),
        "submitting request"
    );

    match reactor.submit(connection, outgoing, context) {
        Ok(()) => Ok(()),
        Err(Rejected {
            connection,
            context,
            error,
        }) => {
            warn!(request_id, %error, "transport rejected request");
            reactor.discard(connection);
            context.release();
            Err(SubmitError::Rejected(error))
        }
    }
}
