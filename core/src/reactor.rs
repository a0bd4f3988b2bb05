//! The event-loop interface the dispatcher drives.
//!
//! # Design
//! A reactor owns connections and runs I/O; the dispatcher only configures a
//! connection and hands it over together with a `ResponseContext`. The context
//! is the single completion hook: a reactor reports transport failures with
//! `ResponseContext::record_error` and must end every accepted submission with
//! exactly one `ResponseContext::complete`, which consumes the context.
//!
//! All methods take `&self`; implementations are single-threaded and use
//! interior mutability, and callbacks run on the reactor's own thread.

use std::fmt;
use std::time::Duration;

use crate::context::ResponseContext;
use crate::error::TransportError;
use crate::http::OutgoingRequest;

/// An event loop able to run one-shot HTTP exchanges.
pub trait Reactor {
    /// Handle to a connection that has not been submitted yet.
    type Connection;

    /// Create a connection bound to `host:port`. Nothing is sent yet.
    fn create_connection(&self, host: &str, port: u16) -> Result<Self::Connection, TransportError>;

    /// Bound the whole exchange; `None` leaves the reactor default in place.
    fn set_timeout(&self, connection: &mut Self::Connection, timeout: Option<Duration>);

    /// Dispose of the connection automatically once its exchange finishes.
    fn release_on_completion(&self, connection: &mut Self::Connection);

    /// Start the exchange. On `Ok` the reactor owns the context and will
    /// complete it; on `Err` everything is handed back untouched.
    fn submit(
        &self,
        connection: Self::Connection,
        request: OutgoingRequest,
        context: ResponseContext,
    ) -> Result<(), Rejected<Self::Connection>>;

    /// Free a connection that was never started.
    fn discard(&self, connection: Self::Connection);
}

/// A submission the transport refused before starting it.
pub struct Rejected<C> {
    pub connection: C,
    pub context: ResponseContext,
    pub error: TransportError,
}

impl<C> fmt::Debug for Rejected<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("context", &self.context)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
