//! Single-flight asynchronous HTTP client core.
//!
//! # Overview
//! A caller describes a request with [`Request::builder`], hands it to
//! [`submit`] (or a [`Dispatcher`]) together with a [`Reactor`], and later
//! receives exactly one [`Completion`] on the reactor's thread.
//!
//! # Design
//! - `Request` is frozen once built; ownership moves into `submit`.
//! - `ResponseContext` owns the in-flight request. It is move-only and is
//!   consumed by the single completion or release path.
//! - Synchronous failures return `SubmitError` and never run the handler;
//!   asynchronous failures arrive as a `Completion` with an explicit `Outcome`.
//! - `Reactor` is the seam to the event loop. `LocalReactor` implements it
//!   on a single-threaded tokio runtime; tests can plug in their own.
//! - No pooling, pipelining, retries or cancellation: one request, one
//!   connection, one callback.

pub mod completion;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod local;
pub mod reactor;
pub mod request;

pub use completion::{Completion, Outcome};
pub use context::{Phase, ResponseContext};
pub use dispatch::{submit, Dispatcher};
pub use error::{SubmitError, TransportError, UnknownMethod};
pub use http::{OutgoingRequest, RawResponse};
pub use local::{LocalReactor, ReactorConfig};
pub use reactor::{Reactor, Rejected};
pub use request::{CompletionHandler, Headers, Method, Request, RequestBuilder, DEFAULT_CONTENT_TYPE};
