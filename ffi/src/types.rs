//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Reactors and request builders cross the boundary as opaque boxed handles.
//! Enums carry explicit discriminants. The completion passed to a C handler
//! borrows the response body, so it is only valid during the call.

use std::os::raw::c_void;

use flight_core::{Completion, LocalReactor, Method, Outcome, RequestBuilder};

/// Opaque handle to a single-threaded reactor.
pub struct FfiReactor {
    pub(crate) inner: LocalReactor,
}

/// Opaque handle to a request that has not been submitted yet.
pub struct FfiRequest {
    pub(crate) builder: RequestBuilder,
}

/// Status codes returned by every fallible entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiCode {
    Ok = 0,
    NullArg = 1,
    InvalidArg = 2,
    ConnectFailed = 3,
    Rejected = 4,
    Panic = 5,
}

/// HTTP method as a C enum.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiMethod {
    Get = 0,
    Post = 1,
    Head = 2,
    Put = 3,
    Delete = 4,
    Options = 5,
    Trace = 6,
    Connect = 7,
    Patch = 8,
}

impl From<FfiMethod> for Method {
    fn from(m: FfiMethod) -> Self {
        match m {
            FfiMethod::Get => Method::Get,
            FfiMethod::Post => Method::Post,
            FfiMethod::Head => Method::Head,
            FfiMethod::Put => Method::Put,
            FfiMethod::Delete => Method::Delete,
            FfiMethod::Options => Method::Options,
            FfiMethod::Trace => Method::Trace,
            FfiMethod::Connect => Method::Connect,
            FfiMethod::Patch => Method::Patch,
        }
    }
}

/// Terminal state reported to a C handler.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiOutcome {
    Succeeded = 0,
    Failed = 1,
    TimedOut = 2,
}

/// Completion data borrowed for the duration of one handler call.
///
/// `http_status` is 0 when no response arrived. `body` is null when
/// `body_len` is 0.
#[repr(C)]
pub struct FfiCompletion {
    pub outcome: FfiOutcome,
    pub http_status: u16,
    pub body: *const u8,
    pub body_len: usize,
}

impl FfiCompletion {
    /// Borrow `completion` as C-compatible data.
    pub(crate) fn borrow(completion: &Completion) -> Self {
        let outcome = match completion.outcome() {
            Outcome::Succeeded { .. } => FfiOutcome::Succeeded,
            Outcome::Failed(_) => FfiOutcome::Failed,
            Outcome::TimedOut => FfiOutcome::TimedOut,
        };
        let body = completion.body();
        Self {
            outcome,
            http_status: completion.status().unwrap_or(0),
            body: if body.is_empty() {
                std::ptr::null()
            } else {
                body.as_ptr()
            },
            body_len: body.len(),
        }
    }
}

/// C completion handler: `(user_data, completion)`.
pub type FfiCompletionFn =
    Option<unsafe extern "C" fn(user_data: *mut c_void, completion: *const FfiCompletion)>;
