//! C-ABI wrapper around `flight-core`.
//!
//! # Overview
//! Lets C and C++ callers build a request, submit it to a reactor, drive the
//! reactor and receive exactly one completion callback, without touching
//! Rust types directly.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - Reactors and requests are opaque boxed handles released with the
//!   matching `*_free` function.
//! - `flight_submit` always takes ownership of the request handle, whether
//!   or not submission succeeds. After it returns the handle is gone.
//! - Handlers run on the thread calling `flight_reactor_run`.

pub mod types;

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use flight_core::{LocalReactor, ReactorConfig, Request, RequestBuilder, SubmitError};

use types::*;

/// Read a C string argument as UTF-8.
unsafe fn str_arg<'a>(ptr: *const c_char) -> Result<&'a str, FfiCode> {
    if ptr.is_null() {
        return Err(FfiCode::NullArg);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| FfiCode::InvalidArg)
}

/// Read the setter's arguments with `args`, then store them with `apply`.
///
/// The builder is only taken once the arguments are known to be valid, so a
/// failed setter leaves the request exactly as it was.
fn update<T, A, F>(request: *mut FfiRequest, args: A, apply: F) -> FfiCode
where
    A: FnOnce() -> Result<T, FfiCode>,
    F: FnOnce(RequestBuilder, T) -> RequestBuilder,
{
    catch_unwind(AssertUnwindSafe(|| {
        if request.is_null() {
            return FfiCode::NullArg;
        }
        let value = match args() {
            Ok(value) => value,
            Err(code) => return code,
        };
        let request = unsafe { &mut *request };
        let builder = std::mem::take(&mut request.builder);
        request.builder = apply(builder, value);
        FfiCode::Ok
    }))
    .unwrap_or(FfiCode::Panic)
}

// ---------------------------------------------------------------------------
// Reactor lifecycle
// ---------------------------------------------------------------------------

/// Create a reactor with default limits.
///
/// Returns null if the runtime cannot be created.
/// The caller must free the returned pointer with `flight_reactor_free`.
#[unsafe(no_mangle)]
pub extern "C" fn flight_reactor_new() -> *mut FfiReactor {
    flight_reactor_new_with_config(0, 0)
}

/// Create a reactor. `max_connections` of 0 keeps the default limit;
/// `default_timeout_secs` of 0 means no timeout for requests without one.
#[unsafe(no_mangle)]
pub extern "C" fn flight_reactor_new_with_config(
    max_connections: u32,
    default_timeout_secs: u32,
) -> *mut FfiReactor {
    catch_unwind(|| {
        let mut config = ReactorConfig::default();
        if max_connections > 0 {
            config = config.with_max_connections(max_connections as usize);
        }
        if default_timeout_secs > 0 {
            config = config
                .with_default_timeout(Some(Duration::from_secs(u64::from(default_timeout_secs))));
        }
        match LocalReactor::new(config) {
            Ok(inner) => Box::into_raw(Box::new(FfiReactor { inner })),
            Err(err) => {
                tracing::warn!(error = %err, "failed to create reactor runtime");
                std::ptr::null_mut()
            }
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Run the reactor until every submitted request has completed.
///
/// Must not be called from inside a completion handler.
#[unsafe(no_mangle)]
pub extern "C" fn flight_reactor_run(reactor: *const FfiReactor) -> FfiCode {
    catch_unwind(AssertUnwindSafe(|| {
        if reactor.is_null() {
            return FfiCode::NullArg;
        }
        let reactor = unsafe { &*reactor };
        reactor.inner.run();
        FfiCode::Ok
    }))
    .unwrap_or(FfiCode::Panic)
}

/// Number of submitted requests that have not completed. 0 for null.
#[unsafe(no_mangle)]
pub extern "C" fn flight_reactor_pending(reactor: *const FfiReactor) -> usize {
    if reactor.is_null() {
        return 0;
    }
    unsafe { &*reactor }.inner.pending()
}

/// Free a reactor. Pending requests are dropped and their handlers never
/// run. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn flight_reactor_free(reactor: *mut FfiReactor) {
    if !reactor.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(reactor) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

/// Create a request with the default settings (`POST`, JSON content type,
/// `Connection: close`).
///
/// The caller must either submit it with `flight_submit` or free it with
/// `flight_request_free`.
#[unsafe(no_mangle)]
pub extern "C" fn flight_request_new() -> *mut FfiRequest {
    catch_unwind(|| {
        Box::into_raw(Box::new(FfiRequest {
            builder: Request::builder(),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a request that was never submitted. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn flight_request_free(request: *mut FfiRequest) {
    if !request.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(request) });
        }));
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn flight_request_set_remote(
    request: *mut FfiRequest,
    host: *const c_char,
    port: u16,
) -> FfiCode {
    update(
        request,
        || unsafe { str_arg(host) },
        |builder, host| builder.remote(host, port),
    )
}

#[unsafe(no_mangle)]
pub extern "C" fn flight_request_set_method(request: *mut FfiRequest, method: FfiMethod) -> FfiCode {
    update(request, || Ok(method), |builder, method| builder.method(method.into()))
}

/// Set the path and query string.
#[unsafe(no_mangle)]
pub extern "C" fn flight_request_set_target(
    request: *mut FfiRequest,
    target: *const c_char,
) -> FfiCode {
    update(
        request,
        || unsafe { str_arg(target) },
        |builder, target| builder.target(target),
    )
}

/// Add or override a header.
#[unsafe(no_mangle)]
pub extern "C" fn flight_request_add_header(
    request: *mut FfiRequest,
    name: *const c_char,
    value: *const c_char,
) -> FfiCode {
    update(
        request,
        || unsafe { Ok((str_arg(name)?, str_arg(value)?)) },
        |builder, (name, value)| builder.header(name, value),
    )
}

/// Copy `len` bytes from `body`. `body` may be null only when `len` is 0.
#[unsafe(no_mangle)]
pub extern "C" fn flight_request_set_body(
    request: *mut FfiRequest,
    body: *const u8,
    len: usize,
) -> FfiCode {
    update(
        request,
        || match (len, body.is_null()) {
            (0, _) => Ok(Vec::new()),
            (_, true) => Err(FfiCode::NullArg),
            (_, false) => Ok(unsafe { std::slice::from_raw_parts(body, len) }.to_vec()),
        },
        |builder, bytes| builder.body(bytes),
    )
}

/// Timeout in seconds; 0 uses the reactor default.
#[unsafe(no_mangle)]
pub extern "C" fn flight_request_set_timeout(request: *mut FfiRequest, secs: u32) -> FfiCode {
    update(request, || Ok(secs), |builder, secs| builder.timeout_secs(secs))
}

#[unsafe(no_mangle)]
pub extern "C" fn flight_request_set_close_on_complete(
    request: *mut FfiRequest,
    close: bool,
) -> FfiCode {
    update(
        request,
        || Ok(close),
        |builder, close| builder.close_after_complete(close),
    )
}

/// Register the completion handler. `user_data` is passed back untouched;
/// the `FfiCompletion` pointer is only valid during the call.
#[unsafe(no_mangle)]
pub extern "C" fn flight_request_set_handler(
    request: *mut FfiRequest,
    handler: FfiCompletionFn,
    user_data: *mut c_void,
) -> FfiCode {
    update(
        request,
        || handler.ok_or(FfiCode::NullArg),
        |builder, handler| {
            builder.on_complete(move |completion| {
                let ffi = FfiCompletion::borrow(&completion);
                unsafe { handler(user_data, &ffi) };
            })
        },
    )
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Submit `request` to `reactor`. The request handle is consumed in every
/// case, including failures; on failure its handler never runs.
///
/// Returns `ConnectFailed` when no connection could be created and
/// `Rejected` when the request could not be serialized.
#[unsafe(no_mangle)]
pub extern "C" fn flight_submit(reactor: *const FfiReactor, request: *mut FfiRequest) -> FfiCode {
    catch_unwind(AssertUnwindSafe(|| {
        if request.is_null() {
            return FfiCode::NullArg;
        }
        let request = unsafe { Box::from_raw(request) };
        if reactor.is_null() {
            return FfiCode::NullArg;
        }
        let reactor = unsafe { &*reactor };
        match flight_core::submit(&reactor.inner, request.builder.build()) {
            Ok(()) => FfiCode::Ok,
            Err(SubmitError::Connect { .. }) => FfiCode::ConnectFailed,
            Err(SubmitError::Rejected(_)) => FfiCode::Rejected,
        }
    }))
    .unwrap_or(FfiCode::Panic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[derive(Default)]
    struct Received {
        calls: usize,
        outcome: Option<FfiOutcome>,
        status: u16,
        body: Vec<u8>,
    }

    unsafe extern "C" fn record(user_data: *mut c_void, completion: *const FfiCompletion) {
        let received = unsafe { &mut *(user_data as *mut Received) };
        let completion = unsafe { &*completion };
        received.calls += 1;
        received.outcome = Some(completion.outcome);
        received.status = completion.http_status;
        received.body = if completion.body.is_null() {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(completion.body, completion.body_len) }.to_vec()
        };
    }

    fn start_server() -> std::net::SocketAddr {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener).await
            })
            .unwrap();
        });
        addr
    }

    fn request_to(host: &str, port: u16, target: &str, received: &mut Received) -> *mut FfiRequest {
        let req = flight_request_new();
        let host = CString::new(host).unwrap();
        let target = CString::new(target).unwrap();
        assert_eq!(flight_request_set_remote(req, host.as_ptr(), port), FfiCode::Ok);
        assert_eq!(flight_request_set_target(req, target.as_ptr()), FfiCode::Ok);
        let user_data = received as *mut Received as *mut c_void;
        assert_eq!(flight_request_set_handler(req, Some(record), user_data), FfiCode::Ok);
        req
    }

    #[test]
    fn echo_round_trip_through_c_api() {
        let addr = start_server();
        let reactor = flight_reactor_new();
        assert!(!reactor.is_null());

        let mut received = Received::default();
        let req = request_to(&addr.ip().to_string(), addr.port(), "/echo", &mut received);
        let body = b"Hello";
        assert_eq!(flight_request_set_body(req, body.as_ptr(), body.len()), FfiCode::Ok);
        let name = CString::new("X-Client").unwrap();
        let value = CString::new("ffi").unwrap();
        assert_eq!(flight_request_add_header(req, name.as_ptr(), value.as_ptr()), FfiCode::Ok);
        assert_eq!(flight_request_set_timeout(req, 5), FfiCode::Ok);

        assert_eq!(flight_submit(reactor, req), FfiCode::Ok);
        assert_eq!(flight_reactor_pending(reactor), 1);
        assert_eq!(flight_reactor_run(reactor), FfiCode::Ok);

        assert_eq!(received.calls, 1);
        assert_eq!(received.outcome, Some(FfiOutcome::Succeeded));
        assert_eq!(received.status, 200);
        assert_eq!(received.body, b"Hello");

        flight_reactor_free(reactor);
    }

    #[test]
    fn closed_port_reports_failure_once() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let reactor = flight_reactor_new();
        let mut received = Received::default();
        let req = request_to("127.0.0.1", port, "/test", &mut received);

        assert_eq!(flight_submit(reactor, req), FfiCode::Ok);
        flight_reactor_run(reactor);

        assert_eq!(received.calls, 1);
        assert_eq!(received.outcome, Some(FfiOutcome::Failed));
        assert_eq!(received.status, 0);
        assert!(received.body.is_empty());

        flight_reactor_free(reactor);
    }

    #[test]
    fn invalid_address_fails_without_callback() {
        let reactor = flight_reactor_new();
        let mut received = Received::default();
        let req = request_to("127.0.0.1", 0, "/test", &mut received);

        assert_eq!(flight_submit(reactor, req), FfiCode::ConnectFailed);
        flight_reactor_run(reactor);
        assert_eq!(received.calls, 0);

        flight_reactor_free(reactor);
    }

    #[test]
    fn invalid_target_is_rejected_without_callback() {
        let reactor = flight_reactor_new();
        let mut received = Received::default();
        let req = request_to("127.0.0.1", 8000, "/with space", &mut received);

        assert_eq!(flight_submit(reactor, req), FfiCode::Rejected);
        flight_reactor_run(reactor);
        assert_eq!(received.calls, 0);

        flight_reactor_free(reactor);
    }

    #[test]
    fn submit_null_request_is_null_arg() {
        let reactor = flight_reactor_new();
        assert_eq!(flight_submit(reactor, std::ptr::null_mut()), FfiCode::NullArg);
        flight_reactor_free(reactor);
    }

    #[test]
    fn submit_null_reactor_consumes_request() {
        let req = flight_request_new();
        assert_eq!(flight_submit(std::ptr::null(), req), FfiCode::NullArg);
    }

    #[test]
    fn setters_reject_null_arguments() {
        let req = flight_request_new();
        assert_eq!(
            flight_request_set_remote(req, std::ptr::null(), 80),
            FfiCode::NullArg
        );
        assert_eq!(
            flight_request_set_body(req, std::ptr::null(), 4),
            FfiCode::NullArg
        );
        assert_eq!(flight_request_set_body(req, std::ptr::null(), 0), FfiCode::Ok);
        assert_eq!(
            flight_request_set_handler(req, None, std::ptr::null_mut()),
            FfiCode::NullArg
        );
        assert_eq!(
            flight_request_set_method(std::ptr::null_mut(), FfiMethod::Get),
            FfiCode::NullArg
        );
        flight_request_free(req);
    }

    #[test]
    fn failed_setter_keeps_earlier_settings() {
        let req = flight_request_new();
        let target = CString::new("/keep").unwrap();
        assert_eq!(flight_request_set_target(req, target.as_ptr()), FfiCode::Ok);
        assert_eq!(flight_request_set_method(req, FfiMethod::Get), FfiCode::Ok);
        assert_eq!(flight_request_set_timeout(req, 4), FfiCode::Ok);

        assert_eq!(
            flight_request_set_remote(req, std::ptr::null(), 80),
            FfiCode::NullArg
        );
        let bad = [0xffu8, 0];
        let name = CString::new("X-Name").unwrap();
        assert_eq!(
            flight_request_add_header(req, name.as_ptr(), bad.as_ptr() as *const c_char),
            FfiCode::InvalidArg
        );
        assert_eq!(
            flight_request_set_body(req, std::ptr::null(), 3),
            FfiCode::NullArg
        );
        assert_eq!(
            flight_request_set_handler(req, None, std::ptr::null_mut()),
            FfiCode::NullArg
        );

        let built = unsafe { Box::from_raw(req) }.builder.build();
        assert_eq!(built.target(), "/keep");
        assert_eq!(built.method(), flight_core::Method::Get);
        assert_eq!(built.timeout_secs(), 4);
        assert!(built.headers().get("X-Name").is_none());
    }

    #[test]
    fn setters_reject_invalid_utf8() {
        let req = flight_request_new();
        let bad = [0xffu8, 0xfe, 0];
        assert_eq!(
            flight_request_set_target(req, bad.as_ptr() as *const c_char),
            FfiCode::InvalidArg
        );
        flight_request_free(req);
    }

    #[test]
    fn method_and_close_flag_are_applied() {
        let req = flight_request_new();
        assert_eq!(flight_request_set_method(req, FfiMethod::Delete), FfiCode::Ok);
        assert_eq!(flight_request_set_close_on_complete(req, false), FfiCode::Ok);

        let built = unsafe { Box::from_raw(req) }.builder.build();
        assert_eq!(built.method(), flight_core::Method::Delete);
        assert!(!built.close_after_complete());
    }

    #[test]
    fn pending_of_null_reactor_is_zero() {
        assert_eq!(flight_reactor_pending(std::ptr::null()), 0);
        assert_eq!(flight_reactor_run(std::ptr::null()), FfiCode::NullArg);
    }

    #[test]
    fn free_null_is_safe() {
        flight_reactor_free(std::ptr::null_mut());
        flight_request_free(std::ptr::null_mut());
    }
}
