//! HTTP fixture server used by the client's integration tests.
//!
//! Routes:
//! - `POST|PUT /echo` returns the request body verbatim.
//! - `GET|POST /test` returns a fixed HTML snippet with `Server: My server`.
//! - `ANY /headers` describes the received request as JSON.
//! - `ANY /slow/{ms}` waits `ms` milliseconds before answering.
//! - `GET /status/{code}` answers with an empty body and that status.

use std::time::Duration;

use axum::{
    extract::Path,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    routing::{any, get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

pub const FIXTURE_BODY: &str = "<h1>Python HTTP Test</h1>";

/// What `/headers` reports about the request it received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Inspected {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body_len: usize,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", post(echo).put(echo))
        .route("/test", get(fixture).post(fixture))
        .route("/headers", any(inspect))
        .route("/slow/{ms}", any(slow))
        .route("/status/{code}", get(status))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

async fn echo(body: Bytes) -> Bytes {
    tracing::debug!(len = body.len(), "echo");
    body
}

async fn fixture() -> ([(header::HeaderName, &'static str); 1], &'static str) {
    ([(header::SERVER, "My server")], FIXTURE_BODY)
}

async fn inspect(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Inspected> {
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(Inspected {
        method: method.as_str().to_string(),
        path,
        headers,
        body_len: body.len(),
    })
}

async fn slow(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "slow"
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspected_serializes_headers_as_pairs() {
        let inspected = Inspected {
            method: "POST".to_string(),
            path: "/headers".to_string(),
            headers: vec![("host".to_string(), "h:1".to_string())],
            body_len: 0,
        };
        let json = serde_json::to_value(&inspected).unwrap();
        assert_eq!(json["headers"][0][0], "host");
        assert_eq!(json["headers"][0][1], "h:1");
        assert_eq!(json["body_len"], 0);
    }

    #[test]
    fn inspected_roundtrips_through_json() {
        let inspected = Inspected {
            method: "GET".to_string(),
            path: "/headers?x=1".to_string(),
            headers: Vec::new(),
            body_len: 3,
        };
        let json = serde_json::to_string(&inspected).unwrap();
        let back: Inspected = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inspected);
    }
}
