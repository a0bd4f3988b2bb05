//! A reactor running on a single-threaded tokio runtime.
//!
//! # Design
//! `LocalReactor` pairs a current-thread runtime with a `LocalSet`. Every
//! accepted submission becomes one local task that resolves, connects,
//! writes the request and reads the response under the connection timeout,
//! then completes its `ResponseContext`. Tasks and handlers only run inside
//! `run()`, on the calling thread, so handlers need not be `Send`.
//!
//! Connections are one-shot: opened lazily when the request is submitted and
//! closed when the exchange ends. With no pool to return them to, release on
//! completion is implied. Dropping the reactor drops unfinished tasks and
//! their contexts without running any handler.

use std::cell::Cell;
use std::io;
use std::rc::{Rc, Weak};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::Notify;
use tokio::task::LocalSet;
use tracing::{debug, trace};

use crate::context::ResponseContext;
use crate::error::TransportError;
use crate::http::{self, ChunkedDecoder, Framing, OutgoingRequest, RawResponse};
use crate::reactor::{Reactor, Rejected};
use crate::request::Method;

const DEFAULT_MAX_CONNECTIONS: usize = 1024;
const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;
const READ_CHUNK: usize = 8 * 1024;

/// Limits and defaults applied by a `LocalReactor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactorConfig {
    max_connections: usize,
    default_timeout: Option<Duration>,
    max_response_bytes: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            default_timeout: None,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl ReactorConfig {
    /// Upper bound on connections alive at once; creation fails beyond it.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Timeout for requests configured with a timeout of 0.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = max;
        self
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }
}

/// Cheaply clonable handle to a single-threaded event loop.
#[derive(Clone)]
pub struct LocalReactor {
    inner: Rc<Inner>,
}

// `tasks` is declared first so unfinished tasks drop before the runtime.
struct Inner {
    tasks: LocalSet,
    runtime: Runtime,
    config: ReactorConfig,
    open: Cell<usize>,
    pending: Cell<usize>,
    idle: Notify,
    next_connection: Cell<u64>,
}

impl LocalReactor {
    pub fn new(config: ReactorConfig) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            inner: Rc::new(Inner {
                tasks: LocalSet::new(),
                runtime,
                config,
                open: Cell::new(0),
                pending: Cell::new(0),
                idle: Notify::new(),
                next_connection: Cell::new(1),
            }),
        })
    }

    pub fn config(&self) -> &ReactorConfig {
        &self.inner.config
    }

    /// Submissions accepted but not yet completed.
    pub fn pending(&self) -> usize {
        self.inner.pending.get()
    }

    /// Connections created and not yet released.
    pub fn open_connections(&self) -> usize {
        self.inner.open.get()
    }

    /// Drive the loop until every pending submission has completed,
    /// including submissions made by handlers while running.
    ///
    /// Must not be called from inside a completion handler.
    pub fn run(&self) {
        let inner = &self.inner;
        inner.tasks.block_on(&inner.runtime, async {
            while inner.pending.get() > 0 {
                inner.idle.notified().await;
            }
        });
    }
}

/// A connection handle owned by a `LocalReactor`.
pub struct Connection {
    id: u64,
    host: String,
    port: u16,
    timeout: Option<Duration>,
    release_on_completion: bool,
    owner: Weak<Inner>,
}

impl Connection {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.open.set(owner.open.get().saturating_sub(1));
            trace!(connection = self.id, "connection released");
        }
    }
}

/// Marks one submission as pending for as long as its task lives.
struct PendingGuard {
    owner: Weak<Inner>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.pending.set(owner.pending.get().saturating_sub(1));
            if owner.pending.get() == 0 {
                owner.idle.notify_one();
            }
        }
    }
}

impl Reactor for LocalReactor {
    type Connection = Connection;

    fn create_connection(&self, host: &str, port: u16) -> Result<Connection, TransportError> {
        if host.is_empty() || port == 0 {
            return Err(TransportError::InvalidAddress {
                host: host.to_string(),
                port,
            });
        }
        let limit = self.inner.config.max_connections;
        if self.inner.open.get() >= limit {
            return Err(TransportError::ConnectionLimit { limit });
        }

        let id = self.inner.next_connection.get();
        self.inner.next_connection.set(id + 1);
        self.inner.open.set(self.inner.open.get() + 1);
        trace!(connection = id, host, port, "connection created");

        Ok(Connection {
            id,
            host: host.to_string(),
            port,
            timeout: self.inner.config.default_timeout,
            release_on_completion: false,
            owner: Rc::downgrade(&self.inner),
        })
    }

    fn set_timeout(&self, connection: &mut Connection, timeout: Option<Duration>) {
        connection.timeout = timeout.or(self.inner.config.default_timeout);
    }

    fn release_on_completion(&self, connection: &mut Connection) {
        connection.release_on_completion = true;
    }

    fn submit(
        &self,
        connection: Connection,
        request: OutgoingRequest,
        context: ResponseContext,
    ) -> Result<(), Rejected<Connection>> {
        if let Err(error) = request.validate() {
            return Err(Rejected {
                connection,
                context,
                error,
            });
        }

        self.inner.pending.set(self.inner.pending.get() + 1);
        let guard = PendingGuard {
            owner: Rc::downgrade(&self.inner),
        };
        let limit = self.inner.config.max_response_bytes;

        self.inner.tasks.spawn_local(async move {
            let _guard = guard;
            let mut context = context;
            match exchange(&connection, &request, limit).await {
                Ok(response) => context.complete(Some(response)),
                Err(error) => {
                    context.record_error(error);
                    context.complete(None);
                }
            }
            trace!(
                connection = connection.id,
                release_on_completion = connection.release_on_completion,
                "exchange finished"
            );
        });
        Ok(())
    }

    fn discard(&self, connection: Connection) {
        debug!(connection = connection.id, "discarding unused connection");
    }
}

async fn exchange(
    connection: &Connection,
    request: &OutgoingRequest,
    limit: usize,
) -> Result<RawResponse, TransportError> {
    let round_trip = round_trip(connection, request, limit);
    match connection.timeout {
        Some(timeout) => tokio::time::timeout(timeout, round_trip)
            .await
            .map_err(|_| TransportError::Timeout)?,
        None => round_trip.await,
    }
}

async fn round_trip(
    connection: &Connection,
    request: &OutgoingRequest,
    limit: usize,
) -> Result<RawResponse, TransportError> {
    let resolve_error = |source| TransportError::Resolve {
        host: connection.host.clone(),
        source,
    };
    let addrs = lookup_host((connection.host.as_str(), connection.port))
        .await
        .map_err(resolve_error)?;

    let mut stream = None;
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(err) => last_error = Some(err),
        }
    }
    let mut stream = match (stream, last_error) {
        (Some(stream), _) => stream,
        (None, Some(err)) => return Err(TransportError::Connect(err)),
        (None, None) => {
            return Err(resolve_error(io::Error::new(
                io::ErrorKind::NotFound,
                "no addresses found",
            )))
        }
    };
    trace!(connection = connection.id, "connected");

    stream.write_all(&request.encode()).await?;
    read_response(&mut stream, request.method, limit).await
}

async fn read_response(
    stream: &mut TcpStream,
    method: Method,
    limit: usize,
) -> Result<RawResponse, TransportError> {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    let head = loop {
        if let Some(head) = http::parse_head(&buf, method)? {
            break head;
        }
        if buf.len() > limit {
            return Err(TransportError::ResponseTooLarge { limit });
        }
        if fill(stream, &mut buf).await? == 0 {
            return Err(TransportError::ConnectionClosed);
        }
    };
    let _ = buf.split_to(head.len);

    let body = match head.framing {
        Framing::Empty => Bytes::new(),
        Framing::Length(len) => {
            if len > limit {
                return Err(TransportError::ResponseTooLarge { limit });
            }
            while buf.len() < len {
                if fill(stream, &mut buf).await? == 0 {
                    return Err(TransportError::ConnectionClosed);
                }
            }
            buf.split_to(len).freeze()
        }
        Framing::Chunked => {
            let mut decoder = ChunkedDecoder::new(limit);
            loop {
                if let Some(body) = decoder.decode(&mut buf)? {
                    break body;
                }
                if buf.len() > limit {
                    return Err(TransportError::ResponseTooLarge { limit });
                }
                if fill(stream, &mut buf).await? == 0 {
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
        Framing::UntilClose => loop {
            if buf.len() > limit {
                return Err(TransportError::ResponseTooLarge { limit });
            }
            if fill(stream, &mut buf).await? == 0 {
                break buf.freeze();
            }
        },
    };

    Ok(RawResponse {
        status: head.status,
        headers: head.headers,
        body,
    })
}

async fn fill(stream: &mut TcpStream, buf: &mut BytesMut) -> io::Result<usize> {
    buf.reserve(READ_CHUNK);
    stream.read_buf(buf).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builders() {
        let config = ReactorConfig::default()
            .with_max_connections(2)
            .with_default_timeout(Some(Duration::from_secs(5)))
            .with_max_response_bytes(10);
        assert_eq!(config.max_connections(), 2);
        assert_eq!(config.default_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.max_response_bytes(), 10);
    }

    #[test]
    fn create_connection_rejects_bad_address() {
        let reactor = LocalReactor::new(ReactorConfig::default()).unwrap();
        assert!(matches!(
            reactor.create_connection("", 80),
            Err(TransportError::InvalidAddress { .. })
        ));
        assert!(matches!(
            reactor.create_connection("localhost", 0),
            Err(TransportError::InvalidAddress { .. })
        ));
        assert_eq!(reactor.open_connections(), 0);
    }

    #[test]
    fn connection_limit_is_enforced() {
        let reactor = LocalReactor::new(ReactorConfig::default().with_max_connections(1)).unwrap();
        let first = reactor.create_connection("localhost", 80).unwrap();
        assert!(matches!(
            reactor.create_connection("localhost", 80),
            Err(TransportError::ConnectionLimit { limit: 1 })
        ));
        reactor.discard(first);
        assert_eq!(reactor.open_connections(), 0);
        assert!(reactor.create_connection("localhost", 80).is_ok());
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let default = Some(Duration::from_secs(9));
        let reactor =
            LocalReactor::new(ReactorConfig::default().with_default_timeout(default)).unwrap();
        let mut conn = reactor.create_connection("localhost", 80).unwrap();
        reactor.set_timeout(&mut conn, None);
        assert_eq!(conn.timeout(), default);
        reactor.set_timeout(&mut conn, Some(Duration::from_secs(1)));
        assert_eq!(conn.timeout(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn connection_without_release_is_freed_when_exchange_ends() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let reactor = LocalReactor::new(ReactorConfig::default().with_max_connections(1)).unwrap();

        for _ in 0..3 {
            let request = crate::Request::builder().remote("127.0.0.1", port).build();
            let outgoing = OutgoingRequest::from_request(&request);
            let conn = reactor.create_connection("127.0.0.1", port).unwrap();
            reactor
                .submit(conn, outgoing, ResponseContext::new(request))
                .unwrap();
            reactor.run();

            assert_eq!(reactor.pending(), 0);
            assert_eq!(reactor.open_connections(), 0);
        }
    }

    #[test]
    fn run_returns_immediately_when_idle() {
        let reactor = LocalReactor::new(ReactorConfig::default()).unwrap();
        reactor.run();
        assert_eq!(reactor.pending(), 0);
    }
}
