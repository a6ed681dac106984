//! Per-client relay session.
//!
//! A session owns the client socket, the backend socket and the backend
//! reservation for its whole life. It advances through [`SessionState`]
//! only when an I/O call makes progress; any call that would block leaves the
//! state untouched until the next readiness event.
//!
//! Readiness is edge-triggered, so each event drives the machine until an
//! I/O call would block rather than acting only on the endpoint that fired.
//! Data that arrived while the session was in an earlier phase is therefore
//! never stranded.

use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Interest, Registry};
use thiserror::Error;

use crate::cache::{is_cacheable, ResponseCache};
use crate::load_balancer::Reservation;
use crate::net::connection::{endpoint_token, ConnectionId, Endpoint, SessionState};
use crate::observability::metrics;

/// Why a session ended early.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("backend connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("failed to register {endpoint} socket: {source}")]
    Register {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("{0} closed the connection")]
    Closed(Endpoint),

    #[error("{endpoint} I/O failed: {source}")]
    Io {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("relay buffer allocation failed")]
    Exhausted,

    #[error("session already torn down")]
    TornDown,
}

impl SessionError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            SessionError::Connect(_) => "connect",
            SessionError::Register { .. } => "register",
            SessionError::Closed(_) => "closed",
            SessionError::Io { .. } => "io",
            SessionError::Exhausted => "exhausted",
            SessionError::TornDown => "torn_down",
        }
    }

    /// Whether the peer simply went away, as opposed to something failing.
    pub fn is_peer_close(&self) -> bool {
        matches!(self, SessionError::Closed(_))
    }

    /// Label for the failure counter, or `None` for a peer closing normally.
    pub fn failure_reason(&self) -> Option<&'static str> {
        (!self.is_peer_close()).then(|| self.reason())
    }
}

/// Outcome of driving a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Waiting on the next readiness event.
    Pending,
    /// Response delivered; the session should be torn down.
    Complete,
}

/// Result of one state handler.
enum Step {
    Blocked,
    Advanced,
}

/// Cache access for a session. `cache` is `None` when caching is disabled.
#[derive(Debug, Clone, Copy)]
pub struct RelayContext<'a> {
    pub cache: Option<&'a ResponseCache>,
    pub ttl: Duration,
}

/// Everything one client connection owns.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    slot: usize,
    peer: SocketAddr,
    client: Option<TcpStream>,
    backend: Option<TcpStream>,
    reservation: Reservation,
    state: SessionState,
    buffer: Vec<u8>,
    cache_key: Vec<u8>,
}

impl Session {
    /// Start a session: begin the non-blocking backend connect and register
    /// both sockets under the tokens of `slot`.
    ///
    /// On error every resource handed in has already been released.
    pub fn open(
        slot: usize,
        client: TcpStream,
        peer: SocketAddr,
        mut reservation: Reservation,
        backend_addr: SocketAddr,
        buffer_size: usize,
        registry: &Registry,
    ) -> Result<Self, SessionError> {
        let mut buffer = Vec::new();
        if buffer.try_reserve_exact(buffer_size).is_err() {
            reservation.release();
            return Err(SessionError::Exhausted);
        }
        buffer.resize(buffer_size, 0);

        let backend = match TcpStream::connect(backend_addr) {
            Ok(backend) => backend,
            Err(e) => {
                reservation.release();
                return Err(SessionError::Connect(e));
            }
        };

        let mut session = Self {
            id: ConnectionId::new(),
            slot,
            peer,
            client: Some(client),
            backend: Some(backend),
            reservation,
            state: SessionState::ConnectingBackend,
            buffer,
            cache_key: Vec::new(),
        };

        if let Err(e) = session.register(registry) {
            session.teardown(registry);
            return Err(e);
        }
        Ok(session)
    }

    fn register(&mut self, registry: &Registry) -> Result<(), SessionError> {
        if let Some(backend) = self.backend.as_mut() {
            registry
                .register(backend, endpoint_token(self.slot, Endpoint::Backend), Interest::WRITABLE)
                .map_err(|source| SessionError::Register { endpoint: Endpoint::Backend, source })?;
        }
        if let Some(client) = self.client.as_mut() {
            registry
                .register(client, endpoint_token(self.slot, Endpoint::Client), Interest::READABLE)
                .map_err(|source| SessionError::Register { endpoint: Endpoint::Client, source })?;
        }
        Ok(())
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn backend_index(&self) -> usize {
        self.reservation.index()
    }

    /// Whether teardown has run.
    pub fn is_torn_down(&self) -> bool {
        self.client.is_none() && self.backend.is_none() && self.reservation.is_released()
    }

    /// Advance the state machine as far as the sockets allow.
    pub fn drive(&mut self, ctx: &RelayContext<'_>, registry: &Registry) -> Result<Flow, SessionError> {
        loop {
            let step = match self.state {
                SessionState::ConnectingBackend => self.finish_connect(registry)?,
                SessionState::AwaitingClientRequest => self.relay_request(ctx)?,
                SessionState::AwaitingBackendResponse => self.relay_response(ctx)?,
                SessionState::Done => return Ok(Flow::Complete),
            };
            if let Step::Blocked = step {
                return Ok(Flow::Pending);
            }
        }
    }

    fn finish_connect(&mut self, registry: &Registry) -> Result<Step, SessionError> {
        let backend = self.backend.as_mut().ok_or(SessionError::TornDown)?;

        if let Some(err) = backend.take_error().map_err(SessionError::Connect)? {
            return Err(SessionError::Connect(err));
        }
        match backend.peer_addr() {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotConnected => return Ok(Step::Blocked),
            Err(e) => return Err(SessionError::Connect(e)),
        }

        registry
            .reregister(backend, endpoint_token(self.slot, Endpoint::Backend), Interest::READABLE)
            .map_err(|source| SessionError::Register { endpoint: Endpoint::Backend, source })?;

        self.state = SessionState::AwaitingClientRequest;
        tracing::debug!(connection_id = %self.id, backend = self.reservation.index(), "Backend connected");
        Ok(Step::Advanced)
    }

    fn relay_request(&mut self, ctx: &RelayContext<'_>) -> Result<Step, SessionError> {
        let client = self.client.as_mut().ok_or(SessionError::TornDown)?;
        let backend = self.backend.as_mut().ok_or(SessionError::TornDown)?;

        let n = match read_some(client, &mut self.buffer, Endpoint::Client)? {
            Some(n) => n,
            None => return Ok(Step::Blocked),
        };
        let request = &self.buffer[..n];

        self.cache_key.clear();
        if let Some(cache) = ctx.cache.filter(|_| is_cacheable(request)) {
            if let Some(cached) = cache.lookup(request) {
                tracing::debug!(connection_id = %self.id, bytes = cached.len(), "Serving cached response");
                write_all(client, &cached, Endpoint::Client)?;
                metrics::record_bytes_relayed("cache_to_client", cached.len());
                self.state = SessionState::Done;
                return Ok(Step::Advanced);
            }
            self.cache_key.extend_from_slice(request);
        }

        tracing::debug!(
            connection_id = %self.id,
            bytes = n,
            cacheable = !self.cache_key.is_empty(),
            "Forwarding request to backend"
        );
        write_all(backend, request, Endpoint::Backend)?;
        metrics::record_bytes_relayed("client_to_backend", n);

        self.state = SessionState::AwaitingBackendResponse;
        Ok(Step::Advanced)
    }

    fn relay_response(&mut self, ctx: &RelayContext<'_>) -> Result<Step, SessionError> {
        let client = self.client.as_mut().ok_or(SessionError::TornDown)?;
        let backend = self.backend.as_mut().ok_or(SessionError::TornDown)?;

        let n = match read_some(backend, &mut self.buffer, Endpoint::Backend)? {
            Some(n) => n,
            None => {
                // The client's readiness event lands here too; a hangup must
                // not wait for the backend to answer.
                check_open(client, Endpoint::Client)?;
                return Ok(Step::Blocked);
            }
        };
        let response = &self.buffer[..n];

        tracing::debug!(connection_id = %self.id, bytes = n, "Relaying response to client");
        write_all(client, response, Endpoint::Client)?;
        metrics::record_bytes_relayed("backend_to_client", n);

        if let Some(cache) = ctx.cache {
            if !self.cache_key.is_empty() {
                cache.insert(&self.cache_key, response, ctx.ttl);
            }
        }

        self.state = SessionState::Done;
        Ok(Step::Advanced)
    }

    /// Release the reservation, then deregister and close both sockets.
    ///
    /// Safe to call more than once; returns `false` when there was nothing
    /// left to release.
    pub fn teardown(&mut self, registry: &Registry) -> bool {
        let mut released = self.reservation.release();

        for (endpoint, stream) in [
            (Endpoint::Client, self.client.take()),
            (Endpoint::Backend, self.backend.take()),
        ] {
            if let Some(mut stream) = stream {
                if let Err(e) = registry.deregister(&mut stream) {
                    tracing::trace!(connection_id = %self.id, %endpoint, error = %e, "Deregister failed");
                }
                released = true;
            }
        }

        self.state = SessionState::Done;
        released
    }
}

/// Read whatever is available. `Ok(None)` means the read would block.
fn read_some(stream: &mut TcpStream, buf: &mut [u8], endpoint: Endpoint) -> Result<Option<usize>, SessionError> {
    loop {
        match stream.read(buf) {
            Ok(0) => return Err(SessionError::Closed(endpoint)),
            Ok(n) => return Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => return Err(SessionError::Io { endpoint, source }),
        }
    }
}

/// Fail with [`SessionError::Closed`] if the peer has hung up, without
/// consuming anything it sent.
fn check_open(stream: &TcpStream, endpoint: Endpoint) -> Result<(), SessionError> {
    let mut byte = [0u8; 1];
    loop {
        match stream.peek(&mut byte) {
            Ok(0) => return Err(SessionError::Closed(endpoint)),
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => return Err(SessionError::Io { endpoint, source }),
        }
    }
}

/// Write the whole slice. A socket that cannot take it without blocking
/// ends the session; there is no output buffering.
fn write_all(stream: &mut TcpStream, mut buf: &[u8], endpoint: Endpoint) -> Result<(), SessionError> {
    while !buf.is_empty() {
        match stream.write(buf) {
            Ok(0) => {
                return Err(SessionError::Io {
                    endpoint,
                    source: io::Error::from(ErrorKind::WriteZero),
                })
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => return Err(SessionError::Io { endpoint, source }),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::LeastConnections;
    use mio::Poll;
    use std::sync::Arc;

    /// A connected client-side socket as the event loop would see it.
    fn accepted_client() -> (std::net::TcpStream, TcpStream, SocketAddr) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let remote = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, peer) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();
        (remote, TcpStream::from_std(accepted), peer)
    }

    #[test]
    fn teardown_is_idempotent() {
        let poll = Poll::new().unwrap();
        let backend = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let lb = Arc::new(LeastConnections::new(1));
        let (_remote, client, peer) = accepted_client();

        let mut session = Session::open(
            0,
            client,
            peer,
            lb.reserve().unwrap(),
            backend.local_addr().unwrap(),
            4096,
            poll.registry(),
        )
        .unwrap();
        assert_eq!(session.state(), SessionState::ConnectingBackend);
        assert_eq!(lb.active_counts(), vec![1]);

        assert!(session.teardown(poll.registry()));
        assert!(session.is_torn_down());
        assert_eq!(lb.active_counts(), vec![0]);

        assert!(!session.teardown(poll.registry()));
        assert_eq!(lb.active_counts(), vec![0]);

        drop(session);
        assert_eq!(lb.active_counts(), vec![0]);
    }

    #[test]
    fn driving_torn_down_session_fails() {
        let poll = Poll::new().unwrap();
        let backend = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let lb = Arc::new(LeastConnections::new(1));
        let (_remote, client, peer) = accepted_client();

        let mut session = Session::open(
            0,
            client,
            peer,
            lb.reserve().unwrap(),
            backend.local_addr().unwrap(),
            4096,
            poll.registry(),
        )
        .unwrap();
        session.teardown(poll.registry());

        let ctx = RelayContext { cache: None, ttl: Duration::ZERO };
        let err = session.drive(&ctx, poll.registry()).unwrap_err();
        assert!(matches!(err, SessionError::TornDown));
    }

    #[test]
    fn dropping_session_releases_reservation() {
        let poll = Poll::new().unwrap();
        let backend = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let lb = Arc::new(LeastConnections::new(2));
        let (_remote, client, peer) = accepted_client();

        let session = Session::open(
            5,
            client,
            peer,
            lb.reserve().unwrap(),
            backend.local_addr().unwrap(),
            4096,
            poll.registry(),
        )
        .unwrap();
        assert_eq!(session.backend_index(), 0);
        assert_eq!(lb.active_counts(), vec![1, 0]);

        drop(session);
        assert_eq!(lb.active_counts(), vec![0, 0]);
    }

    #[test]
    fn peer_close_is_not_a_failure() {
        assert!(SessionError::Closed(Endpoint::Client).is_peer_close());
        assert_eq!(SessionError::Closed(Endpoint::Backend).failure_reason(), None);
        assert!(!SessionError::Exhausted.is_peer_close());
        assert_eq!(SessionError::Exhausted.failure_reason(), Some("exhausted"));
        let io = SessionError::Io {
            endpoint: Endpoint::Client,
            source: io::Error::from(ErrorKind::ConnectionReset),
        };
        assert_eq!(io.failure_reason(), Some("io"));
        assert_eq!(SessionError::Connect(io::Error::from(ErrorKind::ConnectionRefused)).reason(), "connect");
    }
}
