//! Single-threaded readiness loop.
//!
//! # Responsibilities
//! - Own the poll instance, the listening socket and every live session
//! - Accept clients, reserve a backend, open a session
//! - Route readiness events to the owning session
//! - Tear sessions down on completion or failure without disturbing others
//!
//! Only the loop thread touches sessions, so they need no locking. The
//! selector and the cache are shared through `Arc` with auxiliary threads.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use slab::Slab;
use thiserror::Error;

use crate::config::ProxyConfig;
use crate::lifecycle::startup::ProxyState;
use crate::lifecycle::Shutdown;
use crate::net::connection::token_owner;
use crate::net::session::{Flow, RelayContext, Session, SessionError};
use crate::observability::metrics;

const LISTENER: Token = Token(usize::MAX - 1);
const WAKER: Token = Token(usize::MAX - 2);

/// Error creating the event loop. Fatal at startup.
#[derive(Debug, Error)]
pub enum EventLoopError {
    #[error("failed to create poll instance: {0}")]
    Poll(#[source] io::Error),

    #[error("failed to register listener: {0}")]
    Register(#[source] io::Error),

    #[error("failed to create shutdown waker: {0}")]
    Waker(#[source] io::Error),
}

/// The proxy's event loop. See the module docs.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    ready: Vec<Token>,
    listener: TcpListener,
    sessions: Slab<Session>,
    state: ProxyState,
    cache_enabled: bool,
    cache_ttl: Duration,
    buffer_size: usize,
    max_connections: usize,
    shutdown: Shutdown,
}

impl EventLoop {
    /// Take ownership of a bound listener and prepare the poll instance.
    pub fn new(mut listener: TcpListener, config: &ProxyConfig, state: ProxyState) -> Result<Self, EventLoopError> {
        let poll = Poll::new().map_err(EventLoopError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(EventLoopError::Register)?;
        let shutdown = Shutdown::new(poll.registry(), WAKER).map_err(EventLoopError::Waker)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(config.session.max_events),
            ready: Vec::with_capacity(config.session.max_events),
            listener,
            sessions: Slab::new(),
            state,
            cache_enabled: config.cache.enabled,
            cache_ttl: Duration::from_secs(config.cache.ttl_secs),
            buffer_size: config.session.buffer_size,
            max_connections: config.listener.max_connections,
            shutdown,
        })
    }

    /// Address clients connect to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle that stops [`run`](Self::run) from any thread.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Run until shutdown is triggered or the readiness wait itself fails.
    ///
    /// Either way every remaining session is torn down before returning.
    pub fn run(&mut self) -> io::Result<()> {
        tracing::info!(address = ?self.local_addr().ok(), "Event loop running");

        loop {
            if let Err(e) = self.poll.poll(&mut self.events, None) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(error = %e, "Readiness wait failed");
                self.close_all();
                return Err(e);
            }

            self.ready.clear();
            self.ready.extend(self.events.iter().map(|event| event.token()));

            let ready = std::mem::take(&mut self.ready);
            for &token in &ready {
                match token {
                    LISTENER => self.accept_pending(),
                    WAKER => {}
                    token => self.dispatch(token),
                }
            }
            self.ready = ready;

            if self.shutdown.is_triggered() {
                tracing::info!(sessions = self.sessions.len(), "Shutdown requested, closing sessions");
                self.close_all();
                return Ok(());
            }
        }
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.sessions.len() >= self.max_connections {
            tracing::warn!(peer_addr = %peer, max_connections = self.max_connections, "Session limit reached, refusing client");
            metrics::record_session_refused("limit");
            return;
        }

        let Some(reservation) = self.state.selector.reserve() else {
            tracing::error!(peer_addr = %peer, "No backends configured, refusing client");
            metrics::record_session_refused("no_backend");
            return;
        };
        let index = reservation.index();
        let Some(backend) = self.state.registry.get(index) else {
            tracing::error!(peer_addr = %peer, index, "Reservation for unknown backend");
            metrics::record_session_refused("no_backend");
            return;
        };

        let entry = self.sessions.vacant_entry();
        let slot = entry.key();
        match Session::open(
            slot,
            stream,
            peer,
            reservation,
            backend.addr,
            self.buffer_size,
            self.poll.registry(),
        ) {
            Ok(session) => {
                tracing::info!(
                    connection_id = %session.id(),
                    peer_addr = %peer,
                    backend = %backend,
                    "Client accepted"
                );
                entry.insert(session);
                metrics::record_session_opened(self.sessions.len());
            }
            Err(e) => {
                tracing::warn!(peer_addr = %peer, backend = %backend, error = %e, "Session setup failed");
                metrics::record_session_failure(e.reason());
            }
        }
    }

    fn dispatch(&mut self, token: Token) {
        let (slot, endpoint) = token_owner(token);
        let ctx = RelayContext {
            cache: self.cache_enabled.then_some(&*self.state.cache),
            ttl: self.cache_ttl,
        };

        // Events for a session closed earlier in this batch are stale.
        let Some(session) = self.sessions.get_mut(slot) else {
            return;
        };
        tracing::trace!(connection_id = %session.id(), %endpoint, state = %session.state(), "Readiness event");

        match session.drive(&ctx, self.poll.registry()) {
            Ok(Flow::Pending) => {}
            Ok(Flow::Complete) => self.close(slot, None),
            Err(e) => self.close(slot, Some(e)),
        }
    }

    fn close(&mut self, slot: usize, error: Option<SessionError>) {
        let Some(mut session) = self.sessions.try_remove(slot) else {
            return;
        };
        let state = session.state();
        session.teardown(self.poll.registry());

        match error {
            None => tracing::debug!(connection_id = %session.id(), "Session complete"),
            Some(SessionError::Closed(endpoint)) => {
                tracing::debug!(connection_id = %session.id(), %state, %endpoint, "Session closed by peer");
                metrics::record_peer_close(endpoint.as_str());
            }
            Some(e) => {
                tracing::warn!(connection_id = %session.id(), peer_addr = %session.peer(), %state, error = %e, "Session failed");
                if let Some(reason) = e.failure_reason() {
                    metrics::record_session_failure(reason);
                }
            }
        }
        metrics::record_session_closed(self.sessions.len());
    }

    fn close_all(&mut self) {
        let registry = self.poll.registry();
        for mut session in self.sessions.drain() {
            session.teardown(registry);
        }
        metrics::record_session_closed(0);
    }
}
