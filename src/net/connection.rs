//! Connection identity and session lifecycle states.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Name the phases a session moves through
//! - Map poll tokens to sessions and their endpoints

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use mio::Token;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a session is in its request/response cycle.
///
/// ```text
/// ConnectingBackend → AwaitingClientRequest → AwaitingBackendResponse → Done
///                                  └──────────── cache hit ─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Non-blocking connect to the backend is in flight.
    ConnectingBackend,
    /// Backend is connected; waiting for the client's request.
    AwaitingClientRequest,
    /// Request forwarded; waiting for the backend's response.
    AwaitingBackendResponse,
    /// Response relayed (or served from cache); ready for teardown.
    Done,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::ConnectingBackend => "connecting_backend",
            SessionState::AwaitingClientRequest => "awaiting_client_request",
            SessionState::AwaitingBackendResponse => "awaiting_backend_response",
            SessionState::Done => "done",
        };
        f.write_str(name)
    }
}

/// One of the two sockets a session owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Client,
    Backend,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Client => "client",
            Endpoint::Backend => "backend",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Each session slot owns two consecutive tokens: even for the client,
/// odd for the backend.
pub fn endpoint_token(slot: usize, endpoint: Endpoint) -> Token {
    match endpoint {
        Endpoint::Client => Token(slot * 2),
        Endpoint::Backend => Token(slot * 2 + 1),
    }
}

/// Inverse of [`endpoint_token`].
pub fn token_owner(token: Token) -> (usize, Endpoint) {
    let endpoint = if token.0 % 2 == 0 {
        Endpoint::Client
    } else {
        Endpoint::Backend
    };
    (token.0 / 2, endpoint)
}
