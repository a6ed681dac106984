//! TCP listener creation.
//!
//! # Responsibilities
//! - Parse the configured bind address
//! - Create, bind and listen with the configured backlog
//! - Hand a non-blocking listener to the event loop
//!
//! Every failure here is fatal: nothing is left listening.

use std::net::SocketAddr;

use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Bind address did not parse.
    #[error("Invalid bind address '{address}': {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
    /// Socket creation or option setup failed.
    #[error("Failed to create socket: {0}")]
    Socket(#[source] std::io::Error),
    /// Failed to bind to address.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// Failed to start listening.
    #[error("Failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Bind the proxy's listening socket.
pub fn bind(config: &ListenerConfig) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .map_err(|source| ListenerError::Address {
            address: config.bind_address.clone(),
            source,
        })?;

    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(ListenerError::Socket)?;
    socket.set_reuse_address(true).map_err(ListenerError::Socket)?;
    socket.set_nonblocking(true).map_err(ListenerError::Socket)?;
    socket
        .bind(&addr.into())
        .map_err(|source| ListenerError::Bind { addr, source })?;

    let backlog = i32::try_from(config.backlog).unwrap_or(i32::MAX);
    socket
        .listen(backlog)
        .map_err(|source| ListenerError::Listen { addr, source })?;

    let listener = TcpListener::from_std(socket.into());
    if let Ok(local_addr) = listener.local_addr() {
        tracing::info!(
            address = %local_addr,
            backlog = config.backlog,
            max_connections = config.max_connections,
            "Listener bound"
        );
    }
    Ok(listener)
}
