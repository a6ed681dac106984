//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server
//! - Resolve the configured address/port into a connectable socket address

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

use crate::config::BackendConfig;

/// Error building a backend from configuration.
#[derive(Debug, Error)]
#[error("backend '{name}' has invalid address '{address}': {source}")]
pub struct BackendError {
    pub name: String,
    pub address: String,
    #[source]
    pub source: std::net::AddrParseError,
}

/// A single backend server. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Name used in logs and the admin surface.
    pub name: String,
    /// Configured address.
    pub address: String,
    /// Configured port.
    pub port: u16,
    /// Pre-resolved socket address.
    pub addr: SocketAddr,
}

impl Backend {
    /// Create a backend from an address/port pair.
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Result<Self, BackendError> {
        let name = name.into();
        let address = address.into();
        let ip: IpAddr = address.parse().map_err(|source| BackendError {
            name: name.clone(),
            address: address.clone(),
            source,
        })?;

        Ok(Self {
            name,
            address,
            port,
            addr: SocketAddr::new(ip, port),
        })
    }

    /// Create a backend from its configuration entry.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        Self::new(config.name.clone(), config.address.clone(), config.port)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
