//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (pool size, buffer sizes, ports)
//! - Check that every address parses before anything binds
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one backend is required")]
    NoBackends,

    #[error("{count} backends configured but pool.max_backends is {max}")]
    TooManyBackends { count: usize, max: usize },

    #[error("backend #{index} has invalid address '{address}'")]
    BackendAddress { index: usize, address: String },

    #[error("backend #{index} has port 0")]
    BackendPort { index: usize },

    #[error("invalid {field} '{value}'")]
    SocketAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    if config.backends.len() > config.pool.max_backends {
        errors.push(ValidationError::TooManyBackends {
            count: config.backends.len(),
            max: config.pool.max_backends,
        });
    }
    for (index, backend) in config.backends.iter().enumerate() {
        if backend.address.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::BackendAddress {
                index,
                address: backend.address.clone(),
            });
        }
        if backend.port == 0 {
            errors.push(ValidationError::BackendPort { index });
        }
    }

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_socket_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_connections" });
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::Zero { field: "listener.backlog" });
    }
    if config.session.buffer_size == 0 {
        errors.push(ValidationError::Zero { field: "session.buffer_size" });
    }
    if config.session.max_events == 0 {
        errors.push(ValidationError::Zero { field: "session.max_events" });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::SocketAddress {
            field,
            value: value.to_string(),
        });
    }
}
