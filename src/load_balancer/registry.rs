//! Backend registry.
//!
//! # Responsibilities
//! - Hold the ordered backend roster loaded at startup
//! - Map reservation indices back to backends
//!
//! The registry is never mutated after construction, so it is shared through
//! an `Arc` without any locking.

use crate::config::BackendConfig;
use crate::load_balancer::backend::{Backend, BackendError};

/// Immutable, ordered list of backends.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    backends: Vec<Backend>,
}

impl BackendRegistry {
    /// Build the registry from configuration. Any malformed entry is fatal.
    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, BackendError> {
        let backends = configs
            .iter()
            .map(Backend::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        for (index, backend) in backends.iter().enumerate() {
            tracing::debug!(index, name = %backend.name, addr = %backend.addr, "Backend registered");
        }

        Ok(Self { backends })
    }

    /// Build the registry from already constructed backends.
    pub fn new(backends: Vec<Backend>) -> Self {
        Self { backends }
    }

    /// All backends, in roster order.
    pub fn list(&self) -> &[Backend] {
        &self.backends
    }

    /// Backend at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Backend> {
        self.backends.get(index)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
