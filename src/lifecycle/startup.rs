//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the shared state (registry, selector, cache) from configuration
//! - Start the auxiliary thread (signal handling, admin surface)
//! - Bind the listener and create the event loop
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;

use crate::admin::{self, AdminState};
use crate::cache::ResponseCache;
use crate::config::{validate_config, ConfigError, ProxyConfig};
use crate::lifecycle::{signals, Shutdown};
use crate::load_balancer::{BackendError, BackendRegistry, LeastConnections};
use crate::net::event_loop::{EventLoop, EventLoopError};
use crate::net::listener::{self, ListenerError};

/// Any failure before the proxy starts accepting traffic.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    EventLoop(#[from] EventLoopError),

    #[error("failed to bind admin surface on {address}: {source}")]
    Admin {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to start auxiliary thread: {0}")]
    Auxiliary(#[source] io::Error),
}

/// State shared between the event loop and auxiliary threads.
#[derive(Debug, Clone)]
pub struct ProxyState {
    pub registry: Arc<BackendRegistry>,
    pub selector: Arc<LeastConnections>,
    pub cache: Arc<ResponseCache>,
}

impl ProxyState {
    /// Build the registry, an idle selector sized to it and an empty cache.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, BackendError> {
        let registry = BackendRegistry::from_config(&config.backends)?;
        Ok(Self::new(registry))
    }

    pub fn new(registry: BackendRegistry) -> Self {
        let selector = LeastConnections::new(registry.len());
        Self {
            registry: Arc::new(registry),
            selector: Arc::new(selector),
            cache: Arc::new(ResponseCache::new()),
        }
    }
}

/// Validate the configuration, build the shared state, bind the listener
/// and create the event loop.
pub fn build(config: &ProxyConfig) -> Result<(EventLoop, ProxyState), StartupError> {
    validate_config(config).map_err(ConfigError::Validation)?;
    let state = ProxyState::from_config(config)?;
    tracing::info!(
        backends = state.registry.len(),
        cache_enabled = config.cache.enabled,
        cache_ttl_secs = config.cache.ttl_secs,
        "Backend pool ready"
    );

    let listener = listener::bind(&config.listener)?;
    let event_loop = EventLoop::new(listener, config, state.clone())?;
    Ok((event_loop, state))
}

/// Start the auxiliary thread hosting signal handling and, if enabled, the
/// admin surface. The admin socket is bound before returning so a bad
/// address is still a startup failure.
pub fn spawn_auxiliary(
    config: &ProxyConfig,
    state: ProxyState,
    shutdown: Shutdown,
) -> Result<JoinHandle<()>, StartupError> {
    let admin_listener = if config.admin.enabled {
        let address = config.admin.bind_address.clone();
        let listener = std::net::TcpListener::bind(&address)
            .and_then(|l| l.set_nonblocking(true).map(|_| l))
            .map_err(|source| StartupError::Admin { address, source })?;
        Some(listener)
    } else {
        None
    };
    let admin_state = AdminState::new(state, &config.admin, &config.cache);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Auxiliary)?;

    std::thread::Builder::new()
        .name("proxy-aux".into())
        .spawn(move || {
            runtime.block_on(async move {
                if let Some(listener) = admin_listener {
                    match tokio::net::TcpListener::from_std(listener) {
                        Ok(listener) => {
                            tokio::spawn(admin::serve(listener, admin_state));
                        }
                        Err(e) => tracing::error!(error = %e, "Admin surface unavailable"),
                    }
                }

                signals::shutdown_signal().await;
                shutdown.trigger();
            });
        })
        .map_err(StartupError::Auxiliary)
}
