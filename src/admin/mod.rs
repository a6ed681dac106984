//! Read-only administrative HTTP surface.
//!
//! Runs on the auxiliary thread's runtime and reads the selector counters
//! and the cache through the same locks the event loop uses.

pub mod auth;
pub mod handlers;

use std::io;
use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;

use crate::config::{AdminConfig, CacheConfig};
use crate::lifecycle::ProxyState;
use self::auth::admin_auth_middleware;
use self::handlers::{get_backends, get_cache, get_status};

/// State handed to every admin handler.
#[derive(Debug, Clone)]
pub struct AdminState {
    pub proxy: ProxyState,
    pub api_key: Arc<str>,
    pub cache_enabled: bool,
    pub ttl_secs: u64,
}

impl AdminState {
    pub fn new(proxy: ProxyState, admin: &AdminConfig, cache: &CacheConfig) -> Self {
        Self {
            proxy,
            api_key: Arc::from(admin.api_key.as_str()),
            cache_enabled: cache.enabled,
            ttl_secs: cache.ttl_secs,
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .route("/admin/cache", get(get_cache))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin router until the listener fails.
pub async fn serve(listener: TcpListener, state: AdminState) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Admin surface listening");
    }
    let result = axum::serve(listener, setup_admin_router(state)).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Admin surface stopped");
    }
    result
}
