use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub backends: usize,
    pub active_connections: usize,
}

#[derive(Debug, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub address: String,
    pub port: u16,
    pub active_connections: usize,
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub enabled: bool,
    pub entries: usize,
    pub ttl_secs: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        backends: state.proxy.registry.len(),
        active_connections: state.proxy.selector.active_counts().iter().sum(),
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let counts = state.proxy.selector.active_counts();
    let statuses = state
        .proxy
        .registry
        .list()
        .iter()
        .zip(counts)
        .map(|(backend, active)| BackendStatus {
            name: backend.name.clone(),
            address: backend.address.clone(),
            port: backend.port,
            active_connections: active,
        })
        .collect();

    Json(statuses)
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheStatus> {
    // Expired entries are not reported.
    state.proxy.cache.expire();
    Json(CacheStatus {
        enabled: state.cache_enabled,
        entries: state.proxy.cache.len(),
        ttl_secs: state.ttl_secs,
    })
}
