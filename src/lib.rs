//! Least-connections TCP reverse proxy with a TTL response cache.

pub mod admin;
pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use lifecycle::{ProxyState, Shutdown};
pub use net::EventLoop;
