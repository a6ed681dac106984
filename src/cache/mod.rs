//! Response cache.
//!
//! # Data Flow
//! ```text
//! Client request read
//!     → is_cacheable() (leading "GET")
//!     → store.rs lookup (sweep expired, first exact match)
//!         hit  → cached bytes written to client, backend never sees the request
//!         miss → request bytes kept as the key
//!
//! Backend response relayed
//!     → store.rs insert (sweep expired, prepend entry with TTL)
//! ```
//!
//! # Design Decisions
//! - Keys are raw request bytes; no HTTP parsing or normalization
//! - Expiry is lazy, there is no background sweeper
//! - No capacity bound: one entry per distinct request per TTL window

pub mod entry;
pub mod store;

pub use entry::{CacheEntry, MAX_KEY_LEN, MAX_VALUE_LEN};
pub use store::ResponseCache;

/// Requests starting with this prefix may be served from and stored in the cache.
pub const CACHEABLE_PREFIX: &[u8] = b"GET";

/// Whether a request is eligible for caching.
pub fn is_cacheable(request: &[u8]) -> bool {
    request.starts_with(CACHEABLE_PREFIX)
}
