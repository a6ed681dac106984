//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Client accepted
//!     → least_conn.rs (scan counters, claim the least loaded slot)
//!     → Reservation (owned by the session)
//!     → registry.rs (index → backend address)
//!     → Session connects to the backend
//!
//! Session torn down
//!     → Reservation released (explicitly or on drop)
//! ```
//!
//! # Design Decisions
//! - The roster is immutable after startup; only the counters change
//! - Counters are behind a mutex so auxiliary threads can read them safely
//! - A reservation is an owned guard, so a slot cannot be released twice

pub mod backend;
pub mod least_conn;
pub mod registry;

pub use backend::{Backend, BackendError};
pub use least_conn::{LeastConnections, Reservation};
pub use registry::BackendRegistry;
