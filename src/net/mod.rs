//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (non-blocking bind, backlog)
//!     → event_loop.rs (accept drain, backend reservation, dispatch)
//!     → session.rs (per-connection relay state machine)
//!
//! Session States:
//!     ConnectingBackend → AwaitingClientRequest → AwaitingBackendResponse → Done
//! ```
//!
//! # Design Decisions
//! - One thread owns every socket; sessions never block it
//! - Each session holds its backend reservation until teardown
//! - A failing session is torn down alone

pub mod connection;
pub mod event_loop;
pub mod listener;
pub mod session;

pub use connection::{ConnectionId, Endpoint, SessionState};
pub use event_loop::{EventLoop, EventLoopError};
pub use session::{Session, SessionError};
