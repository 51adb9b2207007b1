//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming WebSocket upgrade
//!     → connection.rs (slot reservation, connection id, lifecycle tracking)
//!     → Hand off to the chat session
//!
//! Connection States:
//!     Connecting → Authenticating → Active → Closing → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded session count prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod connection;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionState, ConnectionTracker};
