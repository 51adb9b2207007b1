//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Sessions send 1001 → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, close sessions, drain
//! - Drain has a timeout: the process exits after the deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
