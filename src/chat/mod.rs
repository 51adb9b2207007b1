//! Chat protocol subsystem.
//!
//! # Data Flow
//! ```text
//! WebSocket upgrade
//!     → auth.rs (authorize_connection call, Identity, hello)
//!     → session.rs (per-connection state machine)
//!         → envelope.rs (decode client call frames)
//!         → router.rs (in-flight table, method → backend path)
//!         → backend.rs (HTTP POST to backend)
//!         → translator.rs (status/body → object or close frame)
//!     → result frame or close frame to client
//! ```
//!
//! # Design Decisions
//! - One task per connection owns all of its state
//! - Every call runs in its own task; completions return to the owner
//! - Any failure closes the connection with a code from error.rs

pub mod auth;
pub mod backend;
pub mod envelope;
pub mod error;
pub mod router;
pub mod session;
pub mod translator;

pub use auth::{AuthContext, Identity};
pub use backend::{BackendClient, BackendResponse};
pub use error::{ChatError, CloseReason};
pub use session::Session;

use crate::config::GatewayConfig;

/// Configuration snapshot plus the backend client built from it.
///
/// A connection keeps the runtime it was accepted with until it closes.
pub struct Runtime {
    pub config: GatewayConfig,
    pub backend: BackendClient,
}

impl Runtime {
    pub fn new(config: GatewayConfig) -> Self {
        let backend = BackendClient::new(&config.backend);
        Self { config, backend }
    }
}
