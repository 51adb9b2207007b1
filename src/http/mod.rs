//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, graceful shutdown)
//!     → request.rs (x-request-id set + propagated)
//!     → websocket.rs (upgrade on the chat path, capture AuthContext)
//!     → chat::Session (one task per connection)
//! ```

pub mod request;
pub mod server;
pub mod websocket;

pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
