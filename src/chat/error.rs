//! Error taxonomy for chat sessions and its mapping onto WebSocket close frames.
//!
//! Every failure on a connection ends up as a [`CloseReason`]; raw backend
//! bodies and transport error text stay in the logs.

use std::time::Duration;
use thiserror::Error;

use crate::chat::envelope::EnvelopeError;
use crate::chat::translator::status_close_reason;

/// Reason string sent for every backend-originated close.
pub const BACKEND_ERROR: &str = "backend_error";

/// Close code used for anything not on the exposed status allow-list.
pub const INTERNAL_ERROR_CODE: u16 = 4500;

/// Numeric code and reason carried by a WebSocket close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: &'static str,
}

impl CloseReason {
    pub const INTERNAL: CloseReason = CloseReason::new(INTERNAL_ERROR_CODE, BACKEND_ERROR);
    pub const BAD_REQUEST: CloseReason = CloseReason::new(INTERNAL_ERROR_CODE, "bad_request");
    pub const TOO_MANY_CALLS: CloseReason = CloseReason::new(INTERNAL_ERROR_CODE, "too_many_calls");
    /// Standard "going away" code used when the gateway shuts down.
    pub const SHUTDOWN: CloseReason = CloseReason::new(1001, "shutdown");

    pub const fn new(code: u16, reason: &'static str) -> Self {
        Self { code, reason }
    }
}

/// Transport-level failures talking to the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection refused, reset, DNS failure and the like.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// No complete response within the configured deadline.
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be read in full.
    #[error("failed to read backend response: {0}")]
    Read(String),

    /// The outgoing request could not be built.
    #[error("invalid backend request: {0}")]
    InvalidRequest(String),
}

/// Anything that terminates a chat session.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[from] EnvelopeError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Backend answered with a non-200 status.
    #[error("backend returned status {0}")]
    BackendStatus(u16),

    /// Backend answered 200 with a body we cannot use.
    #[error("invalid backend response: {0}")]
    BackendSchema(String),

    #[error("request_id {0} is already pending")]
    DuplicateRequest(String),

    #[error("more than {0} calls in flight")]
    TooManyCalls(usize),
}

impl ChatError {
    /// The close frame this error is reported to the client with.
    pub fn close_reason(&self) -> CloseReason {
        match self {
            ChatError::MalformedEnvelope(_) | ChatError::DuplicateRequest(_) => {
                CloseReason::BAD_REQUEST
            }
            ChatError::TooManyCalls(_) => CloseReason::TOO_MANY_CALLS,
            ChatError::BackendStatus(status) => status_close_reason(*status),
            ChatError::Backend(_) | ChatError::BackendSchema(_) => CloseReason::INTERNAL,
        }
    }
}
