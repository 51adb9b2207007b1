//! Call routing and correlation.
//!
//! # Responsibilities
//! - Track pending calls by `request_id`
//! - Turn a client call into its backend path and body
//! - Run one backend call and classify the answer
//!
//! # Design Decisions
//! - The in-flight table is owned by the session task; call tasks only
//!   report completions, so no lock is needed
//! - Dispatch is a pure string transform plus forward-everything policy
//! - The client's `connection_id`, if any, is overwritten with the real one

use axum::http::HeaderValue;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;

use crate::chat::backend::BackendClient;
use crate::chat::envelope::{CallEnvelope, ClientCall, MethodName, RequestId};
use crate::chat::error::ChatError;
use crate::chat::translator::translate;
use crate::net::ConnectionId;

/// Metadata kept for a call between dispatch and completion.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub request_id: RequestId,
    pub method: MethodName,
    pub started: Instant,
}

/// Pending calls of one connection, keyed by `request_id`.
#[derive(Debug)]
pub struct InFlight {
    calls: HashMap<String, PendingCall>,
    limit: usize,
}

impl InFlight {
    pub fn new(limit: usize) -> Self {
        Self {
            calls: HashMap::new(),
            limit,
        }
    }

    /// Register a call. Fails if its id is already pending or the table is full.
    pub fn insert(&mut self, request_id: &RequestId, method: &MethodName) -> Result<String, ChatError> {
        let key = request_id.key();
        if self.calls.contains_key(&key) {
            return Err(ChatError::DuplicateRequest(key));
        }
        if self.calls.len() >= self.limit {
            return Err(ChatError::TooManyCalls(self.limit));
        }
        self.calls.insert(
            key.clone(),
            PendingCall {
                request_id: request_id.clone(),
                method: method.clone(),
                started: Instant::now(),
            },
        );
        Ok(key)
    }

    /// Remove a finished call.
    pub fn complete(&mut self, key: &str) -> Option<PendingCall> {
        self.calls.remove(key)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// A call ready to be sent to the backend.
#[derive(Debug, Clone)]
pub struct RoutedCall {
    pub path: String,
    pub envelope: CallEnvelope,
}

/// Build the backend request for a client call.
pub fn route(call: ClientCall, connection_id: &ConnectionId) -> RoutedCall {
    let mut meta = call.meta;
    meta.insert("connection_id".to_string(), json!(connection_id.as_str()));
    RoutedCall {
        path: call.method.backend_path(),
        envelope: CallEnvelope {
            meta,
            args: call.args,
            kwargs: call.kwargs,
        },
    }
}

/// Result of one backend call, reported back to the owning session.
#[derive(Debug)]
pub struct CallCompletion {
    pub key: String,
    pub result: Result<Value, ChatError>,
}

/// Perform a routed call and classify the answer.
pub async fn forward(
    backend: BackendClient,
    authorization: Option<HeaderValue>,
    key: String,
    call: RoutedCall,
) -> CallCompletion {
    let result: Result<Value, ChatError> = async {
        let response = backend
            .call(&call.path, &call.envelope, authorization.as_ref())
            .await?;
        translate(&response).map(Value::Object)
    }
    .await;
    CallCompletion { key, result }
}
