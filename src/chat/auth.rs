//! Connection authorization handshake.
//!
//! # Flow
//! ```text
//! upgrade request ──► AuthContext { http_cookie, http_authorization, url_querystring }
//!                          │
//!                          ▼
//! POST /tangle/authorize_connection  [{connection_id}, [], {AuthContext..}]
//!                          │
//!                 translator::translate
//!                          │
//!              ┌───────────┴───────────┐
//!              ▼                       ▼
//!   Identity (user_id required)    close frame
//!   → ["hello", {}, identity]
//! ```
//!
//! # Design Decisions
//! - Client credentials travel in the body, never as backend HTTP headers
//! - `user_id` is validated on top of the generic translator; integers are
//!   normalized to strings, anything else is a schema error
//! - Extra identity fields are passed to the client untouched

use axum::http::{header, HeaderMap, HeaderValue, Uri};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use crate::chat::backend::BackendClient;
use crate::chat::envelope::{CallEnvelope, JsonObject, Reply};
use crate::chat::error::ChatError;
use crate::chat::translator::translate;
use crate::net::ConnectionId;

/// Backend path of the handshake call.
pub const AUTHORIZE_PATH: &str = "/tangle/authorize_connection";

/// Client credentials captured from the upgrade request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub http_cookie: Option<String>,
    pub http_authorization: Option<String>,
    pub url_querystring: String,
}

impl AuthContext {
    /// Capture the headers and query string of an upgrade request.
    ///
    /// Repeated `Cookie` headers are joined with `"; "`. Values that are not
    /// valid UTF-8 are dropped with a warning rather than rewritten.
    pub fn from_request(headers: &HeaderMap, uri: &Uri) -> Self {
        let cookies: Vec<&str> = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| utf8_header(header::COOKIE.as_str(), value))
            .collect();
        let http_authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| utf8_header(header::AUTHORIZATION.as_str(), value))
            .map(str::to_string);

        Self {
            http_cookie: (!cookies.is_empty()).then(|| cookies.join("; ")),
            http_authorization,
            url_querystring: uri.query().unwrap_or_default().to_string(),
        }
    }

    /// Body of the `authorize_connection` call.
    pub fn to_envelope(&self, connection_id: &ConnectionId) -> CallEnvelope {
        let mut meta = JsonObject::new();
        meta.insert("connection_id".to_string(), json!(connection_id.as_str()));

        let mut kwargs = JsonObject::new();
        kwargs.insert("http_cookie".to_string(), json!(self.http_cookie));
        kwargs.insert("http_authorization".to_string(), json!(self.http_authorization));
        kwargs.insert("url_querystring".to_string(), json!(self.url_querystring));

        CallEnvelope {
            meta,
            args: Vec::new(),
            kwargs,
        }
    }
}

fn utf8_header<'a>(name: &str, value: &'a HeaderValue) -> Option<&'a str> {
    match std::str::from_utf8(value.as_bytes()) {
        Ok(text) => Some(text),
        Err(_) => {
            tracing::warn!(header = name, "Dropping non-UTF-8 header value from auth context");
            None
        }
    }
}

/// Authenticated user of a session.
#[derive(Debug, Clone)]
pub struct Identity {
    user_id: String,
    fields: JsonObject,
    authorization: Option<HeaderValue>,
}

impl Identity {
    /// Validate the backend's `authorize_connection` answer.
    pub fn from_auth_body(mut body: JsonObject) -> Result<Self, ChatError> {
        let user_id = match body.get("user_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            Some(other) => {
                return Err(ChatError::BackendSchema(format!(
                    "user_id must be a string or an integer, got {other}"
                )))
            }
            None => return Err(ChatError::BackendSchema("user_id is missing".to_string())),
        };
        body.insert("user_id".to_string(), Value::String(user_id.clone()));

        let token = STANDARD.encode(json!({ "user_id": user_id }).to_string());
        let authorization = HeaderValue::from_str(&format!("Tangle {token}")).ok();

        Ok(Self {
            user_id,
            fields: body,
            authorization,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// `Authorization` header attached to this user's backend calls.
    pub fn backend_authorization(&self) -> Option<&HeaderValue> {
        self.authorization.as_ref()
    }

    pub fn hello(&self) -> Reply {
        Reply::Hello(self.fields.clone())
    }
}

/// Run the handshake for one connection.
pub async fn authorize(
    backend: &BackendClient,
    connection_id: &ConnectionId,
    context: &AuthContext,
) -> Result<Identity, ChatError> {
    let envelope = context.to_envelope(connection_id);
    let response = backend.call(AUTHORIZE_PATH, &envelope, None).await?;
    let body = translate(&response)?;
    Identity::from_auth_body(body)
}
