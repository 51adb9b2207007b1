//! Backend HTTP client.
//!
//! # Responsibilities
//! - POST `[meta, args, kwargs]` as JSON to `<base_url><path>`
//! - Enforce connect and whole-call deadlines
//! - Hand the raw status and body to the translator
//!
//! # Design Decisions
//! - One pooled hyper client per runtime; cloning is cheap
//! - No retries: every call is a single POST
//! - Client credentials are never sent as HTTP headers; the auth call carries
//!   them in its body

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Method, Request, StatusCode, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use url::Url;

use crate::chat::envelope::CallEnvelope;
use crate::chat::error::BackendError;
use crate::config::BackendConfig;
use crate::observability::metrics;

/// Raw backend answer, consumed by the status translator.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// HTTP client bound to one backend base URL.
#[derive(Clone)]
pub struct BackendClient {
    client: Client<HttpConnector, Body>,
    base_url: String,
    request_timeout: Duration,
    max_response_size: usize,
}

impl BackendClient {
    /// Create a client from validated backend configuration.
    pub fn new(config: &BackendConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        // Validation guarantees the URL parses; fall back to the raw string otherwise.
        let base_url = Url::parse(&config.base_url)
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .unwrap_or_else(|_| config.base_url.trim_end_matches('/').to_string());

        Self {
            client,
            base_url,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_response_size: config.max_response_size,
        }
    }

    /// Full URL for a backend path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue one POST call and read the full response.
    ///
    /// `authorization` is attached as the `Authorization` header when given.
    pub async fn call(
        &self,
        path: &str,
        envelope: &CallEnvelope,
        authorization: Option<&HeaderValue>,
    ) -> Result<BackendResponse, BackendError> {
        let start = Instant::now();
        let request = self.build_request(path, envelope, authorization)?;

        let result = timeout(self.request_timeout, self.perform(request)).await;
        metrics::record_backend_request(path_kind(path), start);

        match result {
            Ok(response) => response,
            Err(_) => Err(BackendError::Timeout(self.request_timeout)),
        }
    }

    fn build_request(
        &self,
        path: &str,
        envelope: &CallEnvelope,
        authorization: Option<&HeaderValue>,
    ) -> Result<Request<Body>, BackendError> {
        let uri: Uri = self
            .url_for(path)
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| BackendError::InvalidRequest(e.to_string()))?;
        let body = serde_json::to_vec(envelope)
            .map_err(|e| BackendError::InvalidRequest(e.to_string()))?;

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value.clone());
        }
        builder
            .body(Body::from(body))
            .map_err(|e| BackendError::InvalidRequest(e.to_string()))
    }

    async fn perform(&self, request: Request<Body>) -> Result<BackendResponse, BackendError> {
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.max_response_size)
            .await
            .map_err(|e| BackendError::Read(e.to_string()))?;

        Ok(BackendResponse {
            status: parts.status,
            body,
        })
    }
}

fn path_kind(path: &str) -> &'static str {
    if path == crate::chat::auth::AUTHORIZE_PATH {
        "auth"
    } else {
        "call"
    }
}
