//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check addresses and the backend URL parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("backend.base_url: {0}")]
    InvalidBackendUrl(String),

    #[error("chat.path must start with '/', got '{0}'")]
    InvalidChatPath(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    if !config.chat.path.starts_with('/') {
        errors.push(ValidationError::InvalidChatPath(config.chat.path.clone()));
    }
    if config.chat.max_message_size == 0 {
        errors.push(ValidationError::Zero("chat.max_message_size"));
    }
    if config.chat.max_in_flight == 0 {
        errors.push(ValidationError::Zero("chat.max_in_flight"));
    }

    match Url::parse(&config.backend.base_url) {
        Ok(url) if url.scheme() != "http" => errors.push(ValidationError::InvalidBackendUrl(
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Ok(url) if url.host().is_none() => {
            errors.push(ValidationError::InvalidBackendUrl("missing host".to_string()))
        }
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::InvalidBackendUrl(e.to_string())),
    }
    if config.backend.connect_timeout_secs == 0 {
        errors.push(ValidationError::Zero("backend.connect_timeout_secs"));
    }
    if config.backend.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("backend.request_timeout_secs"));
    }
    if config.backend.max_response_size == 0 {
        errors.push(ValidationError::Zero("backend.max_response_size"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
