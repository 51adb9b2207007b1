//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the chat gateway.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// WebSocket chat endpoint settings.
    pub chat: ChatConfig,

    /// HTTP backend the chat calls are forwarded to.
    pub backend: BackendConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent WebSocket sessions (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// WebSocket chat endpoint configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Path the WebSocket upgrade is served on.
    pub path: String,

    /// Largest client frame accepted, in bytes.
    pub max_message_size: usize,

    /// Maximum number of pending backend calls per connection.
    pub max_in_flight: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            path: "/swindon-chat".to_string(),
            max_message_size: 64 * 1024,
            max_in_flight: 256,
        }
    }
}

/// Backend HTTP service configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL every call path is appended to (e.g., "http://127.0.0.1:8081").
    pub base_url: String,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total time allowed for a backend call (send + full response read) in seconds.
    pub request_timeout_secs: u64,

    /// Largest backend response body accepted, in bytes.
    pub max_response_size: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8081".to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            max_response_size: 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: GatewayConfig = toml::from_str("").unwrap();
        assert_eq!(config.chat.path, "/swindon-chat");
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.listener.max_connections, 10_000);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [backend]
            base_url = "http://backend.local:9000"

            [chat]
            max_in_flight = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.base_url, "http://backend.local:9000");
        assert_eq!(config.backend.connect_timeout_secs, 5);
        assert_eq!(config.chat.max_in_flight, 4);
        assert_eq!(config.chat.path, "/swindon-chat");
    }
}
