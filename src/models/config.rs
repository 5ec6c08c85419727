//! Core Configuration
//!
//! Enumerated configuration for the client core. The host shell constructs
//! this; nothing here is read from disk.

use serde::{Deserialize, Serialize};

/// Configuration for the client core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Base URL of the bidirectional socket (ws:// or wss://)
    pub socket_base_url: String,
    /// Base URL of the HTTP API (submit, cancel, whoami)
    pub http_base_url: String,
    /// Base delay in milliseconds for socket reconnect backoff
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Maximum reconnect attempts before giving up
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Most recent messages retained in the timeline
    #[serde(default = "default_message_retention_count")]
    pub message_retention_count: usize,
    /// Messages older than this are dropped by cleanup
    #[serde(default = "default_message_max_age_days")]
    pub message_max_age_days: i64,
    /// Timeout for discovery endpoints (whoami, cancel)
    #[serde(default = "default_http_discovery_timeout_ms")]
    pub http_discovery_timeout_ms: u64,
    /// Synthesize a guest identity when all other sources fail
    #[serde(default = "default_allow_guest_identity")]
    pub allow_guest_identity: bool,
}

fn default_reconnect_base_delay_ms() -> u64 {
    5000
}

fn default_reconnect_max_attempts() -> u32 {
    10
}

fn default_message_retention_count() -> usize {
    100
}

fn default_message_max_age_days() -> i64 {
    7
}

fn default_http_discovery_timeout_ms() -> u64 {
    8000
}

fn default_allow_guest_identity() -> bool {
    true
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            socket_base_url: "ws://localhost:3000".to_string(),
            http_base_url: "http://localhost:3000".to_string(),
            reconnect_base_delay_ms: 5000,
            reconnect_max_attempts: 10,
            message_retention_count: 100,
            message_max_age_days: 7,
            http_discovery_timeout_ms: 8000,
            allow_guest_identity: true,
        }
    }
}

impl CoreConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.socket_base_url.is_empty() {
            return Err("socket_base_url must not be empty".to_string());
        }
        if self.http_base_url.is_empty() {
            return Err("http_base_url must not be empty".to_string());
        }
        if self.message_retention_count == 0 {
            return Err("message_retention_count must be at least 1".to_string());
        }
        if self.message_max_age_days <= 0 {
            return Err("message_max_age_days must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.reconnect_base_delay_ms, 5000);
        assert_eq!(config.reconnect_max_attempts, 10);
        assert_eq!(config.message_retention_count, 100);
        assert_eq!(config.message_max_age_days, 7);
        assert_eq!(config.http_discovery_timeout_ms, 8000);
        assert!(config.allow_guest_identity);
    }

    #[test]
    fn test_validate() {
        assert!(CoreConfig::default().validate().is_ok());

        let config = CoreConfig {
            http_base_url: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CoreConfig {
            message_retention_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: CoreConfig = serde_json::from_str(
            r#"{"socket_base_url":"wss://agent.example","http_base_url":"https://agent.example"}"#,
        )
        .unwrap();
        assert_eq!(config.reconnect_base_delay_ms, 5000);
        assert_eq!(config.message_retention_count, 100);
    }
}
