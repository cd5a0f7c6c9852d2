//! Read-aloud provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;
use super::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS, READALOUD_WS_URL,
    SEND_RETRY_DELAY_MS,
};

/// Transport, timeout and retry settings for `ReadAloudTTS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadAloudConfig {
    /// WebSocket endpoint (overridable for local testing)
    pub endpoint: String,

    /// Maximum bytes per outbound text frame
    pub chunk_size: usize,

    /// WebSocket handshake timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Deadline for one complete exchange (milliseconds)
    pub request_timeout_ms: u64,

    /// Delay before the single send-level retry (milliseconds)
    pub send_retry_delay_ms: u64,

    /// Attempt and connection retry budgets
    pub retry: RetryPolicy,
}

impl Default for ReadAloudConfig {
    fn default() -> Self {
        Self {
            endpoint: READALOUD_WS_URL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            send_retry_delay_ms: SEND_RETRY_DELAY_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReadAloudConfig {
    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[inline]
    pub fn send_retry_delay(&self) -> Duration {
        Duration::from_millis(self.send_retry_delay_ms)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("wss://") || self.endpoint.starts_with("ws://")) {
            return Err(format!(
                "endpoint must be a ws:// or wss:// URL, got {}",
                self.endpoint
            ));
        }

        if self.chunk_size < 64 {
            return Err(format!(
                "chunk_size must be at least 64 bytes, got {}",
                self.chunk_size
            ));
        }

        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err("timeouts must be greater than zero".to_string());
        }

        if self.retry.max_connection_attempts == 0 {
            return Err("retry.max_connection_attempts must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReadAloudConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_http_endpoint() {
        let config = ReadAloudConfig {
            endpoint: "https://example.com".to_string(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("ws://"));
    }

    #[test]
    fn test_validate_rejects_zero_connection_attempts() {
        let mut config = ReadAloudConfig::default();
        config.retry.max_connection_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: ReadAloudConfig = serde_yaml::from_str("chunk_size: 1024\n").unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.endpoint, READALOUD_WS_URL);
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
