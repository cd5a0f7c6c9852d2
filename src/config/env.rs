use super::ClientConfig;
use super::merge::merge_config;

// Environment variable names
pub const ENV_CACHE_DIR: &str = "READALOUD_CACHE_DIR";
pub const ENV_DEDUPE_IN_FLIGHT: &str = "READALOUD_DEDUPE_IN_FLIGHT";
pub const ENV_VOICE: &str = "READALOUD_VOICE";
pub const ENV_SPEED: &str = "READALOUD_SPEED";
pub const ENV_PITCH: &str = "READALOUD_PITCH";
pub const ENV_VOLUME: &str = "READALOUD_VOLUME";
pub const ENV_STYLE: &str = "READALOUD_STYLE";
pub const ENV_STYLE_INTENSITY: &str = "READALOUD_STYLE_INTENSITY";
pub const ENV_ROLE: &str = "READALOUD_ROLE";
pub const ENV_OUTPUT_FORMAT: &str = "READALOUD_OUTPUT_FORMAT";
pub const ENV_ENDPOINT: &str = "READALOUD_ENDPOINT";
pub const ENV_CHUNK_SIZE: &str = "READALOUD_CHUNK_SIZE";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "READALOUD_CONNECT_TIMEOUT_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "READALOUD_REQUEST_TIMEOUT_MS";
pub const ENV_SEND_RETRY_DELAY_MS: &str = "READALOUD_SEND_RETRY_DELAY_MS";
pub const ENV_MAX_RETRIES: &str = "READALOUD_MAX_RETRIES";
pub const ENV_RETRY_DELAY_MS: &str = "READALOUD_RETRY_DELAY_MS";
pub const ENV_MAX_CONNECTION_ATTEMPTS: &str = "READALOUD_MAX_CONNECTION_ATTEMPTS";
pub const ENV_RECONNECT_DELAY_MS: &str = "READALOUD_RECONNECT_DELAY_MS";
pub const ENV_BATCH_CONCURRENCY: &str = "READALOUD_BATCH_CONCURRENCY";
/// JSON array of `{"word": ..., "pronunciation": ...}` objects
pub const ENV_PRONUNCIATIONS_JSON: &str = "READALOUD_PRONUNCIATIONS_JSON";

/// Every variable the loader reads.
pub const ALL_ENV_VARS: &[&str] = &[
    ENV_CACHE_DIR,
    ENV_DEDUPE_IN_FLIGHT,
    ENV_VOICE,
    ENV_SPEED,
    ENV_PITCH,
    ENV_VOLUME,
    ENV_STYLE,
    ENV_STYLE_INTENSITY,
    ENV_ROLE,
    ENV_OUTPUT_FORMAT,
    ENV_ENDPOINT,
    ENV_CHUNK_SIZE,
    ENV_CONNECT_TIMEOUT_MS,
    ENV_REQUEST_TIMEOUT_MS,
    ENV_SEND_RETRY_DELAY_MS,
    ENV_MAX_RETRIES,
    ENV_RETRY_DELAY_MS,
    ENV_MAX_CONNECTION_ATTEMPTS,
    ENV_RECONNECT_DELAY_MS,
    ENV_BATCH_CONCURRENCY,
    ENV_PRONUNCIATIONS_JSON,
];

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Reads configuration from environment variables, with defaults for
    /// everything unset. The `.env` file is loaded by the binary at startup,
    /// so its values are already visible here.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or the resulting
    /// configuration fails validation.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge_config(None)?;
        config.validate()?;
        Ok(config)
    }
}
