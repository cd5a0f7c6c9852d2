use serde::Deserialize;
use std::path::PathBuf;

use crate::core::tts::Pronunciation;

/// YAML configuration structure
///
/// Every field is optional so a file only needs to carry the values it
/// overrides; anything missing falls back to the environment and then to the
/// built-in defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub cache: Option<CacheYaml>,
    pub voice: Option<VoiceYaml>,
    pub connection: Option<ConnectionYaml>,
    pub retry: Option<RetryYaml>,
    pub batch: Option<BatchYaml>,
    pub pronunciations: Option<Vec<Pronunciation>>,
}

/// Audio cache configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheYaml {
    pub dir: Option<String>,
    pub dedupe_in_flight: Option<bool>,
}

/// Default voice and prosody
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceYaml {
    pub name: Option<String>,
    pub speed: Option<i32>,
    pub pitch: Option<i32>,
    pub volume: Option<i32>,
    pub style: Option<String>,
    pub style_intensity: Option<u32>,
    pub role: Option<String>,
    pub output_format: Option<String>,
}

/// WebSocket connection configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConnectionYaml {
    pub endpoint: Option<String>,
    pub chunk_size: Option<usize>,
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub send_retry_delay_ms: Option<u64>,
}

/// Attempt and reconnect budgets
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RetryYaml {
    pub max_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_connection_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
}

/// Batch synthesis configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BatchYaml {
    pub concurrency: Option<usize>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
