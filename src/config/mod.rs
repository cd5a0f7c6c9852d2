//! Configuration module for the read-aloud client
//!
//! Configuration comes from YAML files and environment variables (including a
//! `.env` file loaded by the binary). Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable names and loading
//! - `merge`: Merging YAML and environment configurations
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use readaloud_tts::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config_path = PathBuf::from("config.yaml");
//! let config = ClientConfig::from_file(&config_path)?;
//!
//! println!("Caching audio in {}", config.cache_dir.display());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

pub mod env;
mod merge;
mod utils;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::cache::CacheOptions;
use crate::core::tts::{Pronunciation, ReadAloudConfig, SpeechSettings};

/// Cache directory used when none is configured
pub const DEFAULT_CACHE_DIR: &str = ".cache/readaloud";

/// Client configuration
///
/// Holds everything needed to build a synthesizer, its cache and the batch
/// runner.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Directory holding `{fingerprint}.{ext}` artifacts
    pub cache_dir: PathBuf,
    /// Serialize concurrent requests for the same fingerprint
    pub dedupe_in_flight: bool,
    /// Default voice, prosody and output format
    pub speech: SpeechSettings,
    /// Transport, timeout and retry settings
    pub readaloud: ReadAloudConfig,
    /// Maximum items synthesized at once by batch runs
    pub batch_concurrency: usize,
    /// Literal substitutions applied before synthesis
    pub pronunciations: Vec<Pronunciation>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            dedupe_in_flight: true,
            speech: SpeechSettings::default(),
            readaloud: ReadAloudConfig::default(),
            batch_concurrency: crate::core::DEFAULT_BATCH_CONCURRENCY,
            pronunciations: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded in main.rs, so by now it is part of the environment
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;

        config.validate()?;

        Ok(config)
    }

    /// Validates the merged configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache directory must not be empty".to_string());
        }

        if self.batch_concurrency == 0 {
            return Err("batch concurrency must be at least 1".to_string());
        }

        if !(0..=100).contains(&self.speech.volume) {
            return Err(format!(
                "volume must be between 0 and 100, got {}",
                self.speech.volume
            ));
        }

        match self.speech.style_intensity {
            Some(intensity) if !(1..=100).contains(&intensity) => {
                return Err(format!(
                    "style intensity must be between 1 and 100, got {intensity}"
                ));
            }
            _ => {}
        }

        if let Some(empty) = self.pronunciations.iter().find(|p| p.word.is_empty()) {
            return Err(format!(
                "pronunciation entries need a non-empty word (replacement '{}')",
                empty.pronunciation
            ));
        }

        self.speech.validate().map_err(|e| e.to_string())?;
        self.readaloud.validate()
    }

    /// Cache options derived from this configuration.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions::new(self.cache_dir.clone())
            .with_pronunciations(self.pronunciations.clone())
            .with_dedupe_in_flight(self.dedupe_in_flight)
    }
}

#[cfg(test)]
mod tests {
    use super::env::*;
    use super::*;
    use crate::core::tts::OutputFormat;
    use serial_test::serial;
    use std::env as std_env;
    use std::fs;
    use tempfile::TempDir;

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for name in ALL_ENV_VARS {
                std_env::remove_var(name);
            }
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.batch_concurrency, 4);
        assert!(config.dedupe_in_flight);
        assert_eq!(config.readaloud.retry.max_retries, 9);
        assert_eq!(config.readaloud.retry.max_connection_attempts, 10);
    }

    #[test]
    #[serial]
    fn test_from_env_values() {
        cleanup_env_vars();

        unsafe {
            std_env::set_var(ENV_CACHE_DIR, "/tmp/env-cache");
            std_env::set_var(ENV_VOICE, "en-US-GuyNeural");
            std_env::set_var(ENV_SPEED, "130");
            std_env::set_var(ENV_OUTPUT_FORMAT, "ogg");
            std_env::set_var(ENV_MAX_RETRIES, "2");
            std_env::set_var(ENV_DEDUPE_IN_FLIGHT, "false");
            std_env::set_var(
                ENV_PRONUNCIATIONS_JSON,
                r#"[{"word":"SQL","pronunciation":"sequel"}]"#,
            );
        }

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/env-cache"));
        assert_eq!(config.speech.voice, "en-US-GuyNeural");
        assert_eq!(config.speech.speed, 130);
        assert_eq!(config.speech.output_format, OutputFormat::OggOpus);
        assert_eq!(config.readaloud.retry.max_retries, 2);
        assert!(!config.dedupe_in_flight);
        assert_eq!(config.pronunciations.len(), 1);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_number() {
        cleanup_env_vars();

        unsafe {
            std_env::set_var(ENV_CHUNK_SIZE, "big");
        }

        let err = ClientConfig::from_env().unwrap_err();
        assert!(err.to_string().contains(ENV_CHUNK_SIZE));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_pronunciations_json() {
        cleanup_env_vars();

        unsafe {
            std_env::set_var(ENV_PRONUNCIATIONS_JSON, "not json");
        }

        let err = ClientConfig::from_env().unwrap_err();
        assert!(err.to_string().contains(ENV_PRONUNCIATIONS_JSON));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_only() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
cache:
  dir: "/tmp/yaml-cache"

voice:
  name: "en-GB-RyanNeural"
  pitch: 90
  style: "cheerful"
  style_intensity: 50

connection:
  endpoint: "ws://127.0.0.1:9000/tts"
  request_timeout_ms: 15000

retry:
  max_connection_attempts: 3

batch:
  concurrency: 6

pronunciations:
  - word: "GIF"
    pronunciation: "jif"
"#;

        fs::write(&config_path, yaml_content).unwrap();

        let config = ClientConfig::from_file(&config_path).unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/yaml-cache"));
        assert_eq!(config.speech.voice, "en-GB-RyanNeural");
        assert_eq!(config.speech.pitch, 90);
        assert_eq!(config.speech.speed, 100);
        assert_eq!(config.speech.style.as_deref(), Some("cheerful"));
        assert_eq!(config.speech.style_intensity, Some(50));
        assert_eq!(config.readaloud.endpoint, "ws://127.0.0.1:9000/tts");
        assert_eq!(config.readaloud.request_timeout_ms, 15000);
        assert_eq!(config.readaloud.chunk_size, 4096);
        assert_eq!(config.readaloud.retry.max_connection_attempts, 3);
        assert_eq!(config.readaloud.retry.max_retries, 9);
        assert_eq!(config.batch_concurrency, 6);
        assert_eq!(config.pronunciations[0].word, "GIF");

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            "voice:\n  name: \"yaml-voice\"\nbatch:\n  concurrency: 2\n",
        )
        .unwrap();

        unsafe {
            std_env::set_var(ENV_VOICE, "env-voice");
            std_env::set_var(ENV_BATCH_CONCURRENCY, "9");
            std_env::set_var(ENV_SPEED, "110");
        }

        let config = ClientConfig::from_file(&config_path).unwrap();

        // YAML wins where set, ENV fills the rest
        assert_eq!(config.speech.voice, "yaml-voice");
        assert_eq!(config.batch_concurrency, 2);
        assert_eq!(config.speech.speed, 110);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_validation_failure() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "connection:\n  endpoint: \"https://example.com\"\n").unwrap();

        let err = ClientConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("ws://"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_unknown_output_format() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "voice:\n  output_format: \"flac\"\n").unwrap();

        let err = ClientConfig::from_file(&config_path).unwrap_err();
        assert!(err.to_string().contains("flac"));

        cleanup_env_vars();
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = ClientConfig::default();
        assert!(config.validate().is_ok());

        config.speech.volume = 150;
        assert!(config.validate().unwrap_err().contains("volume"));

        let mut config = ClientConfig::default();
        config.speech.style_intensity = Some(0);
        assert!(config.validate().unwrap_err().contains("intensity"));

        let mut config = ClientConfig::default();
        config.batch_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.speech.voice = String::new();
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.pronunciations.push(Pronunciation {
            word: String::new(),
            pronunciation: "x".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_options() {
        let config = ClientConfig {
            cache_dir: PathBuf::from("/tmp/options"),
            dedupe_in_flight: false,
            ..Default::default()
        };

        let options = config.cache_options();
        assert_eq!(options.cache_dir, PathBuf::from("/tmp/options"));
        assert!(!options.dedupe_in_flight);
        assert!(options.pronunciations.is_empty());
    }
}
