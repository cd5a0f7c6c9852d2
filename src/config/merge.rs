use std::path::PathBuf;

use super::env::*;
use super::utils::{env_bool, env_parse, env_string};
use super::yaml::YamlConfig;
use super::{ClientConfig, DEFAULT_CACHE_DIR};
use crate::core::DEFAULT_BATCH_CONCURRENCY;
use crate::core::tts::readaloud::RetryPolicy;
use crate::core::tts::{OutputFormat, Pronunciation, ReadAloudConfig, SpeechSettings};

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // YAML > ENV > Default for values that parse from a string
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match $yaml_value {
                Some(value) => value,
                None => env_parse($env_var)?.unwrap_or($default),
            }
        };
    }

    // YAML > ENV for optional strings
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            $yaml_value.or_else(|| env_string($env_var))
        };
    }

    let cache = yaml.cache.unwrap_or_default();
    let voice = yaml.voice.unwrap_or_default();
    let connection = yaml.connection.unwrap_or_default();
    let retry = yaml.retry.unwrap_or_default();
    let batch = yaml.batch.unwrap_or_default();

    // Cache
    let cache_dir = get_optional!(ENV_CACHE_DIR, cache.dir)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
    let dedupe_in_flight = match cache.dedupe_in_flight {
        Some(value) => value,
        None => env_bool(ENV_DEDUPE_IN_FLIGHT)?.unwrap_or(true),
    };

    // Voice
    let defaults = SpeechSettings::default();
    let output_format = match get_optional!(ENV_OUTPUT_FORMAT, voice.output_format) {
        Some(raw) => raw.parse::<OutputFormat>()?,
        None => defaults.output_format,
    };
    let speech = SpeechSettings {
        voice: get_optional!(ENV_VOICE, voice.name).unwrap_or(defaults.voice),
        speed: get_parsed!(ENV_SPEED, voice.speed, defaults.speed),
        pitch: get_parsed!(ENV_PITCH, voice.pitch, defaults.pitch),
        volume: get_parsed!(ENV_VOLUME, voice.volume, defaults.volume),
        style: get_optional!(ENV_STYLE, voice.style),
        style_intensity: match voice.style_intensity {
            Some(value) => Some(value),
            None => env_parse(ENV_STYLE_INTENSITY)?,
        },
        role: get_optional!(ENV_ROLE, voice.role),
        output_format,
    };

    // Connection and retry
    let base = ReadAloudConfig::default();
    let base_retry = RetryPolicy::default();
    let readaloud = ReadAloudConfig {
        endpoint: get_optional!(ENV_ENDPOINT, connection.endpoint).unwrap_or(base.endpoint),
        chunk_size: get_parsed!(ENV_CHUNK_SIZE, connection.chunk_size, base.chunk_size),
        connect_timeout_ms: get_parsed!(
            ENV_CONNECT_TIMEOUT_MS,
            connection.connect_timeout_ms,
            base.connect_timeout_ms
        ),
        request_timeout_ms: get_parsed!(
            ENV_REQUEST_TIMEOUT_MS,
            connection.request_timeout_ms,
            base.request_timeout_ms
        ),
        send_retry_delay_ms: get_parsed!(
            ENV_SEND_RETRY_DELAY_MS,
            connection.send_retry_delay_ms,
            base.send_retry_delay_ms
        ),
        retry: RetryPolicy {
            max_retries: get_parsed!(ENV_MAX_RETRIES, retry.max_retries, base_retry.max_retries),
            retry_delay_ms: get_parsed!(
                ENV_RETRY_DELAY_MS,
                retry.retry_delay_ms,
                base_retry.retry_delay_ms
            ),
            max_connection_attempts: get_parsed!(
                ENV_MAX_CONNECTION_ATTEMPTS,
                retry.max_connection_attempts,
                base_retry.max_connection_attempts
            ),
            reconnect_delay_ms: get_parsed!(
                ENV_RECONNECT_DELAY_MS,
                retry.reconnect_delay_ms,
                base_retry.reconnect_delay_ms
            ),
        },
    };

    // Batch
    let batch_concurrency = get_parsed!(
        ENV_BATCH_CONCURRENCY,
        batch.concurrency,
        DEFAULT_BATCH_CONCURRENCY
    );

    // Pronunciations
    let pronunciations = match yaml.pronunciations {
        Some(list) => list,
        None => match env_string(ENV_PRONUNCIATIONS_JSON) {
            Some(json) => serde_json::from_str::<Vec<Pronunciation>>(&json)
                .map_err(|e| format!("Invalid {ENV_PRONUNCIATIONS_JSON}: {e}"))?,
            None => Vec::new(),
        },
    };

    Ok(ClientConfig {
        cache_dir,
        dedupe_in_flight,
        speech,
        readaloud,
        batch_concurrency,
        pronunciations,
    })
}
