mod base;
pub mod readaloud;

pub use base::{
    NEUTRAL_ROLE, NEUTRAL_STYLE, OutputFormat, Pronunciation, ProtocolViolation, SpeechSettings,
    SpeechSynthesizer, TTSError, TTSResult, TransportError, TransportErrorKind,
};
pub use readaloud::{READALOUD_WS_URL, ReadAloudConfig, ReadAloudTTS};
use std::collections::HashMap;

/// Factory function to create a speech synthesizer.
///
/// # Supported Providers
///
/// - `"readaloud"` or `"edge"` - browser read-aloud streaming endpoint
///
/// # Example
///
/// ```rust,ignore
/// use readaloud_tts::core::tts::{create_tts_provider, ReadAloudConfig};
///
/// let provider = create_tts_provider("readaloud", ReadAloudConfig::default())?;
/// ```
pub fn create_tts_provider(
    provider_type: &str,
    config: ReadAloudConfig,
) -> TTSResult<Box<dyn SpeechSynthesizer>> {
    match provider_type.to_lowercase().as_str() {
        "readaloud" | "read-aloud" | "edge" | "edge-tts" => Ok(Box::new(ReadAloudTTS::new(config)?)),
        _ => Err(TTSError::InvalidConfiguration(format!(
            "Unsupported TTS provider: {provider_type}. Supported providers: readaloud"
        ))),
    }
}

/// Returns a map of provider names to their default endpoint URLs.
pub fn get_tts_provider_urls() -> HashMap<String, String> {
    let mut urls = HashMap::new();
    urls.insert("readaloud".to_string(), READALOUD_WS_URL.to_string());
    urls
}
