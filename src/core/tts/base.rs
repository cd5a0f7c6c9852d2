//! Base traits and types shared by the synthesis pipeline.
//!
//! This module defines the request settings, the output encoding, the error
//! taxonomy used by every layer (connection, protocol, retry, cache, batch) and
//! the `SpeechSynthesizer` seam the cache talks to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Error Types
// =============================================================================

/// Classification of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Generic socket I/O failure
    Io,
    /// The socket is closed or otherwise unusable for the requested operation
    InvalidState,
    /// The peer violated the WebSocket framing rules
    Protocol,
    /// Anything else reported by the WebSocket library
    Other,
}

/// A failure reported by a `MessageTransport` implementation.
#[derive(Debug, Clone, Error)]
#[error("{kind:?} transport error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Transient transport errors are everything except "invalid state".
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.kind != TransportErrorKind::InvalidState
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        let kind = match &err {
            WsError::Io(_) => TransportErrorKind::Io,
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportErrorKind::InvalidState,
            WsError::Protocol(_) => TransportErrorKind::Protocol,
            _ => TransportErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// Wire protocol violations detected while driving one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// `turn.end` arrived while the turn had started but no audio was received
    #[error("turn ended before any audio was received")]
    TurnEndedBeforeAudio,

    /// The socket closed before the first audio frame
    #[error("connection closed before any audio was received")]
    ClosedBeforeAudio,

    /// A binary frame was shorter than its declared header
    #[error("malformed binary frame: {0}")]
    MalformedFrame(String),

    /// An audio frame belonging to another exchange arrived mid-stream
    #[error("audio frame does not belong to request {0}")]
    CorrelationMismatch(String),
}

impl ProtocolViolation {
    /// Whether a fresh connection has a reasonable chance of succeeding.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MalformedFrame(_))
    }
}

/// Errors that can occur during synthesis.
#[derive(Debug, Error)]
pub enum TTSError {
    /// The WebSocket handshake failed or timed out
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection dropped between attempts and must be re-established
    #[error("Connection lost, must re-establish: {0}")]
    ConnectionLost(String),

    /// The remote end broke the turn protocol
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Send or receive failed on an open connection
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// An exchange did not finish before its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Cache directory or artifact I/O failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration or request settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Cooperative cancellation
    #[error("Operation cancelled")]
    Cancelled,
}

impl TTSError {
    /// Errors the attempt-level retry policy is allowed to absorb.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Errors worth a brand-new connection in the outer reconnect loop.
    pub fn warrants_reconnect(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::ConnectionLost(_) => true,
            Self::Protocol(v) => v.is_recoverable(),
            Self::Transport(_) | Self::Timeout(_) => true,
            _ => false,
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for TTSError {
    fn from(err: std::io::Error) -> Self {
        TTSError::Storage(err.to_string())
    }
}

/// Result type for synthesis operations.
pub type TTSResult<T> = Result<T, TTSError>;

// =============================================================================
// Output Format
// =============================================================================

/// Audio encoding negotiated in the `speech.config` message.
///
/// Only one encoding is used per session; the cache file extension follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// 24kHz mono MP3 at 48kbps - default
    #[default]
    Mp3Mono48k,
    /// 24kHz mono MP3 at 96kbps
    Mp3Mono96k,
    /// 24kHz mono Opus in a WebM container
    WebmOpus,
    /// 24kHz mono Opus in an Ogg container
    OggOpus,
    /// 24kHz 16-bit mono PCM without a container
    RawPcm,
}

impl OutputFormat {
    /// Returns the wire identifier sent as `outputFormat`.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3Mono48k => "audio-24khz-48kbitrate-mono-mp3",
            Self::Mp3Mono96k => "audio-24khz-96kbitrate-mono-mp3",
            Self::WebmOpus => "webm-24khz-16bit-mono-opus",
            Self::OggOpus => "ogg-24khz-16bit-mono-opus",
            Self::RawPcm => "raw-24khz-16bit-mono-pcm",
        }
    }

    /// Returns the file extension used for cached artifacts.
    #[inline]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Mp3Mono48k | Self::Mp3Mono96k => "mp3",
            Self::WebmOpus => "webm",
            Self::OggOpus => "ogg",
            Self::RawPcm => "pcm",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = TTSError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp3" | "mp3-mono-48k" | "audio-24khz-48kbitrate-mono-mp3" => Ok(Self::Mp3Mono48k),
            "mp3-mono-96k" | "audio-24khz-96kbitrate-mono-mp3" => Ok(Self::Mp3Mono96k),
            "webm" | "webm-opus" | "webm-24khz-16bit-mono-opus" => Ok(Self::WebmOpus),
            "ogg" | "ogg-opus" | "ogg-24khz-16bit-mono-opus" => Ok(Self::OggOpus),
            "pcm" | "raw-pcm" | "raw-24khz-16bit-mono-pcm" => Ok(Self::RawPcm),
            other => Err(TTSError::InvalidConfiguration(format!(
                "Unsupported output format: {other}"
            ))),
        }
    }
}

// =============================================================================
// Speech Settings
// =============================================================================

/// Style name that means "no expressive style".
pub const NEUTRAL_STYLE: &str = "general";

/// Role name that means "no role play".
pub const NEUTRAL_ROLE: &str = "Default";

/// A literal substring and the phonetic spelling that replaces it before synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pronunciation {
    pub word: String,
    pub pronunciation: String,
}

/// Voice and prosody settings for one synthesis request.
///
/// `speed` and `pitch` are percentages where 100 is the voice's natural value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechSettings {
    /// Short voice name, e.g. `en-US-AriaNeural`
    pub voice: String,
    #[serde(default = "default_percent")]
    pub speed: i32,
    #[serde(default = "default_percent")]
    pub pitch: i32,
    #[serde(default = "default_volume")]
    pub volume: i32,
    #[serde(default)]
    pub style: Option<String>,
    /// Style intensity as a percentage (1-100)
    #[serde(default)]
    pub style_intensity: Option<u32>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
}

fn default_percent() -> i32 {
    100
}

fn default_volume() -> i32 {
    100
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            voice: "en-US-AriaNeural".to_string(),
            speed: 100,
            pitch: 100,
            volume: 100,
            style: None,
            style_intensity: None,
            role: None,
            output_format: OutputFormat::default(),
        }
    }
}

impl SpeechSettings {
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            ..Default::default()
        }
    }

    pub fn with_speed(mut self, speed: i32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_pitch(mut self, pitch: i32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_volume(mut self, volume: i32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_style(mut self, style: impl Into<String>, intensity: Option<u32>) -> Self {
        self.style = Some(style.into());
        self.style_intensity = intensity;
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Style that should actually be emitted, ignoring the neutral sentinel.
    pub fn effective_style(&self) -> Option<&str> {
        self.style
            .as_deref()
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(NEUTRAL_STYLE))
    }

    /// Role that should actually be emitted, ignoring the neutral sentinel.
    pub fn effective_role(&self) -> Option<&str> {
        self.role
            .as_deref()
            .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case(NEUTRAL_ROLE))
    }

    /// Canonical string of every field that changes the audible output.
    ///
    /// Used as part of the cache fingerprint, so field order is stable.
    pub fn canonical_string(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.voice,
            self.speed,
            self.pitch,
            self.volume,
            self.style.as_deref().unwrap_or(""),
            self.style_intensity
                .map(|i| i.to_string())
                .unwrap_or_default(),
            self.role.as_deref().unwrap_or(""),
            self.output_format.as_str(),
        )
    }

    pub fn validate(&self) -> TTSResult<()> {
        if self.voice.trim().is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "Voice name must not be empty".to_string(),
            ));
        }
        if self.speed <= 0 {
            return Err(TTSError::InvalidConfiguration(format!(
                "Speed must be a positive percentage (got {})",
                self.speed
            )));
        }
        if self.pitch <= 0 {
            return Err(TTSError::InvalidConfiguration(format!(
                "Pitch must be a positive percentage (got {})",
                self.pitch
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Synthesizer Trait
// =============================================================================

/// Anything that can turn already-sanitized text into encoded audio bytes.
///
/// `Ok(None)` means every retry was spent without producing audio; callers log
/// it rather than treating it as a crash.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        settings: &SpeechSettings,
        cancel: &CancellationToken,
    ) -> TTSResult<Option<Vec<u8>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_extension() {
        assert_eq!(OutputFormat::default().extension(), "mp3");
        assert_eq!(
            OutputFormat::default().as_str(),
            "audio-24khz-48kbitrate-mono-mp3"
        );
        assert_eq!(OutputFormat::WebmOpus.extension(), "webm");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("MP3".parse::<OutputFormat>().unwrap(), OutputFormat::Mp3Mono48k);
        assert_eq!("ogg".parse::<OutputFormat>().unwrap(), OutputFormat::OggOpus);
        assert!("flac".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_effective_style_ignores_sentinels() {
        let settings = SpeechSettings::default()
            .with_style("general", Some(50))
            .with_role("Default");
        assert!(settings.effective_style().is_none());
        assert!(settings.effective_role().is_none());

        let settings = SpeechSettings::default()
            .with_style("cheerful", None)
            .with_role("Girl");
        assert_eq!(settings.effective_style(), Some("cheerful"));
        assert_eq!(settings.effective_role(), Some("Girl"));
    }

    #[test]
    fn test_canonical_string_covers_audible_fields() {
        let base = SpeechSettings::default();
        let variants = [
            base.clone().with_speed(120),
            base.clone().with_pitch(90),
            base.clone().with_volume(50),
            base.clone().with_style("sad", None),
            base.clone().with_style("sad", Some(30)),
            base.clone().with_role("Boy"),
            SpeechSettings::new("en-GB-SoniaNeural"),
            base.clone().with_output_format(OutputFormat::OggOpus),
        ];
        for variant in &variants {
            assert_ne!(variant.canonical_string(), base.canonical_string());
        }
    }

    #[test]
    fn test_validate_rejects_empty_voice() {
        let settings = SpeechSettings::new("  ");
        assert!(matches!(
            settings.validate(),
            Err(TTSError::InvalidConfiguration(_))
        ));
        assert!(SpeechSettings::default().validate().is_ok());
    }

    #[test]
    fn test_transport_error_transience() {
        assert!(TransportError::new(TransportErrorKind::Io, "reset").is_transient());
        assert!(!TransportError::new(TransportErrorKind::InvalidState, "closed").is_transient());

        let err = TTSError::Transport(TransportError::new(TransportErrorKind::Other, "x"));
        assert!(err.is_transient());
        assert!(!TTSError::Protocol(ProtocolViolation::TurnEndedBeforeAudio).is_transient());
        assert!(!TTSError::Cancelled.warrants_reconnect());
        assert!(
            !TTSError::Protocol(ProtocolViolation::MalformedFrame("short".into()))
                .warrants_reconnect()
        );
    }
}
