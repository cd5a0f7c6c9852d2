//! Read-aloud streaming TTS provider.
//!
//! This module speaks the browser "read aloud" synthesis protocol over a single
//! WebSocket connection:
//!
//! 1. Derive a time-windowed `Sec-MS-GEC` token and open the socket
//!    (`auth`, `connection`, `config`).
//! 2. Send a `speech.config` message followed by an `ssml` message
//!    (`messages`, `ssml`).
//! 3. Read text frames (`turn.start` / `turn.end`) and binary audio frames
//!    until the turn completes (`protocol`).
//! 4. Retry transient failures per send, per attempt and per connection
//!    (`retry`, `provider`).
//!
//! # Example
//!
//! ```rust,ignore
//! use readaloud_tts::core::tts::readaloud::ReadAloudTTS;
//! use readaloud_tts::core::tts::{SpeechSettings, SpeechSynthesizer};
//! use tokio_util::sync::CancellationToken;
//!
//! let tts = ReadAloudTTS::new(Default::default())?;
//! let settings = SpeechSettings::new("en-US-AriaNeural").with_speed(110);
//! let audio = tts
//!     .synthesize("Hello, world!", &settings, &CancellationToken::new())
//!     .await?;
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod messages;
pub mod protocol;
pub mod provider;
pub mod retry;
pub mod ssml;
pub mod transport;


pub use auth::{AuthToken, TokenProvider};
pub use config::ReadAloudConfig;
pub use connection::{Connection, ConnectionFactory, ConnectionProvisioner};
pub use messages::RequestCorrelation;
pub use protocol::{FrameOutcome, ProtocolEngine, ProtocolState, SynthesisSession};
pub use provider::ReadAloudTTS;
pub use retry::{RetryPolicy, SendGate, synthesize_with_retry};
pub use ssml::build_ssml;
pub use transport::{InboundFrame, MessageTransport, TextFragment, WebSocketTransport};

// =============================================================================
// API Constants
// =============================================================================

/// Read-aloud synthesis WebSocket endpoint.
pub const READALOUD_WS_URL: &str =
    "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1";

/// Fixed client token identifying the browser extension.
pub const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";

/// Protocol version tag sent alongside the `Sec-MS-GEC` token.
pub const SEC_MS_GEC_VERSION: &str = "1-130.0.2849.68";

/// Browser major version mirrored in the user agent.
pub const CHROMIUM_MAJOR_VERSION: &str = "130";

/// Origin header expected by the endpoint.
pub const READALOUD_ORIGIN: &str = "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold";

// =============================================================================
// Limits and Defaults
// =============================================================================

/// Width of one token window in seconds.
pub const TOKEN_WINDOW_SECS: u64 = 300;

/// Seconds between 1601-01-01 (Windows file time epoch) and the Unix epoch.
pub const WINDOWS_EPOCH_OFFSET_SECS: u64 = 11_644_473_600;

/// Maximum payload of one outbound text frame; longer messages are fragmented.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// WebSocket handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Deadline for one complete exchange (handshake messages plus audio).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Attempt-level retries after the first try.
pub const DEFAULT_MAX_RETRIES: u32 = 9;

/// Linear backoff unit for attempt-level retries.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Connection-level attempts in the reconnect loop.
pub const DEFAULT_MAX_CONNECTION_ATTEMPTS: u32 = 10;

/// Linear backoff unit between connection-level attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Delay before the single send retry.
pub const SEND_RETRY_DELAY_MS: u64 = 200;

/// Timeout for the graceful close handshake.
pub const CLOSE_TIMEOUT_MS: u64 = 1000;
