//! Synthesis protocol engine.
//!
//! One engine run drives one turn on one connection:
//!
//! ```text
//!            turn.start               audio frame              turn.end
//! NotStarted ──────────▶ TurnStarted ────────────▶ Streaming ───────────▶ Complete
//!                            │                         │
//!                            │ turn.end                │ close
//!                            ▼                         ▼
//!                          Fail                     Complete
//! ```
//!
//! Frame handling is a pure state machine (`SynthesisSession`) returning a
//! `FrameOutcome` per frame; the async receive loop only moves frames from
//! the transport into it and races cancellation and the deadline.

use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connection::Connection;
use super::messages::{
    PATH_TURN_END, PATH_TURN_START, RequestCorrelation, build_config_message, build_ssml_message,
    parse_binary_frame, split_message, text_message_path,
};
use super::ssml::build_ssml;
use super::transport::{InboundFrame, MessageTransport};
use super::{DEFAULT_CHUNK_SIZE, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::core::tts::base::{ProtocolViolation, SpeechSettings, TTSError, TTSResult};

// =============================================================================
// State Machine
// =============================================================================

/// Turn progress of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    NotStarted,
    TurnStarted,
    Streaming,
}

/// Result of feeding one frame to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue(ProtocolState),
    Complete(Vec<u8>),
    Fail(ProtocolViolation),
}

/// Per-exchange protocol state and audio accumulator.
///
/// Owned by exactly one receive loop; never shared across tasks.
#[derive(Debug)]
pub struct SynthesisSession {
    request_id: String,
    state: ProtocolState,
    audio: Vec<u8>,
}

impl SynthesisSession {
    pub fn new(correlation: &RequestCorrelation) -> Self {
        Self {
            request_id: correlation.request_id.clone(),
            state: ProtocolState::NotStarted,
            audio: Vec::new(),
        }
    }

    #[inline]
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    #[inline]
    pub fn buffered(&self) -> usize {
        self.audio.len()
    }

    fn complete(&mut self) -> FrameOutcome {
        FrameOutcome::Complete(std::mem::take(&mut self.audio))
    }

    /// Handles a text frame. Frames for other requests are ignored.
    pub fn on_text(&mut self, message: &str) -> FrameOutcome {
        if !message.contains(&self.request_id) {
            debug!("Ignoring text frame for another request");
            return FrameOutcome::Continue(self.state);
        }

        let path = text_message_path(message);
        match (self.state, path) {
            (ProtocolState::NotStarted, Some(PATH_TURN_START)) => {
                self.state = ProtocolState::TurnStarted;
                FrameOutcome::Continue(self.state)
            }
            (ProtocolState::TurnStarted, Some(PATH_TURN_END)) => {
                FrameOutcome::Fail(ProtocolViolation::TurnEndedBeforeAudio)
            }
            (ProtocolState::Streaming, Some(PATH_TURN_END)) => self.complete(),
            _ => FrameOutcome::Continue(self.state),
        }
    }

    /// Handles a complete binary message.
    pub fn on_binary(&mut self, data: &[u8]) -> FrameOutcome {
        let frame = match parse_binary_frame(data) {
            Ok(frame) => frame,
            Err(violation) => return FrameOutcome::Fail(violation),
        };

        if !frame.is_audio() {
            debug!("Skipping binary frame with path {:?}", frame.path());
            return FrameOutcome::Continue(self.state);
        }

        if !frame.header.contains(&self.request_id) {
            if self.state == ProtocolState::Streaming {
                return FrameOutcome::Fail(ProtocolViolation::CorrelationMismatch(
                    self.request_id.clone(),
                ));
            }
            debug!("Skipping audio frame for another request");
            return FrameOutcome::Continue(self.state);
        }

        self.audio.extend_from_slice(frame.payload);
        self.state = ProtocolState::Streaming;
        FrameOutcome::Continue(self.state)
    }

    /// Handles a close frame or the end of the stream.
    pub fn on_close(&mut self) -> FrameOutcome {
        if self.state == ProtocolState::Streaming {
            self.complete()
        } else {
            FrameOutcome::Fail(ProtocolViolation::ClosedBeforeAudio)
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Drives the two-message handshake and the receive loop for one attempt.
#[derive(Debug, Clone)]
pub struct ProtocolEngine {
    chunk_size: usize,
    request_timeout: Duration,
}

impl Default for ProtocolEngine {
    fn default() -> Self {
        Self::new(
            DEFAULT_CHUNK_SIZE,
            Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        )
    }
}

impl ProtocolEngine {
    pub fn new(chunk_size: usize, request_timeout: Duration) -> Self {
        Self {
            chunk_size,
            request_timeout,
        }
    }

    /// Runs one full exchange and returns the assembled audio.
    ///
    /// `escaped_text` must already be sanitized and XML-escaped.
    pub async fn synthesize(
        &self,
        connection: &Connection,
        escaped_text: &str,
        settings: &SpeechSettings,
        correlation: &RequestCorrelation,
        cancel: &CancellationToken,
    ) -> TTSResult<Vec<u8>> {
        let deadline = Instant::now() + self.request_timeout;

        let config = build_config_message(correlation, settings.output_format);
        let content = build_ssml_message(correlation, &build_ssml(escaped_text, settings));

        let handshake = async {
            connection
                .send_message(&split_message(&config, self.chunk_size))
                .await?;
            connection
                .send_message(&split_message(&content, self.chunk_size))
                .await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TTSError::Cancelled),
            _ = sleep_until(deadline) => {
                return Err(TTSError::Timeout("handshake did not complete".to_string()));
            }
            sent = handshake => sent.map_err(TTSError::Transport)?,
        }

        debug!(
            "Sent read-aloud handshake for request {} on connection {}",
            correlation.request_id, connection.id
        );

        let session = SynthesisSession::new(correlation);
        receive_audio(connection.transport(), session, deadline, cancel).await
    }
}

/// Feeds inbound frames into `session` until a terminal outcome.
pub async fn receive_audio<T: MessageTransport + ?Sized>(
    transport: &T,
    mut session: SynthesisSession,
    deadline: Instant,
    cancel: &CancellationToken,
) -> TTSResult<Vec<u8>> {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TTSError::Cancelled),
            _ = sleep_until(deadline) => {
                return Err(TTSError::Timeout(format!(
                    "no turn.end after {} audio bytes",
                    session.buffered()
                )));
            }
            frame = transport.next_frame() => frame,
        };

        let outcome = match frame {
            Some(Ok(InboundFrame::Text(text))) => session.on_text(&text),
            Some(Ok(InboundFrame::Binary(data))) => session.on_binary(&data),
            Some(Ok(InboundFrame::Close)) | None => session.on_close(),
            Some(Err(e)) => {
                warn!("Read-aloud receive failed: {}", e);
                return Err(TTSError::Transport(e));
            }
        };

        match outcome {
            FrameOutcome::Continue(_) => continue,
            FrameOutcome::Complete(audio) => {
                debug!("Read-aloud turn complete with {} audio bytes", audio.len());
                return Ok(audio);
            }
            FrameOutcome::Fail(violation) => return Err(TTSError::Protocol(violation)),
        }
    }
}
