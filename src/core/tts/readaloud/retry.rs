//! Retry policies layered around the protocol engine.
//!
//! - **Send level** (`SendGate`): one send in flight per connection; a transient
//!   failure is retried once after a short fixed delay.
//! - **Attempt level** (`synthesize_with_retry`): the whole exchange is retried
//!   on transient errors with linear backoff, as long as the connection is open.
//! - **Connection level**: owned by `ReadAloudTTS`, which opens fresh
//!   connections when an attempt cycle gives up.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connection::Connection;
use super::messages::RequestCorrelation;
use super::protocol::ProtocolEngine;
use super::transport::{MessageTransport, TextFragment};
use super::{
    DEFAULT_MAX_CONNECTION_ATTEMPTS, DEFAULT_MAX_RETRIES, DEFAULT_RECONNECT_DELAY_MS,
    DEFAULT_RETRY_DELAY_MS, SEND_RETRY_DELAY_MS,
};
use crate::core::tts::base::{SpeechSettings, TTSError, TTSResult, TransportError};

// =============================================================================
// Retry Policy
// =============================================================================

/// Budgets and backoff units for the attempt and connection retry levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempt-level retries after the first try.
    /// Default: 9
    pub max_retries: u32,

    /// Linear backoff unit between attempts (milliseconds).
    /// Default: 500ms
    pub retry_delay_ms: u64,

    /// Total connections the reconnect loop may open.
    /// Default: 10
    pub max_connection_attempts: u32,

    /// Linear backoff unit between connections (milliseconds).
    /// Default: 1000ms
    pub reconnect_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_connection_attempts: DEFAULT_MAX_CONNECTION_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries and opens a single connection.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            max_connection_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before attempt-level retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(attempt as u64))
    }

    /// Delay before opening connection number `attempt + 1`.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.saturating_mul(attempt as u64))
    }

    /// Whether attempt-level retry number `attempt` (1-based) is allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_retries
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> TTSResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TTSError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

// =============================================================================
// Send Gate
// =============================================================================

/// Single-slot gate serializing writes on one connection.
///
/// All fragments of one logical message are written while holding the gate,
/// so frames of different messages never interleave.
#[derive(Debug)]
pub struct SendGate {
    slot: Mutex<()>,
    retry_delay: Duration,
}

impl Default for SendGate {
    fn default() -> Self {
        Self::new(Duration::from_millis(SEND_RETRY_DELAY_MS))
    }
}

impl SendGate {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            slot: Mutex::new(()),
            retry_delay,
        }
    }

    /// Sends every fragment of one message in order.
    pub async fn send<T: MessageTransport + ?Sized>(
        &self,
        transport: &T,
        fragments: &[TextFragment],
    ) -> Result<(), TransportError> {
        let _slot = self.slot.lock().await;

        for fragment in fragments {
            match transport.send_text(fragment).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    warn!(
                        "Send failed ({}), retrying once in {}ms",
                        e,
                        self.retry_delay.as_millis()
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    transport.send_text(fragment).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

// =============================================================================
// Attempt-Level Retry
// =============================================================================

/// Runs the engine on `connection`, retrying transient failures.
///
/// Every attempt gets a fresh `RequestCorrelation` so frames still in flight
/// from an abandoned attempt are rejected by the correlation gate. When the
/// connection is closed by the time a retry is due, the loop stops with
/// `ConnectionLost` and leaves reconnecting to the caller.
pub async fn synthesize_with_retry(
    engine: &ProtocolEngine,
    connection: &Connection,
    policy: &RetryPolicy,
    escaped_text: &str,
    settings: &SpeechSettings,
    cancel: &CancellationToken,
) -> TTSResult<Vec<u8>> {
    let mut attempt: u32 = 0;

    loop {
        let correlation = RequestCorrelation::new();
        let err = match engine
            .synthesize(connection, escaped_text, settings, &correlation, cancel)
            .await
        {
            Ok(audio) => return Ok(audio),
            Err(e) => e,
        };

        if !err.is_transient() {
            debug!("Attempt failed with non-transient error: {}", err);
            return Err(err);
        }

        attempt += 1;
        if !policy.should_retry(attempt) {
            warn!(
                "Giving up on connection {} after {} attempts: {}",
                connection.id, attempt, err
            );
            return Err(err);
        }

        let delay = policy.retry_delay(attempt);
        warn!(
            "Attempt {}/{} failed ({}), retrying in {}ms",
            attempt,
            policy.max_retries,
            err,
            delay.as_millis()
        );
        sleep_or_cancel(delay, cancel).await?;

        if !connection.is_open() {
            return Err(TTSError::ConnectionLost(format!(
                "connection {} closed after: {}",
                connection.id, err
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tts::base::TransportErrorKind;
    use crate::core::tts::readaloud::tests::ScriptedTransport;

    #[test]
    fn test_default_policy_budgets() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 9);
        assert_eq!(policy.max_connection_attempts, 10);
        assert!(policy.should_retry(9));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_backoff_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_delay(1), Duration::from_millis(500));
        assert_eq!(policy.retry_delay(3), Duration::from_millis(1500));
        assert_eq!(policy.reconnect_delay(2), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_transient_send_failure_retried_exactly_once() {
        let transport = ScriptedTransport::new(vec![]);
        transport.fail_sends(vec![TransportError::new(TransportErrorKind::Io, "reset")]);

        let gate = SendGate::default();
        gate.send(&transport, &[TextFragment::whole("hello")])
            .await
            .unwrap();

        assert_eq!(transport.send_attempts(), 2);
        assert_eq!(transport.sent(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_second_send_failure_propagates() {
        let transport = ScriptedTransport::new(vec![]);
        transport.fail_sends(vec![
            TransportError::new(TransportErrorKind::Io, "reset"),
            TransportError::new(TransportErrorKind::Io, "reset again"),
        ]);

        let gate = SendGate::default();
        let err = gate
            .send(&transport, &[TextFragment::whole("hello")])
            .await
            .unwrap_err();

        assert_eq!(err.message, "reset again");
        assert_eq!(transport.send_attempts(), 2);
    }

    #[tokio::test]
    async fn test_invalid_state_send_is_not_retried() {
        let transport = ScriptedTransport::new(vec![]);
        transport.fail_sends(vec![TransportError::new(
            TransportErrorKind::InvalidState,
            "closed",
        )]);

        let gate = SendGate::default();
        let err = gate
            .send(&transport, &[TextFragment::whole("hello")])
            .await
            .unwrap_err();

        assert_eq!(err.kind, TransportErrorKind::InvalidState);
        assert_eq!(transport.send_attempts(), 1);
    }

    #[tokio::test]
    async fn test_sleep_or_cancel_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = sleep_or_cancel(Duration::from_secs(60), &cancel).await;
        assert!(matches!(result, Err(TTSError::Cancelled)));
    }
}
