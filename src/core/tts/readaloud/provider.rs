//! Read-aloud TTS provider.
//!
//! `ReadAloudTTS` owns the outer reconnect loop: each iteration opens a
//! fresh connection (new token window check, new connection id), runs the
//! attempt-level retry loop on it, and always shuts the connection down
//! before deciding whether to try again.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::auth::TokenProvider;
use super::config::ReadAloudConfig;
use super::connection::{ConnectionFactory, ConnectionProvisioner};
use super::protocol::ProtocolEngine;
use super::retry::{RetryPolicy, SendGate, sleep_or_cancel, synthesize_with_retry};
use crate::core::tts::base::{SpeechSettings, SpeechSynthesizer, TTSError, TTSResult};

/// Streaming read-aloud synthesizer with connection-level recovery.
pub struct ReadAloudTTS<F: ConnectionFactory = ConnectionProvisioner> {
    factory: F,
    engine: ProtocolEngine,
    policy: RetryPolicy,
    config: ReadAloudConfig,
}

impl ReadAloudTTS<ConnectionProvisioner> {
    /// Creates a provider talking to the configured endpoint.
    pub fn new(config: ReadAloudConfig) -> TTSResult<Self> {
        Self::with_token_provider(config, Arc::new(TokenProvider::default()))
    }

    /// Creates a provider sharing an existing token provider.
    pub fn with_token_provider(
        config: ReadAloudConfig,
        tokens: Arc<TokenProvider>,
    ) -> TTSResult<Self> {
        let provisioner = ConnectionProvisioner::new(tokens)
            .with_endpoint(config.endpoint.clone())
            .with_connect_timeout(config.connect_timeout());
        Self::with_factory(provisioner, config)
    }
}

impl<F: ConnectionFactory> ReadAloudTTS<F> {
    /// Creates a provider on top of an arbitrary connection factory.
    pub fn with_factory(factory: F, config: ReadAloudConfig) -> TTSResult<Self> {
        config.validate().map_err(TTSError::InvalidConfiguration)?;

        Ok(Self {
            factory,
            engine: ProtocolEngine::new(config.chunk_size, config.request_timeout()),
            policy: config.retry.clone(),
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &ReadAloudConfig {
        &self.config
    }
}

#[async_trait]
impl<F: ConnectionFactory> SpeechSynthesizer for ReadAloudTTS<F> {
    async fn synthesize(
        &self,
        text: &str,
        settings: &SpeechSettings,
        cancel: &CancellationToken,
    ) -> TTSResult<Option<Vec<u8>>> {
        settings.validate()?;

        let max_attempts = self.policy.max_connection_attempts.max(1);
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let delay = self.policy.reconnect_delay(attempt - 1);
                info!(
                    "Reconnecting to read-aloud endpoint {}/{} in {}ms",
                    attempt,
                    max_attempts,
                    delay.as_millis()
                );
                sleep_or_cancel(delay, cancel).await?;
            }

            let connection = match self.factory.open(cancel).await {
                Ok(connection) => connection
                    .with_send_gate(SendGate::new(self.config.send_retry_delay())),
                Err(e) if e.warrants_reconnect() => {
                    warn!("Connection attempt {} failed: {}", attempt, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let result = synthesize_with_retry(
                &self.engine,
                &connection,
                &self.policy,
                text,
                settings,
                cancel,
            )
            .await;
            connection.shutdown().await;

            match result {
                Ok(audio) => {
                    debug!(
                        "Synthesized {} chars into {} bytes on connection {}",
                        text.chars().count(),
                        audio.len(),
                        connection.id
                    );
                    return Ok(Some(audio));
                }
                Err(e) if e.warrants_reconnect() => {
                    warn!(
                        "Connection {} gave up ({}), attempt {}/{}",
                        connection.id, e, attempt, max_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            "No audio produced after {} connection attempts",
            max_attempts
        );
        Ok(None)
    }
}
