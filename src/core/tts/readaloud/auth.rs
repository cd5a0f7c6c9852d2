//! `Sec-MS-GEC` token derivation.
//!
//! The endpoint accepts a SHA-256 digest of the current five-minute window
//! (expressed in Windows file-time ticks) concatenated with the trusted client
//! token. The digest only changes once per window, so `TokenProvider` caches
//! it and swaps in a fresh value when the window rolls over.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{TOKEN_WINDOW_SECS, TRUSTED_CLIENT_TOKEN, WINDOWS_EPOCH_OFFSET_SECS};

/// Number of 100ns ticks per second in Windows file time.
const TICKS_PER_SECOND: u64 = 10_000_000;

/// A derived token and the window it was computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub value: String,
    /// Window start in Windows file-time ticks
    pub issued_at_tick: u64,
}

impl AuthToken {
    /// Derives the token for the window containing `unix_secs`.
    pub fn derive(unix_secs: u64, secret: &str) -> Self {
        let tick = window_start_tick(unix_secs);
        let mut hasher = Sha256::new();
        hasher.update(tick.to_string().as_bytes());
        hasher.update(secret.as_bytes());
        let value = hex::encode_upper(hasher.finalize());

        Self {
            value,
            issued_at_tick: tick,
        }
    }
}

/// Start of the token window containing `unix_secs`, in file-time ticks.
pub fn window_start_tick(unix_secs: u64) -> u64 {
    let file_time_secs = unix_secs + WINDOWS_EPOCH_OFFSET_SECS;
    let window_start = file_time_secs - (file_time_secs % TOKEN_WINDOW_SECS);
    window_start * TICKS_PER_SECOND
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Process-wide token cache, injected into the connection provisioner.
///
/// Readers never block: the current token lives behind an `ArcSwap`, and a
/// stale window is recomputed and published by whichever caller notices it
/// first. Recomputation is idempotent, so racing refreshes are harmless.
#[derive(Debug)]
pub struct TokenProvider {
    secret: String,
    current: ArcSwap<AuthToken>,
}

impl Default for TokenProvider {
    fn default() -> Self {
        Self::new(TRUSTED_CLIENT_TOKEN)
    }
}

impl TokenProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        let initial = AuthToken::derive(unix_now(), &secret);
        Self {
            secret,
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Returns the token for the current wall-clock window.
    pub fn current(&self) -> Arc<AuthToken> {
        self.token_at(unix_now())
    }

    /// Returns the token for the window containing `unix_secs`.
    pub fn token_at(&self, unix_secs: u64) -> Arc<AuthToken> {
        let cached = self.current.load_full();
        if cached.issued_at_tick == window_start_tick(unix_secs) {
            return cached;
        }

        let fresh = Arc::new(AuthToken::derive(unix_secs, &self.secret));
        debug!(
            "Refreshed read-aloud auth token for window {}",
            fresh.issued_at_tick
        );
        self.current.store(fresh.clone());
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start_tick_is_aligned() {
        let tick = window_start_tick(1_700_000_123);
        assert_eq!(tick % (TOKEN_WINDOW_SECS * TICKS_PER_SECOND), 0);
        // Same window for every second inside it
        assert_eq!(window_start_tick(1_700_000_100), tick);
        assert_ne!(window_start_tick(1_700_000_100 + TOKEN_WINDOW_SECS), tick);
    }

    #[test]
    fn test_token_is_uppercase_sha256_hex() {
        let token = AuthToken::derive(1_700_000_000, TRUSTED_CLIENT_TOKEN);
        assert_eq!(token.value.len(), 64);
        assert!(
            token
                .value
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_token_matches_manual_digest() {
        let unix = 1_700_000_000u64;
        let tick = window_start_tick(unix);
        let expected = hex::encode_upper(Sha256::digest(
            format!("{tick}{TRUSTED_CLIENT_TOKEN}").as_bytes(),
        ));
        assert_eq!(AuthToken::derive(unix, TRUSTED_CLIENT_TOKEN).value, expected);
    }

    #[test]
    fn test_provider_reuses_token_within_window() {
        let provider = TokenProvider::default();
        let base = 1_700_000_100u64 - (1_700_000_100 + WINDOWS_EPOCH_OFFSET_SECS) % 300;
        let first = provider.token_at(base);
        let second = provider.token_at(base + 299);
        assert!(Arc::ptr_eq(&first, &second));

        let next = provider.token_at(base + 300);
        assert_ne!(first.value, next.value);
        assert!(next.issued_at_tick > first.issued_at_tick);
    }
}
