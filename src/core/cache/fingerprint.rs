//! Stable cache fingerprints.
//!
//! `base36(sha256("readaloud-v1|" + text + "|" + settings)[..16])`, left-padded
//! to 25 characters so every artifact name has the same width.

use sha2::{Digest, Sha256};

use crate::core::tts::SpeechSettings;

/// Namespace tag mixed into every fingerprint; bump to invalidate old caches.
pub const FINGERPRINT_NAMESPACE: &str = "readaloud-v1";

/// Width of a rendered fingerprint (a 128-bit value needs at most 25 base-36 digits).
pub const FINGERPRINT_LEN: usize = 25;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Fingerprint of already-sanitized text under `settings`.
pub fn fingerprint(sanitized_text: &str, settings: &SpeechSettings) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_NAMESPACE.as_bytes());
    hasher.update(b"|");
    hasher.update(sanitized_text.as_bytes());
    hasher.update(b"|");
    hasher.update(settings.canonical_string().as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 16];
    prefix.copy_from_slice(&digest[..16]);
    to_base36(u128::from_be_bytes(prefix))
}

/// Renders `value` in lowercase base 36, zero-padded to `FINGERPRINT_LEN`.
pub fn to_base36(mut value: u128) -> String {
    let mut digits = [b'0'; FINGERPRINT_LEN];
    let mut i = FINGERPRINT_LEN;
    while value > 0 {
        i -= 1;
        digits[i] = BASE36_DIGITS[(value % 36) as usize];
        value /= 36;
    }
    // Only ASCII digits and lowercase letters were written
    String::from_utf8_lossy(&digits).into_owned()
}
