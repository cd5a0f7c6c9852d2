//! Fingerprinted audio cache.
//!
//! `FingerprintCache` sits between callers and a `SpeechSynthesizer`:
//!
//! 1. sanitize the text (pronunciations, colon folding, XML escaping)
//! 2. fingerprint `(sanitized text, settings)`
//! 3. return `{dir}/{fingerprint}.{ext}` if it exists, with no network access
//! 4. otherwise synthesize, persist atomically and return the new path
//!
//! With `dedupe_in_flight` enabled, concurrent requests for the same
//! fingerprint are serialized so only the first one synthesizes; the others
//! re-check the store after acquiring the lock and hit.

pub mod fingerprint;
pub mod sanitize;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use fingerprint::{FINGERPRINT_LEN, FINGERPRINT_NAMESPACE, fingerprint};
pub use sanitize::{PronunciationReplacer, TextSanitizer, escape_xml, normalize_colons};
pub use store::ArtifactStore;

use crate::core::tts::{
    Pronunciation, SpeechSettings, SpeechSynthesizer, TTSError, TTSResult,
};

/// A resolved cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedArtifact {
    pub fingerprint: String,
    pub path: PathBuf,
    /// `true` when the file was already present (no synthesis performed)
    pub existed: bool,
}

/// Options for building a `FingerprintCache`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheOptions {
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub pronunciations: Vec<Pronunciation>,
    #[serde(default = "default_dedupe")]
    pub dedupe_in_flight: bool,
}

fn default_dedupe() -> bool {
    true
}

impl CacheOptions {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            pronunciations: Vec::new(),
            dedupe_in_flight: true,
        }
    }

    pub fn with_pronunciations(mut self, pronunciations: Vec<Pronunciation>) -> Self {
        self.pronunciations = pronunciations;
        self
    }

    pub fn with_dedupe_in_flight(mut self, enabled: bool) -> Self {
        self.dedupe_in_flight = enabled;
        self
    }
}

/// Get-or-create cache of synthesized audio keyed by fingerprint.
pub struct FingerprintCache<S: SpeechSynthesizer + ?Sized> {
    synthesizer: Arc<S>,
    store: ArtifactStore,
    sanitizer: TextSanitizer,
    in_flight: Option<DashMap<String, Arc<Mutex<()>>>>,
}

impl<S: SpeechSynthesizer + ?Sized> FingerprintCache<S> {
    pub fn new(synthesizer: Arc<S>, options: CacheOptions) -> Self {
        Self {
            synthesizer,
            store: ArtifactStore::new(options.cache_dir),
            sanitizer: TextSanitizer::new(&options.pronunciations),
            in_flight: options.dedupe_in_flight.then(DashMap::new),
        }
    }

    #[inline]
    pub fn cache_dir(&self) -> &Path {
        self.store.base_path()
    }

    /// Sanitized form of `text` as it will be sent and fingerprinted.
    pub fn sanitize(&self, text: &str) -> String {
        self.sanitizer.sanitize(text)
    }

    /// Fingerprint for `text` under `settings`.
    pub fn fingerprint_for(&self, text: &str, settings: &SpeechSettings) -> String {
        fingerprint(&self.sanitize(text), settings)
    }

    /// Pure read: returns the artifact if it already exists.
    pub async fn lookup(
        &self,
        text: &str,
        settings: &SpeechSettings,
    ) -> TTSResult<Option<CachedArtifact>> {
        let fp = self.fingerprint_for(text, settings);
        let path = self.store.path_for(&fp, settings.output_format.extension());
        if self.store.exists(&path).await? {
            Ok(Some(CachedArtifact {
                fingerprint: fp,
                path,
                existed: true,
            }))
        } else {
            Ok(None)
        }
    }

    /// Returns the cached artifact for `(text, settings)`, synthesizing on a miss.
    ///
    /// `Ok(None)` means the synthesizer produced no audio.
    pub async fn get_or_create(
        &self,
        text: &str,
        settings: &SpeechSettings,
        cancel: &CancellationToken,
    ) -> TTSResult<Option<CachedArtifact>> {
        let sanitized = self.sanitize(text);
        let fp = fingerprint(&sanitized, settings);
        let path = self.store.path_for(&fp, settings.output_format.extension());

        if self.store.exists(&path).await? {
            debug!("Cache hit for {}", fp);
            return Ok(Some(CachedArtifact {
                fingerprint: fp,
                path,
                existed: true,
            }));
        }

        let Some(in_flight) = &self.in_flight else {
            return self.create(&sanitized, settings, fp, path, cancel).await;
        };

        let lock = in_flight
            .entry(fp.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = async {
            let _guard = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TTSError::Cancelled),
                guard = lock.lock() => guard,
            };

            if self.store.exists(&path).await? {
                debug!("Cache hit for {} after waiting on in-flight synthesis", fp);
                return Ok(Some(CachedArtifact {
                    fingerprint: fp.clone(),
                    path,
                    existed: true,
                }));
            }
            self.create(&sanitized, settings, fp.clone(), path, cancel)
                .await
        }
        .await;

        drop(lock);
        in_flight.remove_if(&fp, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn create(
        &self,
        sanitized: &str,
        settings: &SpeechSettings,
        fp: String,
        path: PathBuf,
        cancel: &CancellationToken,
    ) -> TTSResult<Option<CachedArtifact>> {
        // Fail on an unusable directory before spending a network round trip
        self.store.ensure_dir().await?;

        let audio = match self.synthesizer.synthesize(sanitized, settings, cancel).await? {
            Some(audio) if !audio.is_empty() => audio,
            _ => {
                warn!("No audio produced for {}", fp);
                return Ok(None);
            }
        };

        self.store.write(&path, &audio).await?;
        info!("Cached {} bytes as {}", audio.len(), path.display());

        Ok(Some(CachedArtifact {
            fingerprint: fp,
            path,
            existed: false,
        }))
    }

    /// Deletes every cached artifact.
    pub async fn clear(&self) -> TTSResult<usize> {
        self.store.clear().await
    }
}
