//! Bounded-concurrency batch synthesis over the fingerprint cache.
//!
//! Each item runs in its own task on a `JoinSet`; a semaphore caps how many
//! are past the gate at once. Results are drained on the calling task, which
//! owns the progress counter.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::cache::FingerprintCache;
use crate::core::tts::{SpeechSettings, SpeechSynthesizer, TTSError, TTSResult};

/// Default number of items synthesized at once.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Trims, drops blanks and removes duplicates, keeping first occurrences.
pub fn normalize_inputs<I, T>(texts: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut seen = HashSet::new();
    texts
        .into_iter()
        .filter_map(|t| {
            let trimmed = t.as_ref().trim();
            (!trimmed.is_empty() && seen.insert(trimmed.to_string())).then(|| trimmed.to_string())
        })
        .collect()
}

/// Synthesizes every distinct non-blank text, at most `max_concurrency` at a time.
///
/// `on_progress(completed, total)` is called once per finished item with a
/// strictly increasing `completed`. Items that produced no audio are left out
/// of the result. The call is all-or-nothing: cancellation yields
/// `TTSError::Cancelled` and any other failure aborts the remaining items.
pub async fn synthesize_many<S, I, T, P>(
    cache: &Arc<FingerprintCache<S>>,
    texts: I,
    settings: &SpeechSettings,
    max_concurrency: usize,
    on_progress: P,
    cancel: &CancellationToken,
) -> TTSResult<HashMap<String, PathBuf>>
where
    S: SpeechSynthesizer + ?Sized + 'static,
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
    P: Fn(usize, usize),
{
    let items = normalize_inputs(texts);
    let total = items.len();
    let mut results = HashMap::with_capacity(total);
    if total == 0 {
        return Ok(results);
    }

    let scope = cancel.child_token();
    let concurrency = max_concurrency.max(1);
    info!(
        "Synthesizing batch of {} items with concurrency {}",
        total, concurrency
    );

    let permits = Arc::new(Semaphore::new(concurrency));
    let mut workers = JoinSet::new();
    for text in items {
        let cache = Arc::clone(cache);
        let settings = settings.clone();
        let scope = scope.clone();
        let permits = Arc::clone(&permits);

        workers.spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = scope.cancelled() => return (text, Err(TTSError::Cancelled)),
                permit = permits.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return (text, Err(TTSError::Cancelled)),
                },
            };
            let artifact = cache.get_or_create(&text, &settings, &scope).await;
            (text, artifact)
        });
    }

    let mut completed = 0usize;
    while let Some(joined) = workers.join_next().await {
        let (text, outcome) = match joined {
            Ok(finished) => finished,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => (String::new(), Err(TTSError::Cancelled)),
        };

        match outcome {
            Ok(artifact) => {
                completed += 1;
                match artifact {
                    Some(artifact) => {
                        results.insert(text, artifact.path);
                    }
                    None => warn!("No audio produced for batch item {:?}", text),
                }
                on_progress(completed, total);
            }
            Err(e) => {
                scope.cancel();
                workers.abort_all();
                if e.is_cancelled() || cancel.is_cancelled() {
                    debug!("Batch cancelled after {}/{} items", completed, total);
                    return Err(TTSError::Cancelled);
                }
                warn!("Batch aborted after {}/{} items: {}", completed, total, e);
                return Err(e);
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(TTSError::Cancelled);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheOptions;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Echoes text as audio; fails on "boom", yields nothing on "silent",
    /// and tracks the peak number of concurrent calls.
    #[derive(Default)]
    struct EchoSynthesizer {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        delay_ms: u64,
    }

    #[async_trait]
    impl SpeechSynthesizer for EchoSynthesizer {
        async fn synthesize(
            &self,
            text: &str,
            _settings: &SpeechSettings,
            cancel: &CancellationToken,
        ) -> TTSResult<Option<Vec<u8>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let result = tokio::select! {
                _ = cancel.cancelled() => Err(TTSError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(self.delay_ms)) => match text {
                    "boom" => Err(TTSError::Protocol(
                        crate::core::tts::ProtocolViolation::TurnEndedBeforeAudio,
                    )),
                    "silent" => Ok(None),
                    _ => Ok(Some(text.as_bytes().to_vec())),
                },
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn setup(
        delay_ms: u64,
    ) -> (
        TempDir,
        Arc<EchoSynthesizer>,
        Arc<FingerprintCache<EchoSynthesizer>>,
    ) {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(EchoSynthesizer {
            delay_ms,
            ..Default::default()
        });
        let cache = Arc::new(FingerprintCache::new(
            synth.clone(),
            CacheOptions::new(dir.path()),
        ));
        (dir, synth, cache)
    }

    #[test]
    fn test_normalize_inputs() {
        assert_eq!(
            normalize_inputs([" a ", "", "b", "a", "   ", "c", "b"]),
            vec!["a", "b", "c"]
        );
    }

    #[tokio::test]
    async fn test_blank_items_skipped_and_progress_reported() {
        let (_dir, synth, cache) = setup(1);
        let progress = StdMutex::new(Vec::new());

        let results = synthesize_many(
            &cache,
            ["a", "", "b"],
            &SpeechSettings::default(),
            1,
            |done, total| progress.lock().unwrap().push((done, total)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.contains_key("a") && results.contains_key("b"));
        assert_eq!(*progress.lock().unwrap(), vec![(1, 2), (2, 2)]);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (_dir, synth, cache) = setup(20);
        let texts: Vec<String> = (0..12).map(|i| format!("item {i}")).collect();

        let results = synthesize_many(
            &cache,
            &texts,
            &SpeechSettings::default(),
            3,
            |_, _| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 12);
        assert!(synth.peak.load(Ordering::SeqCst) <= 3);
        assert!(synth.peak.load(Ordering::SeqCst) >= 2);
    }

    /// Blocks its worker thread while synthesizing.
    #[derive(Default)]
    struct BlockingSynthesizer {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for BlockingSynthesizer {
        async fn synthesize(
            &self,
            text: &str,
            _settings: &SpeechSettings,
            _cancel: &CancellationToken,
        ) -> TTSResult<Option<Vec<u8>>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(100));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Some(text.as_bytes().to_vec()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_items_run_on_parallel_tasks() {
        let dir = TempDir::new().unwrap();
        let synth = Arc::new(BlockingSynthesizer::default());
        let cache = Arc::new(FingerprintCache::new(
            synth.clone(),
            CacheOptions::new(dir.path()),
        ));

        let results = synthesize_many(
            &cache,
            ["a", "b", "c", "d"],
            &SpeechSettings::default(),
            2,
            |_, _| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 4);
        assert_eq!(synth.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_silent_items_are_omitted() {
        let (_dir, _synth, cache) = setup(1);
        let results = synthesize_many(
            &cache,
            ["a", "silent"],
            &SpeechSettings::default(),
            2,
            |_, _| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results.contains_key("a"));
    }

    #[tokio::test]
    async fn test_item_failure_aborts_batch() {
        let (_dir, _synth, cache) = setup(1);
        let err = synthesize_many(
            &cache,
            ["a", "boom", "c"],
            &SpeechSettings::default(),
            1,
            |_, _| {},
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, TTSError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_cancellation_is_all_or_nothing() {
        let (_dir, _synth, cache) = setup(200);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let err = synthesize_many(
            &cache,
            ["a", "b", "c", "d", "e"],
            &SpeechSettings::default(),
            2,
            |_, _| {},
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (_dir, synth, cache) = setup(1);
        let results = synthesize_many(
            &cache,
            Vec::<String>::new(),
            &SpeechSettings::default(),
            4,
            |_, _| panic!("no progress expected"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(results.is_empty());
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }
}
