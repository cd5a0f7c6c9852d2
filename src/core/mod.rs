pub mod batch;
pub mod cache;
pub mod tts;

// Re-export commonly used types for convenience
pub use batch::{DEFAULT_BATCH_CONCURRENCY, synthesize_many};
pub use cache::{CacheOptions, CachedArtifact, FingerprintCache};
pub use tts::{
    OutputFormat, Pronunciation, ReadAloudConfig, ReadAloudTTS, SpeechSettings,
    SpeechSynthesizer, TTSError, TTSResult, create_tts_provider,
};
