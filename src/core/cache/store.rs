//! Filesystem artifact store.
//!
//! Artifacts live flat in one directory as `{fingerprint}.{ext}`. Writes go to
//! a uniquely named temp file that is renamed into place, so readers only ever
//! observe complete files even when two writers race on the same name.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::tts::{TTSError, TTSResult};

const TEMP_EXTENSION: &str = "tmp";

/// Flat directory of synthesized audio files.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base_path: PathBuf,
}

impl ArtifactStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    #[inline]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path an artifact with this fingerprint and extension lives at.
    pub fn path_for(&self, fingerprint: &str, extension: &str) -> PathBuf {
        self.base_path.join(format!("{fingerprint}.{extension}"))
    }

    /// Creates the base directory if needed.
    pub async fn ensure_dir(&self) -> TTSResult<()> {
        fs::create_dir_all(&self.base_path).await.map_err(|e| {
            TTSError::Storage(format!(
                "Failed to create cache directory {}: {e}",
                self.base_path.display()
            ))
        })
    }

    /// Whether a complete artifact exists at `path`.
    pub async fn exists(&self, path: &Path) -> TTSResult<bool> {
        match fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TTSError::Storage(format!(
                "Failed to stat {}: {e}",
                path.display()
            ))),
        }
    }

    /// Atomically writes `bytes` to `path`.
    pub async fn write(&self, path: &Path, bytes: &[u8]) -> TTSResult<()> {
        self.ensure_dir().await?;

        let temp_path = path.with_extension(format!(
            "{}.{TEMP_EXTENSION}",
            Uuid::new_v4().simple()
        ));

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path).await;
            return Err(TTSError::Storage(format!(
                "Failed to write {}: {e}",
                path.display()
            )));
        }

        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(())
    }

    /// Removes every file in the store and returns how many were deleted.
    pub async fn clear(&self) -> TTSResult<usize> {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        warn!("Clearing audio cache at {:?}", self.base_path);
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_exists() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("nested"));
        let path = store.path_for("abc", "mp3");

        assert!(!store.exists(&path).await.unwrap());
        store.write(&path, b"audio").await.unwrap();

        assert!(store.exists(&path).await.unwrap());
        assert_eq!(fs::read(&path).await.unwrap(), b"audio");
        assert_eq!(path.file_name().unwrap(), "abc.mp3");
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        store
            .write(&store.path_for("abc", "mp3"), b"one")
            .await
            .unwrap();
        store
            .write(&store.path_for("abc", "mp3"), b"two")
            .await
            .unwrap();

        let mut names = Vec::new();
        let mut entries = fs::read_dir(temp_dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["abc.mp3".to_string()]);
        assert_eq!(fs::read(store.path_for("abc", "mp3")).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());
        store.write(&store.path_for("a", "mp3"), b"1").await.unwrap();
        store.write(&store.path_for("b", "mp3"), b"2").await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(!store.exists(&store.path_for("a", "mp3")).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_missing_dir_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path().join("missing"));
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_storage_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, b"x").await.unwrap();

        let store = ArtifactStore::new(blocker.join("cache"));
        let err = store.ensure_dir().await.unwrap_err();
        assert!(matches!(err, TTSError::Storage(_)));
    }
}
