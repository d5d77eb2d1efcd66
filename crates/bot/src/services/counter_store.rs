//! Durable storage for the order counter record.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bakery_orders_core::StoredCounter;
use thiserror::Error;

/// Errors from reading or writing the counter record.
#[derive(Debug, Error)]
pub enum CounterStoreError {
    /// Filesystem error.
    #[error("counter store I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stored content is not a counter record.
    #[error("counter record is corrupt: {0}")]
    Corrupt(String),
}

/// Read/write access to the single persisted counter record.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the record; `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<StoredCounter>, CounterStoreError>;

    /// Replace the record.
    async fn save(&self, record: &StoredCounter) -> Result<(), CounterStoreError>;
}

/// Counter record kept as a small JSON file.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct JsonFileCounterStore {
    path: PathBuf,
}

impl JsonFileCounterStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CounterStore for JsonFileCounterStore {
    async fn load(&self) -> Result<Option<StoredCounter>, CounterStoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Err(CounterStoreError::Corrupt("file is empty".to_string()));
        }

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CounterStoreError::Corrupt(e.to_string()))
    }

    async fn save(&self, record: &StoredCounter) -> Result<(), CounterStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec(record)
            .map_err(|e| CounterStoreError::Corrupt(e.to_string()))?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCounterStore::new(dir.path().join("counter.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCounterStore::new(dir.path().join("nested/counter.json"));
        let record = StoredCounter {
            counter: 41,
            month: 5,
            year: Some(2024),
        };

        store.save(&record).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(record));
        assert!(!store.temp_path().exists());
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, r#"{"counter":41,"month":5,"year":2024}"#);
    }

    #[tokio::test]
    async fn test_legacy_record_without_year() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        std::fs::write(&path, r#"{"counter": 3, "month": 11}"#).unwrap();

        let loaded = JsonFileCounterStore::new(path).load().await.unwrap().unwrap();
        assert_eq!(loaded.counter, 3);
        assert_eq!(loaded.year, None);
    }

    #[tokio::test]
    async fn test_empty_and_garbage_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.json");
        let store = JsonFileCounterStore::new(&path);

        std::fs::write(&path, "  \n").unwrap();
        assert!(matches!(
            store.load().await,
            Err(CounterStoreError::Corrupt(_))
        ));

        std::fs::write(&path, "{\"counter\": \"many\"}").unwrap();
        assert!(matches!(
            store.load().await,
            Err(CounterStoreError::Corrupt(_))
        ));
    }
}
