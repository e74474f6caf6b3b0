//! Local filesystem progress store.
//!
//! Checkpoint and snapshots are written atomically (temp file, then rename),
//! so a crash mid-write leaves the previous version in place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{BatchRange, BatchSnapshot, Checkpoint};
use crate::storage::{CheckpointStore, write_atomic};

const LATEST_SNAPSHOT: &str = "snapshots/latest.json";
const PARKED_DIR: &str = "snapshots/parked";
const FAILURE_LOG: &str = "failed_identifiers.txt";

/// Local filesystem progress store.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    checkpoint_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory, with the
    /// checkpoint at `{root}/checkpoint.json`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        Self {
            checkpoint_path: root_dir.join("checkpoint.json"),
            root_dir,
        }
    }

    /// Create a LocalStorage whose checkpoint lives elsewhere.
    pub fn with_checkpoint(root_dir: impl Into<PathBuf>, checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            checkpoint_path: checkpoint_path.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Path of the failed-identifiers log.
    pub fn failure_log_path(&self) -> PathBuf {
        self.path(FAILURE_LOG)
    }

    /// Identifiers recorded as failed, in order of first failure.
    pub async fn failed_identifiers(&self) -> Result<Vec<String>> {
        let Some(bytes) = self.read_bytes(&self.failure_log_path()).await? else {
            return Ok(Vec::new());
        };

        let mut identifiers: Vec<String> = Vec::new();
        for line in String::from_utf8_lossy(&bytes).lines().map(str::trim) {
            if !line.is_empty() && !identifiers.iter().any(|id| id == line) {
                identifiers.push(line.to_string());
            }
        }
        Ok(identifiers)
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    fn parked_path(&self, range: BatchRange) -> PathBuf {
        self.path(PARKED_DIR)
            .join(format!("{}-{}.json", range.start, range.end))
    }

    /// Write bytes atomically, reporting the location on failure.
    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        write_atomic(path, "tmp", bytes)
            .await
            .map_err(|e| AppError::storage(path.display(), e))
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(path, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match self.read_bytes(path).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AppError::storage(path.display(), e)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CheckpointStore for LocalStorage {
    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>> {
        self.read_json(&self.checkpoint_path).await
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(current) = self.load_checkpoint().await? {
            if current.next_offset > checkpoint.next_offset {
                log::warn!(
                    "Ignoring checkpoint {} behind stored offset {}",
                    checkpoint.next_offset,
                    current.next_offset
                );
                return Ok(());
            }
        }

        self.write_json(&self.checkpoint_path, checkpoint).await?;
        log::debug!(
            "Checkpoint saved: batch {} -> next offset {}",
            checkpoint.batch_start,
            checkpoint.next_offset
        );
        Ok(())
    }

    async fn save_snapshot(&self, snapshot: &BatchSnapshot) -> Result<()> {
        self.write_json(&self.path(LATEST_SNAPSHOT), snapshot).await?;
        log::debug!(
            "Snapshot saved: {} records for batch {}",
            snapshot.records.len(),
            snapshot.range
        );
        Ok(())
    }

    async fn load_latest_snapshot(&self) -> Result<Option<BatchSnapshot>> {
        self.read_json(&self.path(LATEST_SNAPSHOT)).await
    }

    async fn park_snapshot(&self, snapshot: &BatchSnapshot) -> Result<PathBuf> {
        let path = self.parked_path(snapshot.range);
        self.write_json(&path, snapshot).await?;
        log::warn!(
            "Snapshot for batch {} parked at {}",
            snapshot.range,
            path.display()
        );
        Ok(path)
    }

    async fn parked_snapshots(&self) -> Result<Vec<BatchSnapshot>> {
        let dir = self.path(PARKED_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(snapshot) = self.read_json::<BatchSnapshot>(&path).await? {
                    snapshots.push(snapshot);
                }
            }
        }

        snapshots.sort_by_key(|snapshot| snapshot.range);
        Ok(snapshots)
    }

    async fn discard_parked(&self, range: BatchRange) -> Result<()> {
        match tokio::fs::remove_file(self.parked_path(range)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn record_failure(&self, identifier: &str) -> Result<()> {
        // A batch re-run after a crash fails the same identifiers again.
        if self
            .failed_identifiers()
            .await?
            .iter()
            .any(|id| id == identifier)
        {
            log::debug!("{} already in the failure log", identifier);
            return Ok(());
        }

        let path = self.failure_log_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(format!("{identifier}\n").as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldRecord;
    use tempfile::TempDir;

    fn snapshot(start: usize, end: usize) -> BatchSnapshot {
        let mut record = FieldRecord::new();
        record.insert("Inspection Nr", start.to_string());
        BatchSnapshot::new(BatchRange::new(start, end), vec![record])
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let path = tmp.path().join("nested/test.txt");

        storage.write_bytes(&path, b"hello").await.unwrap();
        let data = storage.read_bytes(&path).await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
        assert!(!tmp.path().join("nested/test.tmp").exists());
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let data = storage.read_bytes(&tmp.path().join("nope.txt")).await.unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn test_offset_defaults_to_zero() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.load_checkpoint().await.unwrap().is_none());
        assert_eq!(storage.load_offset().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage
            .save_checkpoint(&Checkpoint::completed(BatchRange::new(2, 3)))
            .await
            .unwrap();

        let checkpoint = storage.load_checkpoint().await.unwrap().unwrap();
        assert_eq!(checkpoint.batch_start, 2);
        assert_eq!(checkpoint.next_offset, 3);
        assert_eq!(storage.load_offset().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_checkpoint_never_moves_backwards() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage
            .save_checkpoint(&Checkpoint::completed(BatchRange::new(4, 6)))
            .await
            .unwrap();
        storage
            .save_checkpoint(&Checkpoint::completed(BatchRange::new(0, 2)))
            .await
            .unwrap();

        assert_eq!(storage.load_offset().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_relocated_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let checkpoint_path = tmp.path().join("state/progress.json");
        let storage = LocalStorage::with_checkpoint(tmp.path().join("out"), &checkpoint_path);

        storage
            .save_checkpoint(&Checkpoint::completed(BatchRange::new(0, 5)))
            .await
            .unwrap();

        assert!(checkpoint_path.exists());
        assert!(!tmp.path().join("out/checkpoint.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_storage_error() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        std::fs::write(storage.checkpoint_path(), b"{not json").unwrap();

        assert!(matches!(
            storage.load_checkpoint().await,
            Err(AppError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn test_snapshot_replaced() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.save_snapshot(&snapshot(0, 2)).await.unwrap();
        storage.save_snapshot(&snapshot(2, 4)).await.unwrap();

        let latest = storage.load_latest_snapshot().await.unwrap().unwrap();
        assert_eq!(latest.range, BatchRange::new(2, 4));
        assert_eq!(latest.records[0].get("Inspection Nr"), Some("2"));
    }

    #[tokio::test]
    async fn test_park_and_discard() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.parked_snapshots().await.unwrap().is_empty());

        storage.park_snapshot(&snapshot(4, 6)).await.unwrap();
        storage.park_snapshot(&snapshot(0, 2)).await.unwrap();

        let parked = storage.parked_snapshots().await.unwrap();
        let ranges: Vec<_> = parked.iter().map(|s| s.range).collect();
        assert_eq!(ranges, vec![BatchRange::new(0, 2), BatchRange::new(4, 6)]);

        storage.discard_parked(BatchRange::new(0, 2)).await.unwrap();
        storage.discard_parked(BatchRange::new(0, 2)).await.unwrap();
        assert_eq!(storage.parked_snapshots().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_log_appends() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("out"));

        storage.record_failure("A2").await.unwrap();
        storage.record_failure("A7").await.unwrap();

        assert_eq!(storage.failed_identifiers().await.unwrap(), vec!["A2", "A7"]);
    }

    #[tokio::test]
    async fn test_failure_recorded_once_across_reruns() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path().join("out"));

        storage.record_failure("A2").await.unwrap();
        storage.record_failure("A7").await.unwrap();
        storage.record_failure("A2").await.unwrap();

        let log = std::fs::read_to_string(storage.failure_log_path()).unwrap();
        assert_eq!(log, "A2\nA7\n");
        assert_eq!(storage.failed_identifiers().await.unwrap(), vec!["A2", "A7"]);
    }

    #[tokio::test]
    async fn test_failed_identifiers_skips_duplicate_lines() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        std::fs::write(storage.failure_log_path(), "A2\nA7\nA2\n\n").unwrap();

        assert_eq!(storage.failed_identifiers().await.unwrap(), vec!["A2", "A7"]);
    }
}
