//! Storage abstractions for crawl progress and results.
//!
//! Progress (checkpoint, batch snapshots, failure log) and results (tabular
//! batch artifacts) are kept apart so that a failed export never touches
//! the progress files.
//!
//! ## Directory Structure
//!
//! ```text
//! {output_dir}/
//! ├── checkpoint.json               # Resume position (unless relocated)
//! ├── failed_identifiers.txt        # One identifier per failed fetch
//! ├── Inspection_Detail(0~1000).csv # One artifact per exported batch
//! └── snapshots/
//!     ├── latest.json               # Most recent batch, written before export
//!     └── parked/
//!         └── {start}-{end}.json    # Superseded snapshots never exported
//! ```

pub mod export;
pub mod local;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::models::{BatchRange, BatchSnapshot, Checkpoint, ExportArtifact, FieldRecord};

// Re-export for convenience
pub use export::{CsvExporter, MergeSummary};
pub use local::LocalStorage;

/// Durable progress state of a crawl.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last persisted checkpoint, if any.
    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>>;

    /// Offset a resumed run continues from; 0 when no checkpoint exists.
    async fn load_offset(&self) -> Result<usize> {
        Ok(self
            .load_checkpoint()
            .await?
            .map_or(0, |checkpoint| checkpoint.next_offset))
    }

    /// Persist a checkpoint. Never lowers the stored `next_offset`.
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Replace the latest batch snapshot.
    async fn save_snapshot(&self, snapshot: &BatchSnapshot) -> Result<()>;

    /// Latest batch snapshot, if any.
    async fn load_latest_snapshot(&self) -> Result<Option<BatchSnapshot>>;

    /// Keep a snapshot aside so a newer one can take its place.
    async fn park_snapshot(&self, snapshot: &BatchSnapshot) -> Result<PathBuf>;

    /// All parked snapshots, ordered by range.
    async fn parked_snapshots(&self) -> Result<Vec<BatchSnapshot>>;

    /// Forget a parked snapshot once its artifact exists.
    async fn discard_parked(&self, range: BatchRange) -> Result<()>;

    /// Append an identifier whose fetch failed to the failure log.
    async fn record_failure(&self, identifier: &str) -> Result<()>;
}

/// Writes batch results to durable artifacts.
#[async_trait]
pub trait ResultExporter: Send + Sync {
    /// Write one artifact for `range`. Fails with `AppError::Export`.
    async fn export(&self, records: &[FieldRecord], range: BatchRange) -> Result<ExportArtifact>;

    /// Ranges that already have an artifact, ascending.
    async fn exported_ranges(&self) -> Result<Vec<BatchRange>>;

    /// Whether `range` already has an artifact.
    async fn is_exported(&self, range: BatchRange) -> Result<bool> {
        Ok(self.exported_ranges().await?.contains(&range))
    }
}

/// Write bytes atomically (write to a sibling temp file, then rename).
pub(crate) async fn write_atomic(path: &Path, tmp_extension: &str, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension(tmp_extension);
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await
}
