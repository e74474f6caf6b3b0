//! Batch bookkeeping types: ranges, checkpoints, snapshots and artifacts.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FieldRecord;

/// Half-open offset range `[start, end)` of a batch in the identifier list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchRange {
    pub start: usize,
    pub end: usize,
}

impl BatchRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split `[from, total)` into consecutive ranges of at most `size` items.
    pub fn plan(from: usize, total: usize, size: usize) -> Vec<BatchRange> {
        let size = size.max(1);
        (from..total)
            .step_by(size)
            .map(|start| BatchRange::new(start, start.saturating_add(size).min(total)))
            .collect()
    }
}

impl fmt::Display for BatchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.start, self.end)
    }
}

/// Persisted progress marker.
///
/// `batch_start` is the start offset of the most recently completed batch and
/// `next_offset` is where a resumed run continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub batch_start: usize,
    pub next_offset: usize,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Checkpoint recorded once `range` has been fully processed.
    pub fn completed(range: BatchRange) -> Self {
        Self {
            batch_start: range.start,
            next_offset: range.end,
            updated_at: Utc::now(),
        }
    }
}

/// Durable copy of one batch's records, written before export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub range: BatchRange,
    pub written_at: DateTime<Utc>,
    pub records: Vec<FieldRecord>,
}

impl BatchSnapshot {
    pub fn new(range: BatchRange, records: Vec<FieldRecord>) -> Self {
        Self {
            range,
            written_at: Utc::now(),
            records,
        }
    }
}

/// Tabular file written for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub range: BatchRange,
    pub path: PathBuf,
    pub record_count: usize,
    pub column_count: usize,
}
