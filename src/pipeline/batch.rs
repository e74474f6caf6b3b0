// src/pipeline/batch.rs

//! Resumable batch runner.
//!
//! Identifiers are processed sequentially in fixed-size batches. Each batch
//! is snapshotted before it is exported and the checkpoint only advances
//! after both, so an interrupted run resumes without refetching completed
//! work and without losing a fetched batch.

use std::fmt;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::{BatchRange, BatchSnapshot, Checkpoint, Config, FieldRecord};
use crate::services::{Extraction, FetchSession, PageSource, RecordExtractor, RetryPolicy};
use crate::storage::{CheckpointStore, ResultExporter};

/// Where the runner currently is in its batch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    FetchingBatch(BatchRange),
    SnapshottingBatch(BatchRange),
    Exporting(BatchRange),
    CheckpointAdvanced(BatchRange),
    Done,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::FetchingBatch(range) => write!(f, "fetching {range}"),
            Self::SnapshottingBatch(range) => write!(f, "snapshotting {range}"),
            Self::Exporting(range) => write!(f, "exporting {range}"),
            Self::CheckpointAdvanced(range) => write!(f, "checkpoint advanced past {range}"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Tunables for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub batch_size: usize,
    /// Pause between consecutive identifiers
    pub request_delay: Duration,
    pub retry: RetryPolicy,
}

impl From<&Config> for BatchOptions {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.batch.batch_size.max(1),
            request_delay: config.crawler.request_delay(),
            retry: RetryPolicy::from(&config.crawler),
        }
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Identifiers in the input
    pub total: usize,
    /// Offset the run started from
    pub resume_offset: usize,
    /// Batches processed in this run
    pub batches: usize,
    /// Records extracted in this run
    pub records: usize,
    /// Records written to artifacts in this run, recovery included
    pub exported: usize,
    /// Pages that loaded without their content container
    pub degraded: Vec<String>,
    /// Identifiers dropped after every fetch attempt failed
    pub failed: Vec<String>,
    /// Batches whose export failed; their snapshots are retained
    pub export_failures: Vec<BatchRange>,
    /// Snapshots exported by a recovery pass
    pub recovered: Vec<BatchRange>,
}

impl RunSummary {
    /// Whether every batch of this run reached an artifact.
    pub fn is_clean(&self) -> bool {
        self.export_failures
            .iter()
            .all(|range| self.recovered.contains(range))
    }
}

/// Drives fetch, extraction, snapshot, export and checkpoint per batch.
pub struct BatchRunner<'a, S: PageSource> {
    source: &'a S,
    extractor: &'a RecordExtractor,
    store: &'a dyn CheckpointStore,
    exporter: &'a dyn ResultExporter,
    options: BatchOptions,
    state: BatchState,
    requests: usize,
}

impl<'a, S: PageSource> BatchRunner<'a, S> {
    pub fn new(
        source: &'a S,
        extractor: &'a RecordExtractor,
        store: &'a dyn CheckpointStore,
        exporter: &'a dyn ResultExporter,
        options: BatchOptions,
    ) -> Self {
        Self {
            source,
            extractor,
            store,
            exporter,
            options,
            state: BatchState::Idle,
            requests: 0,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Process `identifiers` from the persisted resume point to the end.
    ///
    /// Only checkpoint and snapshot storage errors abort the run; fetch and
    /// export failures are logged and recorded in the summary.
    pub async fn run(&mut self, identifiers: &[String]) -> Result<RunSummary> {
        self.set_state(BatchState::Idle);

        let resume = self.resume_offset().await?;
        let mut summary = RunSummary {
            total: identifiers.len(),
            resume_offset: resume,
            ..Default::default()
        };

        self.recover(&mut summary).await?;

        let plan = BatchRange::plan(resume, identifiers.len(), self.options.batch_size);
        if plan.is_empty() {
            log::info!(
                "All {} identifiers already processed (resume offset {})",
                identifiers.len(),
                resume
            );
        } else {
            log::info!(
                "Resuming at offset {} of {}: {} batch(es) of up to {}",
                resume,
                identifiers.len(),
                plan.len(),
                self.options.batch_size
            );
        }

        for range in plan {
            self.run_batch(identifiers, range, &mut summary).await?;
        }

        self.set_state(BatchState::Done);
        self.recover(&mut summary).await?;

        Ok(summary)
    }

    async fn run_batch(
        &mut self,
        identifiers: &[String],
        range: BatchRange,
        summary: &mut RunSummary,
    ) -> Result<()> {
        self.set_state(BatchState::FetchingBatch(range));
        log::info!("Batch {} ({} identifiers)", range, range.len());

        let records = self
            .fetch_batch(&identifiers[range.start..range.end], summary)
            .await;
        summary.records += records.len();

        if records.is_empty() {
            log::warn!("Batch {} produced no records; nothing to export", range);
        } else {
            self.set_state(BatchState::SnapshottingBatch(range));
            self.retire_latest_snapshot(range, summary).await?;
            let snapshot = BatchSnapshot::new(range, records);
            self.store.save_snapshot(&snapshot).await?;

            self.set_state(BatchState::Exporting(range));
            match self.exporter.export(&snapshot.records, range).await {
                Ok(artifact) => summary.exported += artifact.record_count,
                Err(e) => {
                    log::error!("{}; snapshot kept for recovery", e);
                    summary.export_failures.push(range);
                }
            }
        }

        self.store.save_checkpoint(&Checkpoint::completed(range)).await?;
        self.set_state(BatchState::CheckpointAdvanced(range));
        summary.batches += 1;

        log::info!(
            "Batch {} complete: {} records, {} failed so far",
            range,
            summary.records,
            summary.failed.len()
        );
        Ok(())
    }

    async fn fetch_batch(
        &mut self,
        batch: &[String],
        summary: &mut RunSummary,
    ) -> Vec<FieldRecord> {
        let mut records = Vec::with_capacity(batch.len());

        for identifier in batch {
            if self.requests > 0 && !self.options.request_delay.is_zero() {
                tokio::time::sleep(self.options.request_delay).await;
            }
            self.requests += 1;

            let Some(extraction) = self.fetch_one(identifier).await else {
                let error = AppError::Fetch {
                    identifier: identifier.clone(),
                    attempts: self.options.retry.attempts,
                };
                log::error!("{}; identifier dropped", error);
                if let Err(e) = self.store.record_failure(identifier).await {
                    log::warn!("Could not record failed identifier {}: {}", identifier, e);
                }
                summary.failed.push(identifier.clone());
                continue;
            };

            if extraction.is_degraded() {
                summary.degraded.push(identifier.clone());
            }
            records.push(extraction.into_record());
        }

        records
    }

    /// Fetch and extract one identifier. `None` when the page never loaded.
    async fn fetch_one(&self, identifier: &str) -> Option<Extraction> {
        let mut session = match FetchSession::acquire(self.source, self.options.retry).await {
            Ok(session) => session,
            Err(e) => {
                log::error!("Could not open a session for {}: {}", identifier, e);
                return None;
            }
        };

        let extraction = if session.navigate(identifier).await {
            session
                .page()
                .map(|markup| self.extractor.extract(markup, identifier))
        } else {
            None
        };
        session.release();
        extraction
    }

    /// Resume after the furthest point any durable state has reached.
    async fn resume_offset(&self) -> Result<usize> {
        let checkpoint = self.store.load_offset().await?;
        let artifact = self
            .exporter
            .exported_ranges()
            .await?
            .iter()
            .map(|range| range.end)
            .max()
            .unwrap_or(0);
        let snapshot = self
            .store
            .load_latest_snapshot()
            .await?
            .map_or(0, |snapshot| snapshot.range.end);

        log::debug!(
            "Resume sources: checkpoint {}, artifacts {}, snapshot {}",
            checkpoint,
            artifact,
            snapshot
        );
        Ok(checkpoint.max(artifact).max(snapshot))
    }

    /// Make sure the latest snapshot has an artifact before it is replaced;
    /// park it when exporting still fails.
    async fn retire_latest_snapshot(
        &self,
        next: BatchRange,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let Some(previous) = self.store.load_latest_snapshot().await? else {
            return Ok(());
        };
        if previous.range == next || self.exporter.is_exported(previous.range).await? {
            return Ok(());
        }

        log::warn!(
            "Snapshot for batch {} has no artifact; exporting before replacing it",
            previous.range
        );
        match self.exporter.export(&previous.records, previous.range).await {
            Ok(artifact) => {
                summary.exported += artifact.record_count;
                summary.recovered.push(previous.range);
            }
            Err(e) => {
                log::error!("{}", e);
                self.store.park_snapshot(&previous).await?;
            }
        }
        Ok(())
    }

    /// Export every retained snapshot that has no artifact yet.
    async fn recover(&self, summary: &mut RunSummary) -> Result<()> {
        for snapshot in self.store.parked_snapshots().await? {
            if self.exporter.is_exported(snapshot.range).await? {
                self.store.discard_parked(snapshot.range).await?;
                continue;
            }
            if self.recover_snapshot(&snapshot, summary).await {
                self.store.discard_parked(snapshot.range).await?;
            }
        }

        if let Some(latest) = self.store.load_latest_snapshot().await? {
            if !self.exporter.is_exported(latest.range).await? {
                self.recover_snapshot(&latest, summary).await;
            }
        }
        Ok(())
    }

    async fn recover_snapshot(&self, snapshot: &BatchSnapshot, summary: &mut RunSummary) -> bool {
        log::info!(
            "Recovering batch {} from snapshot written {}",
            snapshot.range,
            snapshot.written_at
        );
        match self.exporter.export(&snapshot.records, snapshot.range).await {
            Ok(artifact) => {
                summary.exported += artifact.record_count;
                if !summary.recovered.contains(&snapshot.range) {
                    summary.recovered.push(snapshot.range);
                }
                true
            }
            Err(e) => {
                log::error!("Recovery of batch {} failed: {}", snapshot.range, e);
                false
            }
        }
    }

    fn set_state(&mut self, state: BatchState) {
        log::debug!("Runner state: {}", state);
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.batch.batch_size = 0;
        config.crawler.request_delay_ms = 250;

        let options = BatchOptions::from(&config);
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.request_delay, Duration::from_millis(250));
        assert_eq!(options.retry.attempts, 3);
    }

    #[test]
    fn test_summary_clean_when_failures_recovered() {
        let range = BatchRange::new(0, 2);
        let mut summary = RunSummary {
            export_failures: vec![range],
            ..Default::default()
        };
        assert!(!summary.is_clean());

        summary.recovered.push(range);
        assert!(summary.is_clean());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            BatchState::FetchingBatch(BatchRange::new(0, 2)).to_string(),
            "fetching 0~2"
        );
        assert_eq!(BatchState::Done.to_string(), "done");
    }
}
