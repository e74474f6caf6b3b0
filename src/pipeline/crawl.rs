// src/pipeline/crawl.rs

//! Inspection detail crawling pipeline.

use chrono::Utc;

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::batch::{BatchOptions, BatchRunner, RunSummary};
use crate::services::{HttpSource, PageSource, RecordExtractor, load_identifiers};
use crate::storage::{CsvExporter, LocalStorage};

/// Run the crawler against the configured detail page over HTTP.
pub async fn run_crawler(config: &Config) -> Result<RunSummary> {
    let source = HttpSource::new(config.crawler.clone());
    run_with_source(config, &source).await
}

/// Run the crawler with any page source.
pub async fn run_with_source<S: PageSource>(config: &Config, source: &S) -> Result<RunSummary> {
    let start_time = Utc::now();
    log::info!("Inspection crawler starting");

    let identifiers = load_identifiers(&config.paths.input, &config.paths.id_column)?;
    let extractor = RecordExtractor::new(config.layout.clone())?;
    let storage = LocalStorage::with_checkpoint(
        &config.paths.output_dir,
        config.paths.checkpoint_path(),
    );
    let exporter = CsvExporter::new(&config.paths.output_dir, &config.paths.artifact_prefix)?;

    log::info!(
        "Writing artifacts to {} (checkpoint {})",
        config.paths.output_dir.display(),
        storage.checkpoint_path().display()
    );

    let mut runner = BatchRunner::new(
        source,
        &extractor,
        &storage,
        &exporter,
        BatchOptions::from(config),
    );
    let summary = runner.run(&identifiers).await?;

    let elapsed = Utc::now() - start_time;
    log::info!(
        "Crawl finished in {}s: {} batches, {} records extracted, {} exported",
        elapsed.num_seconds(),
        summary.batches,
        summary.records,
        summary.exported
    );
    if !summary.failed.is_empty() {
        log::warn!(
            "{} identifiers failed to load; see {}",
            summary.failed.len(),
            storage.failure_log_path().display()
        );
    }
    if !summary.degraded.is_empty() {
        log::warn!("{} pages loaded without content", summary.degraded.len());
    }
    if !summary.recovered.is_empty() {
        log::info!("Recovered {} batch(es) from snapshots", summary.recovered.len());
    }
    if !summary.is_clean() {
        log::error!(
            "{} batch(es) still lack an artifact; rerun to retry export",
            summary
                .export_failures
                .iter()
                .filter(|range| !summary.recovered.contains(range))
                .count()
        );
    }

    Ok(summary)
}
