//! Inspection Crawler CLI
//!
//! Local execution entry point.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use inspection_crawler::{
    error::{AppError, Result},
    models::Config,
    pipeline,
    services::{RecordExtractor, load_identifiers},
    storage::{CheckpointStore, CsvExporter, LocalStorage, ResultExporter},
};

/// Resumable crawler for inspection detail pages
#[derive(Parser, Debug)]
#[command(
    name = "inspection-crawler",
    version,
    about = "Resumable batch crawler for inspection detail pages"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Command line values that take precedence over the configuration file.
#[derive(Args, Debug)]
struct Overrides {
    /// Identifier list (.txt, .csv or .xlsx)
    #[arg(short, long, global = true)]
    input: Option<PathBuf>,

    /// Output directory for artifacts and snapshots
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Checkpoint file location
    #[arg(long, global = true)]
    checkpoint: Option<PathBuf>,

    /// Identifiers per batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Delay between identifiers in milliseconds
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    /// Navigation attempts per identifier
    #[arg(long, global = true)]
    retry_count: Option<u32>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(input) = self.input {
            config.paths.input = input;
        }
        if let Some(output) = self.output {
            config.paths.output_dir = output;
        }
        if let Some(checkpoint) = self.checkpoint {
            config.paths.checkpoint_file = Some(checkpoint);
        }
        if let Some(batch_size) = self.batch_size {
            config.batch.batch_size = batch_size;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.crawler.request_delay_ms = delay_ms;
        }
        if let Some(retry_count) = self.retry_count {
            config.crawler.retry_count = retry_count;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl identifiers from the resume point to the end of the input
    Run,

    /// Concatenate every batch artifact into one CSV file
    Merge {
        /// Merged file (default: {output_dir}/{prefix}_merged.csv)
        #[arg(long)]
        to: Option<PathBuf>,
    },

    /// Validate configuration and layout selectors
    Validate,

    /// Show checkpoint, snapshot and artifact status
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = if cli.config.exists() {
        Config::load_or_default(&cli.config)
    } else {
        log::info!(
            "No configuration at {}; using defaults",
            cli.config.display()
        );
        Config::default()
    };
    cli.overrides.apply(&mut config);

    match cli.command {
        Command::Run => {
            config.validate()?;
            let summary = pipeline::run_crawler(&config).await?;
            if !summary.is_clean() {
                return Err(AppError::export(
                    "run",
                    "some batches have no artifact; rerun to retry",
                ));
            }
            log::info!("Crawl complete!");
        }

        Command::Merge { to } => {
            let exporter =
                CsvExporter::new(&config.paths.output_dir, &config.paths.artifact_prefix)?;
            let target = to.unwrap_or_else(|| {
                config
                    .paths
                    .output_dir
                    .join(format!("{}_merged.csv", config.paths.artifact_prefix))
            });

            let merged = exporter.merge_into(&target).await?;
            log::info!(
                "Merged {} artifacts ({} records, {} columns) into {}",
                merged.artifacts,
                merged.records,
                merged.columns,
                merged.path.display()
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            RecordExtractor::new(config.layout.clone())?;
            log::info!(
                "✓ Layout OK ({} fields, {} sections)",
                config.layout.fields.len(),
                config.layout.sections.len()
            );

            if config.paths.input.exists() {
                let identifiers =
                    load_identifiers(&config.paths.input, &config.paths.id_column)?;
                log::info!("✓ Input OK ({} identifiers)", identifiers.len());
            } else {
                log::warn!("Input {} not found", config.paths.input.display());
            }

            log::info!("All validations passed!");
        }

        Command::Info => {
            let storage = LocalStorage::with_checkpoint(
                &config.paths.output_dir,
                config.paths.checkpoint_path(),
            );
            let exporter =
                CsvExporter::new(&config.paths.output_dir, &config.paths.artifact_prefix)?;

            log::info!("Output directory: {}", config.paths.output_dir.display());

            match storage.load_checkpoint().await? {
                Some(checkpoint) => log::info!(
                    "Checkpoint: last batch started at {}, next offset {} (updated {})",
                    checkpoint.batch_start,
                    checkpoint.next_offset,
                    checkpoint.updated_at
                ),
                None => log::info!("No checkpoint found yet."),
            }

            match storage.load_latest_snapshot().await? {
                Some(snapshot) => {
                    let exported = exporter.is_exported(snapshot.range).await?;
                    log::info!(
                        "Latest snapshot: batch {} with {} records ({})",
                        snapshot.range,
                        snapshot.records.len(),
                        if exported { "exported" } else { "not exported" }
                    );
                }
                None => log::info!("No snapshot found yet."),
            }

            let parked = storage.parked_snapshots().await?;
            if !parked.is_empty() {
                log::warn!("{} parked snapshot(s) awaiting export", parked.len());
            }

            let ranges = exporter.exported_ranges().await?;
            log::info!("Artifacts: {}", ranges.len());
            for range in &ranges {
                log::info!("    {}", exporter.artifact_name(*range));
            }

            let failed = storage.failed_identifiers().await?;
            log::info!("Failed identifiers: {}", failed.len());
        }
    }

    log::info!("Done!");

    Ok(())
}
