//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::PageLayout;
use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and fetching behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Batch sizing
    #[serde(default)]
    pub batch: BatchConfig,

    /// Input and output locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Page layout used for extraction
    #[serde(default)]
    pub layout: PageLayout,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(config) => {
                log::info!("Loaded configuration from {}", path.as_ref().display());
                config
            }
            Err(e) => {
                log::warn!(
                    "Config load failed from {:?}: {}. Using defaults.",
                    path.as_ref(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.retry_count == 0 {
            return Err(AppError::validation("crawler.retry_count must be > 0"));
        }
        if !self.crawler.url_template.contains("{id}") {
            return Err(AppError::validation(
                "crawler.url_template must contain {id}",
            ));
        }
        if self.batch.batch_size == 0 {
            return Err(AppError::validation("batch.batch_size must be > 0"));
        }
        if self.paths.output_dir.as_os_str().is_empty() {
            return Err(AppError::validation("paths.output_dir is empty"));
        }
        if self.paths.id_column.trim().is_empty() {
            return Err(AppError::validation("paths.id_column is empty"));
        }
        if self.layout.fields.is_empty() && self.layout.sections.is_empty() {
            return Err(AppError::validation("layout defines no fields"));
        }
        Ok(())
    }
}

/// HTTP client and fetching behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between identifiers in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Total navigation attempts per identifier
    #[serde(default = "defaults::retry_count")]
    pub retry_count: u32,

    /// Fixed back-off between navigation attempts in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Detail page URL; `{id}` is replaced by the identifier
    #[serde(default = "defaults::url_template")]
    pub url_template: String,
}

impl CrawlerConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            retry_count: defaults::retry_count(),
            retry_delay_ms: defaults::retry_delay(),
            url_template: defaults::url_template(),
        }
    }
}

/// Batch sizing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Identifiers per batch
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
        }
    }
}

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Identifier list (`.txt`, `.csv` or `.xlsx`)
    #[serde(default = "defaults::input")]
    pub input: PathBuf,

    /// Directory for artifacts, snapshots and the failure log
    #[serde(default = "defaults::output_dir")]
    pub output_dir: PathBuf,

    /// Checkpoint file; defaults to `{output_dir}/checkpoint.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_file: Option<PathBuf>,

    /// Column holding identifiers in `.csv` input
    #[serde(default = "defaults::id_column")]
    pub id_column: String,

    /// File name prefix for batch artifacts
    #[serde(default = "defaults::artifact_prefix")]
    pub artifact_prefix: String,
}

impl PathsConfig {
    /// Resolved checkpoint location.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("checkpoint.json"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: defaults::input(),
            output_dir: defaults::output_dir(),
            checkpoint_file: None,
            id_column: defaults::id_column(),
            artifact_prefix: defaults::artifact_prefix(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; inspection-crawler/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        2000
    }
    pub fn retry_count() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        2000
    }
    pub fn url_template() -> String {
        "https://www.osha.gov/ords/imis/establishment.inspection_detail?id={id}".into()
    }

    // Batch defaults
    pub fn batch_size() -> usize {
        1000
    }

    // Path defaults
    pub fn input() -> PathBuf {
        PathBuf::from("Inspection Nrs.txt")
    }
    pub fn output_dir() -> PathBuf {
        PathBuf::from("inspection-detail")
    }
    pub fn id_column() -> String {
        "Inspection Nr".into()
    }
    pub fn artifact_prefix() -> String {
        "Inspection_Detail".into()
    }
}
