// src/models/mod.rs

//! Domain models for the crawler application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod batch;
mod config;
mod layout;
mod record;

// Re-export all public types
pub use batch::{BatchRange, BatchSnapshot, Checkpoint, ExportArtifact};
pub use config::{BatchConfig, Config, CrawlerConfig, PathsConfig};
pub use layout::{FieldSpec, PageLayout, SectionKind, SectionSpec};
pub use record::FieldRecord;
