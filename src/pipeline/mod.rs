//! Pipeline entry points for crawler operations.
//!
//! - `BatchRunner`: Resumable fetch, snapshot, export and checkpoint cycle
//! - `run_crawler`: Wire configuration, storage and the HTTP source together

pub mod batch;
pub mod crawl;

pub use batch::{BatchOptions, BatchRunner, BatchState, RunSummary};
pub use crawl::{run_crawler, run_with_source};
