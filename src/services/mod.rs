//! Service layer for the crawler application.
//!
//! This module contains the per-identifier logic:
//! - Identifier list loading (`load_identifiers`)
//! - Page fetching with bounded retry (`FetchSession`, `PageSource`)
//! - Record extraction (`RecordExtractor`)

mod extractor;
mod input;
mod session;

pub use extractor::{Extraction, RecordExtractor};
pub use input::load_identifiers;
pub use session::{FetchSession, HttpSource, PageSource, RetryPolicy};
