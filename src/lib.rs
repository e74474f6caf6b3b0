// src/lib.rs

//! Inspection Crawler Library
//!
//! Resumable batch crawler for inspection detail pages: identifiers are
//! fetched in fixed-size batches, extracted into field records, snapshotted,
//! exported as CSV and checkpointed.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
