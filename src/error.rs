// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSV reading or writing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet input could not be read
    #[error("Spreadsheet error: {0}")]
    Xlsx(#[from] calamine::XlsxError),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Navigation never succeeded for an identifier
    #[error("Fetch failed for {identifier} after {attempts} attempt(s)")]
    Fetch { identifier: String, attempts: u32 },

    /// Writing a batch artifact failed
    #[error("Export failed for batch {range}: {message}")]
    Export { range: String, message: String },

    /// Checkpoint or snapshot store is unusable
    #[error("Storage error at {location}: {message}")]
    Storage { location: String, message: String },
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an export error for a batch range.
    pub fn export(range: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Export {
            range: range.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a storage error with the offending location.
    pub fn storage(location: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Storage {
            location: location.to_string(),
            message: message.to_string(),
        }
    }
}
