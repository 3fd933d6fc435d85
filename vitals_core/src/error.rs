//! Error types for the vitals_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for vitals_core operations
///
/// `Parse` and `Derivation` are absorbed where they occur (a row is skipped,
/// a field becomes absent). `Store` and `Upstream` abort a whole refresh.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed date or field in a source row
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid input to a derived-metric formula
    #[error("Derivation error: {0}")]
    Derivation(String),

    /// Persistence failure; the store keeps its previous state
    #[error("Store error: {0}")]
    Store(String),

    /// The page source failed to supply data
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// A fault inside the pipeline itself, such as a caught panic
    #[error("Internal error: {0}")]
    Internal(String),
}
