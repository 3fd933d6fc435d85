#![forbid(unsafe_code)]

//! Core domain model and pipeline for the Vitals health tracker.
//!
//! This crate provides:
//! - Domain types (raw rows, daily calorie and mass/waist records)
//! - Page scanning and record extraction
//! - Metric derivation (net calories, body-fat estimate)
//! - The reconciliation store
//! - Smoothing, trend fitting and chart payload assembly
//! - Single-flight refresh coordination and CSV export

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod derive;
pub mod page;
pub mod extract;
pub mod store;
pub mod smooth;
pub mod chart;
pub mod refresh;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use derive::{body_fat_estimate, BodyProfile};
pub use store::{IngestBatch, ReconciliationStore, StoreBackend, UpsertOutcome};
pub use smooth::GapResetEma;
pub use chart::{ChartAssembler, ChartPayload};
pub use refresh::{DirectoryPageSource, PageSource, RefreshCoordinator, RefreshOutcome};
