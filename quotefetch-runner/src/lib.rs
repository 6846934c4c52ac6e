//! quotefetch runner — settings, batch orchestration, sinks.
//!
//! This crate builds on `quotefetch-core` to provide:
//! - Settings and batch plan files (TOML)
//! - Batch orchestration with per-item failure isolation
//! - JSON / CSV / append-only text sinks
//! - Analysis prompt assembly from run summaries

pub mod batch;
pub mod config;
pub mod plan;
pub mod prompt;
pub mod sink;

pub use batch::{
    BatchItem, BatchProgress, BatchResult, BatchRunner, FailureDescriptor, ItemOutcome,
    ItemReport, LogProgress, NoProgress, SinkPlan, Stage,
};
pub use config::{BatchSettings, CatalogSettings, OutputSettings, Settings, SettingsError, VendorSettings};
pub use plan::{BatchPlan, PlanItem};
