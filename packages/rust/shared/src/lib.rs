//! Shared types, error model, and configuration for SellerReport.
//!
//! This crate is the foundation depended on by all other SellerReport crates.
//! It provides:
//! - [`ReportError`]: the unified error type
//! - Domain types ([`ReportJob`], [`JobState`], [`Stage`], [`RawRow`], [`JobId`])
//! - Configuration ([`AppConfig`], [`SourceSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, HttpConfig, LabelsConfig, PacingConfig, SourceSettings, StorageConfig, WbConfig,
    WbSettings, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_config, wb_api_key,
};
pub use error::{ReportError, Result};
pub use types::{
    DocType, JobId, JobState, NewReport, Platform, RawRow, ReportJob, ReportPeriod, RowUpdate,
    Stage, parse_date,
};
