//! Report sources: collectors, enrichers and view builders per platform.
//!
//! This crate provides:
//! - [`platforms`]: the [`ReportSource`] trait, built-in sources, and the
//!   [`SourceRegistry`] that picks one per `(platform, doc_type)`
//! - [`fetcher`]: the paced HTTP client every network source goes through
//! - [`memo`]: per-run lookup cache

pub mod fetcher;
pub mod memo;
pub mod platforms;

pub use fetcher::PacedFetcher;
pub use memo::Memo;
pub use platforms::{
    ReportSource, SourceFactory, SourceRegistry, TestFinMonth, WbFinMonth,
};
