//! Core pipeline orchestration and job handling for SellerReport.
//!
//! This crate ties sources, report rendering and storage together: jobs are
//! created with [`jobs::create_job`] and driven to completion by
//! [`pipeline::process_job`].

pub mod deps;
pub mod jobs;
pub mod pipeline;

pub use deps::{PipelineDeps, load_labels};
pub use jobs::{
    ArtifactStatus, CreateJobRequest, JobView, UploadedFile, create_job, get_artifact, get_job,
};
pub use pipeline::{
    COSTS_FILE, ProgressReporter, ReportPipeline, RunSummary, SilentProgress, merge_row_update,
    process_job,
};
