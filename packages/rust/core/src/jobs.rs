//! Request-level job operations: create, inspect, fetch the artifact.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use sellerreport_report::CostTable;
use sellerreport_shared::{
    DocType, JobId, JobState, NewReport, Platform, ReportError, ReportPeriod, Result,
};
use sellerreport_storage::{BlobMeta, Bucket, XLSX_CONTENT_TYPE};

use crate::deps::PipelineDeps;
use crate::pipeline::COSTS_FILE;

/// Job creation input as received from a caller. Every field is optional
/// here so that missing values surface as validation errors.
#[derive(Debug, Clone, Default)]
pub struct CreateJobRequest {
    pub platform: Option<String>,
    pub doc_type: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub files: Vec<UploadedFile>,
}

/// An auxiliary input uploaded with a job.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Logical name, e.g. `costs`.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Job metadata without its rows.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub platform: Platform,
    pub doc_type: DocType,
    pub period: ReportPeriod,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aux_files: BTreeMap<String, String>,
    pub artifact_ready: bool,
    /// Stored workbook metadata once the job is complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<BlobMeta>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of asking for a job's workbook.
#[derive(Debug)]
pub enum ArtifactStatus {
    Ready(Vec<u8>),
    NotReady(JobState),
}

/// Validate the request, store its files, and insert the job in `init`.
///
/// Nothing is written unless every check passes.
#[instrument(skip_all)]
pub async fn create_job(deps: &PipelineDeps, request: CreateJobRequest) -> Result<JobId> {
    let platform: Platform = required(&request.platform, "platform")?.parse()?;
    let doc_type: DocType = required(&request.doc_type, "doc_type")?.parse()?;
    let period = ReportPeriod::parse(
        required(&request.date_from, "date_from")?,
        required(&request.date_to, "date_to")?,
    )?;
    if !deps.registry.supports(platform, doc_type) {
        return Err(ReportError::validation(format!(
            "doc type '{doc_type}' is not available for platform '{platform}'"
        )));
    }
    for file in &request.files {
        validate_file(file)?;
    }

    let mut aux_files = BTreeMap::new();
    for file in &request.files {
        let key = deps
            .blobs
            .put_content_addressed(Bucket::Files, &file.bytes, XLSX_CONTENT_TYPE)?;
        aux_files.insert(file.name.clone(), key);
    }

    let id = deps
        .storage
        .insert_report(&NewReport {
            platform,
            doc_type,
            period,
            aux_files,
        })
        .await?;
    info!(job_id = %id, %platform, %doc_type, "job accepted");
    Ok(id)
}

/// Job metadata and state.
///
/// The workbook only counts as ready once the job is complete; a job left in
/// `loaded` by a crash or a lost race is still pending.
pub async fn get_job(deps: &PipelineDeps, id: &JobId) -> Result<JobView> {
    let job = deps
        .storage
        .find_report(id)
        .await?
        .ok_or_else(|| ReportError::not_found(id))?;

    let artifact = if job.state.is_terminal() {
        deps.blobs.meta(Bucket::Reports, &job.id.to_string())?
    } else {
        None
    };

    Ok(JobView {
        row_count: job.rows.as_ref().map(Vec::len),
        artifact_ready: artifact.is_some(),
        artifact,
        id: job.id,
        platform: job.platform,
        doc_type: job.doc_type,
        period: job.period,
        state: job.state,
        aux_files: job.aux_files,
        created_at: job.created_at,
        updated_at: job.updated_at,
    })
}

/// The workbook of a complete job; otherwise the current state.
pub async fn get_artifact(deps: &PipelineDeps, id: &JobId) -> Result<ArtifactStatus> {
    let view = get_job(deps, id).await?;
    if !view.artifact_ready {
        if view.state.is_terminal() {
            warn!(job_id = %id, "job is complete but its workbook is missing");
        }
        return Ok(ArtifactStatus::NotReady(view.state));
    }

    match deps.blobs.get(Bucket::Reports, &id.to_string())? {
        Some(bytes) => Ok(ArtifactStatus::Ready(bytes)),
        None => Ok(ArtifactStatus::NotReady(view.state)),
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ReportError::validation(format!("{field} is required"))),
    }
}

fn validate_file(file: &UploadedFile) -> Result<()> {
    if file.name.trim().is_empty() {
        return Err(ReportError::validation("uploaded file has no name"));
    }
    if file.bytes.is_empty() {
        return Err(ReportError::validation(format!("file '{}' is empty", file.name)));
    }
    if file.name == COSTS_FILE {
        CostTable::from_xlsx(&file.bytes).map_err(|e| {
            ReportError::validation(format!("file '{COSTS_FILE}' is not a usable cost sheet: {e}"))
        })?;
    }
    Ok(())
}
