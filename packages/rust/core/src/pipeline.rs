//! Resumable report pipeline: init → extracted → transformed → loaded → complete.
//!
//! Each call to [`ReportPipeline::step`] runs the one stage that follows the
//! persisted state and records the new state with a compare-and-set. A run
//! that dies between stages resumes from the last recorded state; rows are
//! reloaded from the job document when the in-memory copy is gone.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use sellerreport_report::{CostTable, write_workbook};
use sellerreport_shared::{
    JobId, JobState, RawRow, ReportError, ReportJob, Result, RowUpdate, Stage,
};
use sellerreport_sources::ReportSource;
use sellerreport_storage::{Bucket, Transition, XLSX_CONTENT_TYPE};

use crate::deps::PipelineDeps;

/// Logical name of the optional cost sheet among a job's aux files.
pub const COSTS_FILE: &str = "costs";

/// Summary of one `run` call.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub job_id: JobId,
    /// State the job was in when the run started.
    pub started_from: JobState,
    pub final_state: JobState,
    /// Stages executed by this run, in order.
    pub stages: Vec<Stage>,
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a stage starts.
    fn stage_started(&self, stage: Stage);
    /// Called after each row is enriched during the transform stage.
    fn row_enriched(&self, current: usize, total: usize);
    /// Called once a stage's transition is persisted.
    fn stage_finished(&self, state: JobState);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage: Stage) {}
    fn row_enriched(&self, _current: usize, _total: usize) {}
    fn stage_finished(&self, _state: JobState) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// Drives one job through its remaining stages.
pub struct ReportPipeline<'a> {
    deps: &'a PipelineDeps,
    progress: &'a dyn ProgressReporter,
    job: ReportJob,
    source: Box<dyn ReportSource>,
    /// Rows as of the last persisted stage, when held in memory.
    rows: Option<Vec<RawRow>>,
}

impl<'a> ReportPipeline<'a> {
    /// Load the job document and build its source.
    pub async fn open(
        job_id: &JobId,
        deps: &'a PipelineDeps,
        progress: &'a dyn ProgressReporter,
    ) -> Result<Self> {
        let mut job = deps
            .storage
            .find_report(job_id)
            .await?
            .ok_or_else(|| ReportError::not_found(job_id))?;
        let source = deps
            .registry
            .build(job.platform, job.doc_type, &deps.settings)?;

        // The document's rows seed the cache; later stages go through
        // `ensure_rows`.
        let rows = job.rows.take();
        debug!(
            job_id = %job.id,
            state = %job.state,
            source = source.name(),
            rows = rows.as_ref().map(Vec::len),
            "pipeline opened"
        );

        Ok(Self {
            deps,
            progress,
            job,
            source,
            rows,
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job.id
    }

    pub fn state(&self) -> JobState {
        self.job.state
    }

    /// Run the stage after the current state. A complete job is left as is.
    pub async fn step(&mut self) -> Result<JobState> {
        let Some(stage) = self.job.state.next_stage() else {
            return Ok(self.job.state);
        };

        self.progress.stage_started(stage);
        match stage {
            Stage::Extract => self.extract().await?,
            Stage::Transform => self.transform().await?,
            Stage::Load => self.load().await?,
            Stage::Finalize => self.advance(Stage::Finalize, None).await?,
        }
        self.progress.stage_finished(self.job.state);
        Ok(self.job.state)
    }

    /// Step until the job is complete.
    #[instrument(skip(self), fields(job_id = %self.job.id, platform = %self.job.platform))]
    pub async fn run(&mut self) -> Result<RunSummary> {
        let start = Instant::now();
        let started_from = self.job.state;
        let mut stages = Vec::new();

        info!(state = %started_from, "starting report run");
        while let Some(stage) = self.job.state.next_stage() {
            self.step().await?;
            stages.push(stage);
        }

        let summary = RunSummary {
            job_id: self.job.id.clone(),
            started_from,
            final_state: self.job.state,
            stages,
            elapsed: start.elapsed(),
        };
        self.progress.done(&summary);
        info!(
            stages = summary.stages.len(),
            elapsed_ms = summary.elapsed.as_millis(),
            "report run complete"
        );
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    #[instrument(skip_all, fields(job_id = %self.job.id))]
    async fn extract(&mut self) -> Result<()> {
        let rows = self.source.collect(&self.job.period).await?;
        info!(rows = rows.len(), "rows collected");

        self.advance(Stage::Extract, Some(&rows)).await?;
        self.rows = Some(rows);
        Ok(())
    }

    #[instrument(skip_all, fields(job_id = %self.job.id))]
    async fn transform(&mut self) -> Result<()> {
        self.ensure_rows().await?;
        let mut rows = self.rows().to_vec();

        let total = rows.len();
        for (i, row) in rows.iter_mut().enumerate() {
            let update = self.source.row_updates(row).await?;
            merge_row_update(row, update);
            self.progress.row_enriched(i + 1, total);
        }

        self.advance(Stage::Transform, Some(&rows)).await?;
        self.rows = Some(rows);
        Ok(())
    }

    #[instrument(skip_all, fields(job_id = %self.job.id))]
    async fn load(&mut self) -> Result<()> {
        self.ensure_rows().await?;

        let costs = self.load_costs()?;
        let views = self.source.build_views(self.rows(), costs.as_ref())?;
        let views: Vec<_> = views
            .into_iter()
            .map(|view| self.deps.labels.apply(view))
            .collect();
        let bytes = write_workbook(&views)?;

        let key = self.job.id.to_string();
        let meta = self
            .deps
            .blobs
            .put(Bucket::Reports, &key, &bytes, XLSX_CONTENT_TYPE)?;
        info!(sheets = views.len(), size = meta.size, "workbook uploaded");

        self.advance(Stage::Load, None).await
    }

    fn load_costs(&self) -> Result<Option<CostTable>> {
        let Some(key) = self.job.aux_file(COSTS_FILE) else {
            return Ok(None);
        };
        let bytes = self
            .deps
            .blobs
            .get(Bucket::Files, key)?
            .ok_or_else(|| ReportError::Storage(format!("cost sheet blob {key} is missing")))?;
        let costs = CostTable::from_xlsx(&bytes)?;
        if costs.is_empty() {
            warn!(job_id = %self.job.id, "cost sheet has no items");
        } else {
            debug!(items = costs.len(), "cost sheet loaded");
        }
        Ok(Some(costs))
    }

    // -----------------------------------------------------------------------
    // State helpers
    // -----------------------------------------------------------------------

    /// Reload rows from the job document when they are not in memory.
    async fn ensure_rows(&mut self) -> Result<()> {
        if self.rows.is_some() {
            return Ok(());
        }

        let job = self
            .deps
            .storage
            .find_report(&self.job.id)
            .await?
            .ok_or_else(|| ReportError::not_found(&self.job.id))?;
        let rows = job.rows.ok_or_else(|| {
            ReportError::Storage(format!(
                "job {} is in state {} but has no rows",
                self.job.id, self.job.state
            ))
        })?;
        debug!(job_id = %self.job.id, rows = rows.len(), "rows reloaded");
        self.rows = Some(rows);
        Ok(())
    }

    fn rows(&self) -> &[RawRow] {
        self.rows.as_deref().unwrap_or_default()
    }

    /// Persist the state after `stage`, only if the job is still where this
    /// pipeline last saw it.
    async fn advance(&mut self, stage: Stage, rows: Option<&[RawRow]>) -> Result<()> {
        let expected = self.job.state;
        let next = stage.state_after();
        let transition = match rows {
            Some(rows) => Transition::to(next).with_rows(rows),
            None => Transition::to(next),
        };

        let applied = self
            .deps
            .storage
            .compare_and_set(&self.job.id, expected, &transition)
            .await?;
        if !applied {
            return Err(ReportError::Conflict {
                job_id: self.job.id.to_string(),
                expected: expected.to_string(),
            });
        }

        self.job.state = next;
        info!(job_id = %self.job.id, from = %expected, state = %next, "state advanced");
        Ok(())
    }
}

/// Load and run a job to completion.
pub async fn process_job(
    job_id: &JobId,
    deps: &PipelineDeps,
    progress: &dyn ProgressReporter,
) -> Result<RunSummary> {
    let mut pipeline = ReportPipeline::open(job_id, deps, progress).await?;
    pipeline.run().await
}

/// Merge enrichment fields into a row in place. Existing fields keep their
/// position; new ones are appended.
pub fn merge_row_update(row: &mut RawRow, update: RowUpdate) {
    for (key, value) in update {
        row.insert(key, value);
    }
}
