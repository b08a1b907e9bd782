//! libSQL document store and filesystem blob store for report jobs.
//!
//! The [`Storage`] struct wraps a libSQL database holding one document per
//! report job: metadata, collected rows, auxiliary file references, and the
//! pipeline state. [`BlobStore`] holds uploaded inputs and generated
//! workbooks.
//!
//! **Write rules:**
//! - Jobs are created in `init` via [`Storage::insert_report`].
//! - Every later change goes through [`Storage::compare_and_set`], which only
//!   applies when the stored state still equals the caller's expected state.

pub mod blobs;
mod migrations;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};

use sellerreport_shared::{
    JobId, JobState, NewReport, RawRow, ReportError, ReportJob, ReportPeriod, Result, parse_date,
};

pub use blobs::{BlobMeta, BlobStore, Bucket, XLSX_CONTENT_TYPE};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// A state change plus the stage output persisted with it.
#[derive(Debug, Clone, Copy)]
pub struct Transition<'a> {
    /// State written when the expected state still matches.
    pub state: JobState,
    /// Replacement for the stored rows, when the stage produced them.
    pub rows: Option<&'a [RawRow]>,
}

impl<'a> Transition<'a> {
    /// A transition that only changes the state.
    pub fn to(state: JobState) -> Self {
        Self { state, rows: None }
    }

    /// Persist `rows` together with the new state.
    pub fn with_rows(mut self, rows: &'a [RawRow]) -> Self {
        self.rows = Some(rows);
        self
    }
}

/// One line of [`Storage::list_reports`].
#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub id: String,
    pub platform: String,
    pub doc_type: String,
    pub date_from: String,
    pub date_to: String,
    pub state: String,
    pub updated_at: String,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path).build().await.map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode (for status queries).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path).build().await.map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ReportError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ReportError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Report documents
    // -----------------------------------------------------------------------

    /// Insert a new job document in `init` state. Returns the generated id.
    pub async fn insert_report(&self, report: &NewReport) -> Result<JobId> {
        self.check_writable()?;
        let id = JobId::new();
        let now = Utc::now().to_rfc3339();
        let aux_files_json = serde_json::to_string(&report.aux_files)
            .map_err(|e| ReportError::Storage(format!("aux files encode: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO reports (id, platform, doc_type, date_from, date_to, state,
                                      rows_json, aux_files_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    report.platform.as_str(),
                    report.doc_type.as_str(),
                    report.period.date_from.to_string(),
                    report.period.date_to.to_string(),
                    JobState::Init.as_str(),
                    aux_files_json,
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;

        info!(job_id = %id, platform = %report.platform, doc_type = %report.doc_type, "report job created");
        Ok(id)
    }

    /// Load a job document by id.
    pub async fn find_report(&self, id: &JobId) -> Result<Option<ReportJob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, platform, doc_type, date_from, date_to, state,
                        rows_json, aux_files_json, created_at, updated_at
                 FROM reports WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_report(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Apply `transition` only if the job is still in `expected` state.
    ///
    /// Returns `false` when no document matched (stale expectation or unknown
    /// id); nothing is written in that case. A transition that does not move
    /// forward along the state order is rejected outright.
    pub async fn compare_and_set(
        &self,
        id: &JobId,
        expected: JobState,
        transition: &Transition<'_>,
    ) -> Result<bool> {
        self.check_writable()?;
        if transition.state <= expected {
            return Err(ReportError::validation(format!(
                "transition {expected} -> {} does not move forward",
                transition.state
            )));
        }

        let now = Utc::now().to_rfc3339();
        let affected = match transition.rows {
            Some(rows) => {
                let rows_json = serde_json::to_string(rows)
                    .map_err(|e| ReportError::Storage(format!("rows encode: {e}")))?;
                self.conn
                    .execute(
                        "UPDATE reports SET state = ?1, rows_json = ?2, updated_at = ?3
                         WHERE id = ?4 AND state = ?5",
                        params![
                            transition.state.as_str(),
                            rows_json,
                            now.as_str(),
                            id.to_string(),
                            expected.as_str(),
                        ],
                    )
                    .await
            }
            None => {
                self.conn
                    .execute(
                        "UPDATE reports SET state = ?1, updated_at = ?2
                         WHERE id = ?3 AND state = ?4",
                        params![
                            transition.state.as_str(),
                            now.as_str(),
                            id.to_string(),
                            expected.as_str(),
                        ],
                    )
                    .await
            }
        }
        .map_err(db_err)?;

        debug!(job_id = %id, %expected, new_state = %transition.state, affected, "compare-and-set");
        Ok(affected == 1)
    }

    /// List all jobs, newest first.
    pub async fn list_reports(&self) -> Result<Vec<ReportSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, platform, doc_type, date_from, date_to, state, updated_at
                 FROM reports ORDER BY rowid DESC",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(ReportSummary {
                id: row.get::<String>(0).map_err(db_err)?,
                platform: row.get::<String>(1).map_err(db_err)?,
                doc_type: row.get::<String>(2).map_err(db_err)?,
                date_from: row.get::<String>(3).map_err(db_err)?,
                date_to: row.get::<String>(4).map_err(db_err)?,
                state: row.get::<String>(5).map_err(db_err)?,
                updated_at: row.get::<String>(6).map_err(db_err)?,
            });
        }
        Ok(results)
    }
}

fn db_err(e: libsql::Error) -> ReportError {
    ReportError::Storage(e.to_string())
}

/// Convert a database row to a [`ReportJob`].
fn row_to_report(row: &libsql::Row) -> Result<ReportJob> {
    let id: String = row.get(0).map_err(db_err)?;
    let platform: String = row.get(1).map_err(db_err)?;
    let doc_type: String = row.get(2).map_err(db_err)?;
    let date_from: String = row.get(3).map_err(db_err)?;
    let date_to: String = row.get(4).map_err(db_err)?;
    let state: String = row.get(5).map_err(db_err)?;
    let rows_json: Option<String> = row.get::<String>(6).ok();
    let aux_files_json: String = row.get(7).map_err(db_err)?;

    let rows = rows_json
        .map(|json| {
            serde_json::from_str::<Vec<RawRow>>(&json)
                .map_err(|e| ReportError::Storage(format!("job {id}: corrupt rows: {e}")))
        })
        .transpose()?;
    let aux_files: BTreeMap<String, String> = serde_json::from_str(&aux_files_json)
        .map_err(|e| ReportError::Storage(format!("job {id}: corrupt aux files: {e}")))?;

    Ok(ReportJob {
        id: id.parse()?,
        platform: platform.parse()?,
        doc_type: doc_type.parse()?,
        period: ReportPeriod::new(
            parse_date(&date_from, "date_from")?,
            parse_date(&date_to, "date_to")?,
        )?,
        state: state.parse()?,
        rows,
        aux_files,
        created_at: parse_timestamp(row, 8)?,
        updated_at: parse_timestamp(row, 9)?,
    })
}

fn parse_timestamp(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    let s: String = row.get(idx).map_err(db_err)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ReportError::Storage(format!("invalid date: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sellerreport_shared::{DocType, Platform};
    use serde_json::json;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sr_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn new_report() -> NewReport {
        let mut aux_files = BTreeMap::new();
        aux_files.insert("costs".to_string(), "abc123".to_string());
        NewReport {
            platform: Platform::Test,
            doc_type: DocType::FinMonth,
            period: ReportPeriod::parse("2024-01-01", "2024-01-31").unwrap(),
            aux_files,
        }
    }

    fn sample_rows() -> Vec<RawRow> {
        (0..3)
            .map(|i| {
                json!({"id": i, "data": format!("test_#{i}")})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sr_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn insert_and_find_report() {
        let storage = test_storage().await;
        let id = storage.insert_report(&new_report()).await.expect("insert");

        let job = storage.find_report(&id).await.expect("find").expect("exists");
        assert_eq!(job.id, id);
        assert_eq!(job.state, JobState::Init);
        assert_eq!(job.platform, Platform::Test);
        assert_eq!(job.period.date_from.to_string(), "2024-01-01");
        assert_eq!(job.period.date_to.to_string(), "2024-01-31");
        assert_eq!(job.aux_file("costs"), Some("abc123"));
        assert!(job.rows.is_none());

        assert!(storage.find_report(&JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn compare_and_set_persists_rows_in_order() {
        let storage = test_storage().await;
        let id = storage.insert_report(&new_report()).await.unwrap();
        let rows = sample_rows();

        let applied = storage
            .compare_and_set(&id, JobState::Init, &Transition::to(JobState::Extracted).with_rows(&rows))
            .await
            .expect("cas");
        assert!(applied);

        let job = storage.find_report(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Extracted);
        assert_eq!(job.rows.as_deref(), Some(rows.as_slice()));
        let keys: Vec<&String> = job.rows.as_ref().unwrap()[0].keys().collect();
        assert_eq!(keys, ["id", "data"]);
    }

    #[tokio::test]
    async fn stale_compare_and_set_does_not_mutate() {
        let storage = test_storage().await;
        let id = storage.insert_report(&new_report()).await.unwrap();
        let rows = sample_rows();

        storage
            .compare_and_set(&id, JobState::Init, &Transition::to(JobState::Extracted).with_rows(&rows))
            .await
            .unwrap();

        // A duplicate worker still believes the job is in `init`.
        let other_rows = vec![json!({"id": 99}).as_object().cloned().unwrap()];
        let applied = storage
            .compare_and_set(
                &id,
                JobState::Init,
                &Transition::to(JobState::Transformed).with_rows(&other_rows),
            )
            .await
            .expect("cas");
        assert!(!applied);

        let job = storage.find_report(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Extracted);
        assert_eq!(job.rows.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn backward_transition_is_rejected() {
        let storage = test_storage().await;
        let id = storage.insert_report(&new_report()).await.unwrap();
        storage
            .compare_and_set(&id, JobState::Init, &Transition::to(JobState::Extracted))
            .await
            .unwrap();

        let result = storage
            .compare_and_set(&id, JobState::Extracted, &Transition::to(JobState::Init))
            .await;
        assert!(result.is_err());

        let job = storage.find_report(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Extracted);
    }

    #[tokio::test]
    async fn compare_and_set_on_unknown_id_reports_no_match() {
        let storage = test_storage().await;
        let applied = storage
            .compare_and_set(&JobId::new(), JobState::Init, &Transition::to(JobState::Extracted))
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn list_reports_newest_first() {
        let storage = test_storage().await;
        let first = storage.insert_report(&new_report()).await.unwrap();
        let second = storage.insert_report(&new_report()).await.unwrap();

        let reports = storage.list_reports().await.expect("list");
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].id, second.to_string());
        assert_eq!(reports[1].id, first.to_string());
        assert_eq!(reports[0].state, "init");
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("sr_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        let id = rw.insert_report(&new_report()).await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert!(ro.find_report(&id).await.unwrap().is_some());
        let result = ro.insert_report(&new_report()).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
