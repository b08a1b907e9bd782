//! Core domain types for report jobs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReportError, Result};

/// A normalized source row: string keys to scalar or nested JSON values.
///
/// Key order is preserved, so the first columns of a generated sheet follow
/// the order in which a collector emitted the fields.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

/// Fields an enricher wants merged into one row.
pub type RowUpdate = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for report job identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| ReportError::validation(format!("invalid job id '{s}': {e}")))
    }
}

// ---------------------------------------------------------------------------
// Platform / DocType
// ---------------------------------------------------------------------------

/// Marketplace the report data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Synthetic platform producing deterministic rows without network access.
    Test,
    /// Wildberries supplier statistics API.
    Wb,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Wb => "wb",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "test" => Ok(Self::Test),
            "wb" => Ok(Self::Wb),
            other => Err(ReportError::validation(format!("unknown platform '{other}'"))),
        }
    }
}

/// Kind of report requested from a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    /// Monthly financial realization report.
    FinMonth,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinMonth => "fin_month",
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "fin_month" => Ok(Self::FinMonth),
            other => Err(ReportError::validation(format!("unknown doc type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Persisted job state. Each state names the stage that has just finished.
///
/// The declaration order is the only legal order of transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Init,
    Extracted,
    Transformed,
    Loaded,
    Complete,
}

impl JobState {
    /// All states in transition order.
    pub const ALL: [JobState; 5] = [
        Self::Init,
        Self::Extracted,
        Self::Transformed,
        Self::Loaded,
        Self::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Extracted => "extracted",
            Self::Transformed => "transformed",
            Self::Loaded => "loaded",
            Self::Complete => "complete",
        }
    }

    /// The stage to execute from this state, or `None` once terminal.
    pub fn next_stage(self) -> Option<Stage> {
        match self {
            Self::Init => Some(Stage::Extract),
            Self::Extracted => Some(Stage::Transform),
            Self::Transformed => Some(Stage::Load),
            Self::Loaded => Some(Stage::Finalize),
            Self::Complete => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next_stage().is_none()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| ReportError::parse(format!("unknown job state '{s}'")))
    }
}

/// One step of the pipeline, bound to a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Collect raw rows from the source.
    Extract,
    /// Merge per-row enrichment fields.
    Transform,
    /// Build views, write the workbook, upload it.
    Load,
    /// Mark the job complete.
    Finalize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Transform => "transform",
            Self::Load => "load",
            Self::Finalize => "finalize",
        }
    }

    /// The state persisted once this stage succeeds.
    pub fn state_after(self) -> JobState {
        match self {
            Self::Extract => JobState::Extracted,
            Self::Transform => JobState::Transformed,
            Self::Load => JobState::Loaded,
            Self::Finalize => JobState::Complete,
        }
    }
}

// ---------------------------------------------------------------------------
// ReportPeriod
// ---------------------------------------------------------------------------

/// Inclusive date range a report covers. Time of day is not significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

impl ReportPeriod {
    /// Build a period, rejecting reversed ranges.
    pub fn new(date_from: NaiveDate, date_to: NaiveDate) -> Result<Self> {
        if date_from > date_to {
            return Err(ReportError::validation(format!(
                "date_from {date_from} is after date_to {date_to}"
            )));
        }
        Ok(Self { date_from, date_to })
    }

    /// Parse both bounds from `YYYY-MM-DD`. A trailing time part is accepted and dropped.
    pub fn parse(date_from: &str, date_to: &str) -> Result<Self> {
        Self::new(parse_date(date_from, "date_from")?, parse_date(date_to, "date_to")?)
    }

    /// Both bounds as ISO datetimes at midnight, the format upstream APIs expect.
    pub fn as_datetimes(&self) -> (String, String) {
        let fmt = |d: NaiveDate| format!("{}T00:00:00", d.format("%Y-%m-%d"));
        (fmt(self.date_from), fmt(self.date_to))
    }
}

/// Parse a date-only value; `2024-01-31T12:00:00` is read as `2024-01-31`.
pub fn parse_date(raw: &str, field: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ReportError::validation(format!("{field} is required")));
    }
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| ReportError::validation(format!("{field} '{raw}' is not a date: {e}")))
}

// ---------------------------------------------------------------------------
// ReportJob
// ---------------------------------------------------------------------------

/// Fields needed to create a job document.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub platform: Platform,
    pub doc_type: DocType,
    pub period: ReportPeriod,
    /// Logical name to blob key in the `files` bucket.
    pub aux_files: BTreeMap<String, String>,
}

/// A report job document as persisted in the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportJob {
    pub id: JobId,
    pub platform: Platform,
    pub doc_type: DocType,
    pub period: ReportPeriod,
    pub state: JobState,
    /// Rows written by the extract stage; `None` before that.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<RawRow>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aux_files: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReportJob {
    /// Blob key of an auxiliary input by logical name.
    pub fn aux_file(&self, name: &str) -> Option<&str> {
        self.aux_files.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::new();
        let parsed: JobId = id.to_string().parse().expect("parse JobId");
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn states_follow_fixed_table() {
        let mut state = JobState::Init;
        let mut visited = vec![state];
        while let Some(stage) = state.next_stage() {
            let next = stage.state_after();
            assert!(next > state, "{stage:?} must move forward from {state:?}");
            state = next;
            visited.push(state);
        }
        assert_eq!(visited, JobState::ALL.to_vec());
        assert!(JobState::Complete.is_terminal());
    }

    #[test]
    fn state_string_roundtrip() {
        for state in JobState::ALL {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("process".parse::<JobState>().is_err());
    }

    #[test]
    fn platform_and_doc_type_parse() {
        assert_eq!("wb".parse::<Platform>().unwrap(), Platform::Wb);
        assert_eq!("fin_month".parse::<DocType>().unwrap(), DocType::FinMonth);
        assert!("ozon".parse::<Platform>().is_err());
    }

    #[test]
    fn period_parsing_drops_time_of_day() {
        let period = ReportPeriod::parse("2024-01-01T15:30:00", "2024-01-31").unwrap();
        assert_eq!(period.date_from.to_string(), "2024-01-01");
        let (from, to) = period.as_datetimes();
        assert_eq!(from, "2024-01-01T00:00:00");
        assert_eq!(to, "2024-01-31T00:00:00");
    }

    #[test]
    fn period_rejects_reversed_and_missing() {
        assert!(ReportPeriod::parse("2024-02-01", "2024-01-01").is_err());
        let err = ReportPeriod::parse("", "2024-01-01").unwrap_err();
        assert!(err.to_string().contains("date_from is required"));
    }

    #[test]
    fn job_serialization_skips_empty_rows() {
        let job = ReportJob {
            id: JobId::new(),
            platform: Platform::Test,
            doc_type: DocType::FinMonth,
            period: ReportPeriod::parse("2024-01-01", "2024-01-31").unwrap(),
            state: JobState::Init,
            rows: None,
            aux_files: BTreeMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&job).expect("serialize");
        assert!(!json.contains("\"rows\""));
        assert!(json.contains("\"state\":\"init\""));
        let parsed: ReportJob = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.platform, Platform::Test);
    }
}
