//! Error types for SellerReport.
//!
//! Library crates use [`ReportError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all report-generation operations.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to an upstream source.
    #[error("network error: {0}")]
    Network(String),

    /// Upstream answered with a non-success HTTP status.
    #[error("upstream error: {url} answered HTTP {status}")]
    Upstream { url: String, status: u16 },

    /// Expected field missing or malformed in fetched content.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A compare-and-set transition found the job in a different state.
    #[error("state conflict on job {job_id}: expected state `{expected}`")]
    Conflict { job_id: String, expected: String },

    /// Request or input validation error (rejected before anything is persisted).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// No job with the given id exists.
    #[error("report job {job_id} not found")]
    NotFound { job_id: String },

    /// Document store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Spreadsheet serialization or parsing error.
    #[error("workbook error: {0}")]
    Workbook(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReportError>;

impl ReportError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error for a job id.
    pub fn not_found(job_id: impl ToString) -> Self {
        Self::NotFound {
            job_id: job_id.to_string(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a compare-and-set conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ReportError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ReportError::Upstream {
            url: "https://stats.example.com/report".into(),
            status: 429,
        };
        assert!(err.to_string().contains("HTTP 429"));
    }

    #[test]
    fn conflict_is_detectable() {
        let err = ReportError::Conflict {
            job_id: "abc".into(),
            expected: "init".into(),
        };
        assert!(err.is_conflict());
        assert!(err.to_string().contains("`init`"));
        assert!(!ReportError::not_found("abc").is_conflict());
    }
}
