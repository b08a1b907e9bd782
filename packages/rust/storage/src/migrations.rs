//! SQL migration definitions for the SellerReport job database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: reports",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Report job documents. `state` is only ever changed by a conditional
-- UPDATE ... WHERE state = <expected>.
CREATE TABLE IF NOT EXISTS reports (
    id             TEXT PRIMARY KEY,
    platform       TEXT NOT NULL,
    doc_type       TEXT NOT NULL,
    date_from      TEXT NOT NULL,
    date_to        TEXT NOT NULL,
    state          TEXT NOT NULL,
    rows_json      TEXT,
    aux_files_json TEXT NOT NULL DEFAULT '{}',
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_state ON reports(state);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
