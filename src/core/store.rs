//! System-of-record seam
//!
//! Reports live in a shared document store that many clients write
//! concurrently. The one primitive the rest of the crate depends on is a
//! serializable commit: two concurrent commits for the same site must
//! never receive the same report number. `SqliteStore` provides that with
//! an IMMEDIATE transaction around the max-number read and the insert,
//! backed by a UNIQUE(site, report_number) index.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use thiserror::Error;
use ulid::Ulid;

use crate::core::report::{CustodyRecord, Report, ReportState};

const SCHEMA_VERSION: i32 = 2;

/// A report as submitted for commit, before the store assigns its
/// document id and sequential number.
#[derive(Debug, Clone)]
pub struct PendingReport {
    pub site: String,
    pub employee: String,
    pub membership_id: String,
    pub opened_at: DateTime<Utc>,
    pub opening_signature: String,
    pub custom_tools: Vec<CustodyRecord>,
}

/// One change from the store's feed
#[derive(Debug, Clone)]
pub enum ReportChange {
    Upserted(Report),
    /// Document id of a report that no longer exists
    Removed(String),
}

/// The document store holding all reports for all sites.
pub trait RecordStore {
    /// Atomically assign the next report number for the site and persist
    /// the report. Callers retry once on [`StoreError::CommitRace`].
    fn commit_report(&self, pending: PendingReport) -> Result<Report, StoreError>;

    /// Overwrite an existing report document (record closures etc.).
    fn update_report(&self, report: &Report) -> Result<(), StoreError>;

    fn reports_for_site(&self, site: &str) -> Result<Vec<Report>, StoreError>;

    /// Pull changes after `cursor`; returns the diffs plus the new
    /// cursor. A cursor of 0 means "from the beginning".
    fn changes_since(&self, site: &str, cursor: i64)
        -> Result<(Vec<ReportChange>, i64), StoreError>;
}

/// SQLite-backed record store (shared database file between clients)
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                site TEXT NOT NULL,
                report_number INTEGER NOT NULL,
                state TEXT NOT NULL,
                doc TEXT NOT NULL,
                seq INTEGER NOT NULL,
                UNIQUE(site, report_number)
            );
            CREATE INDEX IF NOT EXISTS idx_reports_site ON reports(site);
            CREATE INDEX IF NOT EXISTS idx_reports_seq ON reports(seq);
            "#,
        )?;

        let found: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        if found == 0 {
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        } else if found != SCHEMA_VERSION {
            // This is the system of record; never rebuild it silently.
            return Err(StoreError::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }

        Ok(())
    }

    fn next_seq(&self) -> Result<i64, rusqlite::Error> {
        self.conn
            .query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM reports", [], |row| {
                row.get(0)
            })
    }

    fn commit_inner(&self, pending: PendingReport) -> Result<Report, StoreError> {
        let next_number: u32 = self.conn.query_row(
            "SELECT COALESCE(MAX(report_number), 0) + 1 FROM reports WHERE site = ?1",
            params![pending.site],
            |row| row.get(0),
        )?;

        let report = Report {
            id: Ulid::new().to_string(),
            report_number: next_number,
            site: pending.site,
            employee: pending.employee,
            membership_id: pending.membership_id,
            state: ReportState::Open,
            opened_at: pending.opened_at,
            closed_at: None,
            opening_signature: pending.opening_signature,
            closing_signature: None,
            custom_tools: pending.custom_tools,
        };

        let doc = serde_json::to_string(&report)?;
        let seq = self.next_seq()?;
        self.conn
            .execute(
                r#"INSERT INTO reports (id, site, report_number, state, doc, seq)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    report.id,
                    report.site,
                    report.report_number,
                    report.state.to_string(),
                    doc,
                    seq
                ],
            )
            .map_err(race_or_error)?;

        Ok(report)
    }

    /// Body of `update_report`, run inside a write transaction so the
    /// seq read and the write cannot interleave with another client on
    /// the same database.
    fn update_inner(&self, report: &Report) -> Result<(), StoreError> {
        let doc = serde_json::to_string(report)?;
        let seq = self.next_seq()?;
        let updated = self.conn.execute(
            "UPDATE reports SET state = ?1, doc = ?2, seq = ?3 WHERE id = ?4",
            params![report.state.to_string(), doc, seq, report.id],
        )?;

        if updated == 0 {
            return Err(StoreError::ReportNotFound(report.id.clone()));
        }
        Ok(())
    }

    fn row_to_report(doc: String) -> Result<Report, StoreError> {
        Ok(serde_json::from_str(&doc)?)
    }
}

impl RecordStore for SqliteStore {
    fn commit_report(&self, pending: PendingReport) -> Result<Report, StoreError> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(race_or_error)?;

        let result = self.commit_inner(pending);
        match result {
            Ok(report) => {
                self.conn.execute_batch("COMMIT").map_err(race_or_error)?;
                Ok(report)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn update_report(&self, report: &Report) -> Result<(), StoreError> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(race_or_error)?;

        match self.update_inner(report) {
            Ok(()) => {
                self.conn.execute_batch("COMMIT").map_err(race_or_error)?;
                Ok(())
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn reports_for_site(&self, site: &str) -> Result<Vec<Report>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT doc FROM reports WHERE site = ?1 ORDER BY report_number")?;
        let rows = stmt.query_map(params![site], |row| row.get::<_, String>(0))?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(Self::row_to_report(row?)?);
        }
        Ok(reports)
    }

    fn changes_since(
        &self,
        site: &str,
        cursor: i64,
    ) -> Result<(Vec<ReportChange>, i64), StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT doc, seq FROM reports WHERE site = ?1 AND seq > ?2 ORDER BY seq")?;
        let rows = stmt.query_map(params![site, cursor], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut changes = Vec::new();
        let mut new_cursor = cursor;
        for row in rows {
            let (doc, seq) = row?;
            changes.push(ReportChange::Upserted(Self::row_to_report(doc)?));
            new_cursor = new_cursor.max(seq);
        }
        Ok((changes, new_cursor))
    }
}

/// Busy and unique-constraint failures both mean another client got
/// there first with the same number.
fn race_or_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy
                || e.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::CommitRace
        }
        _ => StoreError::Sqlite(err),
    }
}

/// Errors from the record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a concurrent commit took this report number; retry with a fresh read")]
    CommitRace,

    #[error("report not found in store: {0}")]
    ReportNotFound(String),

    #[error("record store schema is version {found}, expected {expected}; migrate the database")]
    SchemaMismatch { found: i32, expected: i32 },

    #[error("record store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt report document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("record store I/O error: {0}")]
    Io(String),
}
