//! Custody ledger
//!
//! A local SQLite mirror of every IN_FIELD record across all reports of
//! a site, fed by the record store's change feed. Conflict detection
//! reads the mirror, not the store, so the distinction between "synced
//! and empty" and "never synced" matters: the first is a usable answer,
//! the second is not. A per-site sync marker keeps that distinction
//! across restarts.

use std::fs;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::core::identity::ToolIdentity;
use crate::core::store::{RecordStore, ReportChange, StoreError};

const SCHEMA_VERSION: i32 = 2;

/// One tool currently out in the field, with enough context to tell a
/// blocked user where to look.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenCustody {
    pub report_id: String,
    pub report_number: u32,
    pub employee: String,
    pub identity: ToolIdentity,
    pub description: String,
    pub category_code: String,
    pub opened_at: DateTime<Utc>,
}

/// What the ledger knows about a site.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerSnapshot {
    /// The mirror has never completed a sync for this site. Not the
    /// same as an empty ledger; conflict checks must fail closed.
    Unknown,
    Ready(Vec<OpenCustody>),
}

/// SQLite mirror of open custody per site
pub struct CustodyLedger {
    conn: Connection,
}

impl CustodyLedger {
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LedgerError::Io(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let ledger = Self { conn };
        ledger.init_schema()?;
        Ok(ledger)
    }

    fn init_schema(&self) -> Result<(), LedgerError> {
        let found: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        if found != 0 && found != SCHEMA_VERSION {
            // Mirror data is derived; a dropped marker just forces a
            // resync before the next conflict check.
            self.conn.execute_batch(
                r#"DROP TABLE IF EXISTS open_custody;
                   DROP TABLE IF EXISTS ledger_sync;
                   DROP TABLE IF EXISTS schema_version;"#,
            )?;
        }

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS open_custody (
                report_id TEXT NOT NULL,
                report_number INTEGER NOT NULL,
                site TEXT NOT NULL,
                employee TEXT NOT NULL,
                patrimony TEXT NOT NULL,
                serial TEXT NOT NULL,
                description TEXT NOT NULL,
                category_code TEXT NOT NULL,
                opened_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_open_custody_site ON open_custody(site);
            CREATE INDEX IF NOT EXISTS idx_open_custody_report ON open_custody(report_id);

            CREATE TABLE IF NOT EXISTS ledger_sync (
                site TEXT PRIMARY KEY,
                cursor INTEGER NOT NULL,
                synced_at INTEGER NOT NULL
            );
            "#,
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Pull the store's change feed and fold it into the mirror. The
    /// sync marker only advances after every diff applied cleanly, so a
    /// failed sync leaves the previous state intact.
    pub fn sync(&self, site: &str, store: &dyn RecordStore) -> Result<usize, LedgerError> {
        let cursor = self.cursor(site)?;
        let (changes, new_cursor) = store.changes_since(site, cursor)?;

        self.conn.execute_batch("BEGIN")?;
        let applied = self.apply_changes(site, &changes, new_cursor);
        match applied {
            Ok(count) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(count)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn apply_changes(
        &self,
        site: &str,
        changes: &[ReportChange],
        new_cursor: i64,
    ) -> Result<usize, LedgerError> {
        for change in changes {
            match change {
                ReportChange::Upserted(report) => {
                    self.conn.execute(
                        "DELETE FROM open_custody WHERE report_id = ?1",
                        params![report.id],
                    )?;
                    for record in report.open_records() {
                        self.conn.execute(
                            r#"INSERT INTO open_custody
                               (report_id, report_number, site, employee,
                                patrimony, serial, description, category_code, opened_at)
                               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
                            params![
                                report.id,
                                report.report_number,
                                report.site,
                                report.employee,
                                record.identity.patrimony,
                                record.identity.serial,
                                record.description,
                                record.category_code,
                                record.opened_at.timestamp()
                            ],
                        )?;
                    }
                }
                ReportChange::Removed(id) => {
                    self.conn.execute(
                        "DELETE FROM open_custody WHERE report_id = ?1",
                        params![id],
                    )?;
                }
            }
        }

        self.conn.execute(
            r#"INSERT INTO ledger_sync (site, cursor, synced_at) VALUES (?1, ?2, ?3)
               ON CONFLICT(site) DO UPDATE SET
                   cursor = excluded.cursor,
                   synced_at = excluded.synced_at"#,
            params![site, new_cursor, Utc::now().timestamp()],
        )?;
        Ok(changes.len())
    }

    /// Current mirror state for a site. `Unknown` until the first
    /// successful [`sync`](Self::sync).
    pub fn snapshot(&self, site: &str) -> Result<LedgerSnapshot, LedgerError> {
        let marker: Option<i64> = self
            .conn
            .query_row(
                "SELECT cursor FROM ledger_sync WHERE site = ?1",
                params![site],
                |row| row.get(0),
            )
            .optional()?;

        if marker.is_none() {
            return Ok(LedgerSnapshot::Unknown);
        }

        let mut stmt = self.conn.prepare(
            r#"SELECT report_id, report_number, employee, patrimony, serial,
                      description, category_code, opened_at
               FROM open_custody WHERE site = ?1
               ORDER BY report_number, patrimony, serial"#,
        )?;
        let rows = stmt.query_map(params![site], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, i64>(7)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (report_id, report_number, employee, patrimony, serial, description, category_code, opened_epoch) =
                row?;
            let identity = ToolIdentity::new(&patrimony, &serial)
                .map_err(|_| LedgerError::CorruptRow { report_id: report_id.clone() })?;
            let opened_at = Utc
                .timestamp_opt(opened_epoch, 0)
                .single()
                .ok_or(LedgerError::CorruptRow { report_id: report_id.clone() })?;
            entries.push(OpenCustody {
                report_id,
                report_number,
                employee,
                identity,
                description,
                category_code,
                opened_at,
            });
        }
        Ok(LedgerSnapshot::Ready(entries))
    }

    /// When the site's mirror last completed a sync, if ever.
    pub fn last_synced(&self, site: &str) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let epoch: Option<i64> = self
            .conn
            .query_row(
                "SELECT synced_at FROM ledger_sync WHERE site = ?1",
                params![site],
                |row| row.get(0),
            )
            .optional()?;
        match epoch {
            None => Ok(None),
            Some(e) => Ok(Utc.timestamp_opt(e, 0).single()),
        }
    }

    fn cursor(&self, site: &str) -> Result<i64, LedgerError> {
        let cursor: Option<i64> = self
            .conn
            .query_row(
                "SELECT cursor FROM ledger_sync WHERE site = ?1",
                params![site],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cursor.unwrap_or(0))
    }
}

/// Errors from the custody ledger
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("corrupt ledger row for report {report_id}")]
    CorruptRow { report_id: String },

    #[error("ledger I/O error: {0}")]
    Io(String),
}
