//! Report lifecycle
//!
//! A draft is assembled tool by tool with conflict checks at entry,
//! then committed through the record store, which assigns the report
//! number. The commit is retried once on contention; the retry re-reads
//! the number inside the store, so losing a race costs one extra round
//! trip and nothing else. Closure walks the records one at a time and
//! the report itself closes with the last record, never separately.

use chrono::Utc;
use thiserror::Error;

use crate::core::catalog::{CatalogTool, Employee};
use crate::core::conflict::{ConflictDetector, ConflictError};
use crate::core::identity::{IdentityError, ToolIdentity};
use crate::core::ledger::LedgerSnapshot;
use crate::core::report::{CustodyRecord, CustodyState, Report, ReportState};
use crate::core::store::{PendingReport, RecordStore, StoreError};

/// How a custody record leaves the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Returned,
    Lost,
}

impl Disposition {
    fn state(self) -> CustodyState {
        match self {
            Disposition::Returned => CustodyState::Returned,
            Disposition::Lost => CustodyState::Lost,
        }
    }
}

/// A report being assembled, before it has a number.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    site: String,
    employee: Option<Employee>,
    records: Vec<CustodyRecord>,
}

impl ReportDraft {
    pub fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
            employee: None,
            records: Vec::new(),
        }
    }

    pub fn set_employee(&mut self, employee: Employee) {
        self.employee = Some(employee);
    }

    pub fn employee(&self) -> Option<&Employee> {
        self.employee.as_ref()
    }

    pub fn records(&self) -> &[CustodyRecord] {
        &self.records
    }

    /// Add a catalog tool, carrying the catalog's description, category
    /// and advisory fields onto the record.
    pub fn add_tool(
        &mut self,
        tool: &CatalogTool,
        detector: &ConflictDetector,
        ledger: &LedgerSnapshot,
    ) -> Result<(), LifecycleError> {
        let identity = tool.identity()?;
        detector.check(&identity, &tool.category_code, &self.records, ledger)?;

        let mut record = CustodyRecord::new(identity, &tool.description, Utc::now());
        record.category_code = tool.category_code.clone();
        record.catalog_site_code = tool.site_code.clone();
        record.catalog_status = tool.catalog_status.clone();
        self.records.push(record);
        Ok(())
    }

    /// Add a tool the catalog does not know, typed in by hand. Conflict
    /// checks still apply; no category means no battery normalization.
    pub fn add_manual(
        &mut self,
        patrimony: &str,
        serial: &str,
        description: &str,
        detector: &ConflictDetector,
        ledger: &LedgerSnapshot,
    ) -> Result<(), LifecycleError> {
        let identity = ToolIdentity::new(patrimony, serial)?;
        detector.check(&identity, "", &self.records, ledger)?;
        self.records
            .push(CustodyRecord::new(identity, description, Utc::now()));
        Ok(())
    }

    /// Drop an entry from the draft (exact identity, not fuzzy match).
    pub fn remove(&mut self, identity: &ToolIdentity) -> Result<(), LifecycleError> {
        let before = self.records.len();
        self.records.retain(|r| !r.identity.same_entry(identity));
        if self.records.len() == before {
            return Err(LifecycleError::RecordNotFound {
                identity: identity.to_string(),
            });
        }
        Ok(())
    }
}

/// Commits drafts and closes records through the record store.
pub struct ReportLifecycle<'a> {
    store: &'a dyn RecordStore,
}

impl<'a> ReportLifecycle<'a> {
    pub fn new(store: &'a dyn RecordStore) -> Self {
        Self { store }
    }

    /// Commit a draft. The store assigns the number; a lost race is
    /// retried once with a fresh number read before giving up.
    pub fn commit(
        &self,
        draft: ReportDraft,
        opening_signature: &str,
    ) -> Result<Report, LifecycleError> {
        let employee = draft.employee.ok_or(LifecycleError::EmployeeMissing)?;
        if draft.records.is_empty() {
            return Err(LifecycleError::EmptyDraft);
        }
        if opening_signature.trim().is_empty() {
            return Err(LifecycleError::MissingOpeningSignature);
        }

        let pending = PendingReport {
            site: draft.site,
            employee: employee.name,
            membership_id: employee.membership_id,
            opened_at: Utc::now(),
            opening_signature: opening_signature.to_string(),
            custom_tools: draft.records,
        };

        match self.store.commit_report(pending.clone()) {
            Ok(report) => Ok(report),
            Err(StoreError::CommitRace) => match self.store.commit_report(pending) {
                Ok(report) => Ok(report),
                Err(StoreError::CommitRace) => Err(LifecycleError::Contention),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Close one record. Returns true when this closure also closed the
    /// report. Closing the last open record requires the closing
    /// signature; validation runs up front and the store write lands
    /// before the in-memory report changes, so any rejected or failed
    /// closure leaves the report untouched.
    pub fn close_record(
        &self,
        report: &mut Report,
        identity: &ToolIdentity,
        disposition: Disposition,
        note: &str,
        photos: &[String],
        closing_signature: Option<&str>,
    ) -> Result<bool, LifecycleError> {
        if report.state == ReportState::Closed {
            return Err(LifecycleError::ReportAlreadyClosed {
                report_number: report.report_number,
            });
        }

        let index = report
            .custom_tools
            .iter()
            .position(|r| r.identity.same_entry(identity))
            .ok_or_else(|| LifecycleError::RecordNotFound {
                identity: identity.to_string(),
            })?;

        if report.custom_tools[index].state.is_closed() {
            return Err(LifecycleError::RecordAlreadyClosed {
                identity: identity.to_string(),
            });
        }

        if disposition == Disposition::Lost && note.trim().is_empty() {
            return Err(LifecycleError::NoteRequired);
        }

        let open_count = report.open_records().count();
        let closes_report = open_count == 1;
        let signature = closing_signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| report.closing_signature.clone());
        if closes_report && signature.is_none() {
            return Err(LifecycleError::MissingClosingSignature);
        }

        // Work on a copy so a failed store write leaves the caller's
        // report exactly as it was.
        let now = Utc::now();
        let mut updated = report.clone();
        {
            let record = &mut updated.custom_tools[index];
            record.state = disposition.state();
            record.closed_at = Some(now);
            if !note.trim().is_empty() {
                record.note = note.trim().to_string();
            }
            record.photo_refs.extend(photos.iter().cloned());
        }
        if let Some(signature) = signature {
            updated.closing_signature = Some(signature);
        }
        if closes_report {
            updated.state = ReportState::Closed;
            updated.closed_at = Some(now);
        }

        self.store.update_report(&updated)?;
        *report = updated;
        Ok(closes_report)
    }
}

/// Errors from assembling, committing and closing reports
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no employee selected for this report")]
    EmployeeMissing,

    #[error("a report needs at least one tool")]
    EmptyDraft,

    #[error("an opening signature is required to commit")]
    MissingOpeningSignature,

    #[error("closing the last record requires the closing signature")]
    MissingClosingSignature,

    #[error("marking a tool as lost requires a note")]
    NoteRequired,

    #[error("no such record: {identity}")]
    RecordNotFound { identity: String },

    #[error("record already closed: {identity}")]
    RecordAlreadyClosed { identity: String },

    #[error("report #{report_number} is already closed")]
    ReportAlreadyClosed { report_number: u32 },

    #[error("could not get a report number after a retry; try again in a moment")]
    Contention,

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
