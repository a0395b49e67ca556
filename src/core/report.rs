//! Report and custody record data model
//!
//! A report is the check-out ticket: one employee, one opening signature,
//! one or more custody records. The document shape mirrors what the
//! system of record stores (camelCase fields, SCREAMING state strings),
//! so these structs are the single schema for both wire and memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::ToolIdentity;

/// Custody state of one tool inside a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustodyState {
    #[default]
    InField,
    Returned,
    Lost,
}

impl CustodyState {
    /// Returned and Lost are both terminal.
    pub fn is_closed(&self) -> bool {
        !matches!(self, CustodyState::InField)
    }
}

impl std::fmt::Display for CustodyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CustodyState::InField => write!(f, "IN_FIELD"),
            CustodyState::Returned => write!(f, "RETURNED"),
            CustodyState::Lost => write!(f, "LOST"),
        }
    }
}

/// Report state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportState {
    #[default]
    Open,
    Closed,
}

impl std::fmt::Display for ReportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportState::Open => write!(f, "OPEN"),
            ReportState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// One tool embedded in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodyRecord {
    #[serde(flatten)]
    pub identity: ToolIdentity,
    pub description: String,
    /// Catalog category code; drives battery-prefix normalization
    #[serde(default)]
    pub category_code: String,
    /// Advisory: the site code the remote catalog had on file
    #[serde(default)]
    pub catalog_site_code: String,
    /// Advisory: the catalog's own status string for this tool
    #[serde(default)]
    pub catalog_status: String,
    pub state: CustodyState,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: String,
    /// Opaque object-store URIs; contents are never interpreted here
    #[serde(default)]
    pub photo_refs: Vec<String>,
}

impl CustodyRecord {
    pub fn new(identity: ToolIdentity, description: &str, opened_at: DateTime<Utc>) -> Self {
        Self {
            identity,
            description: description.trim().to_uppercase(),
            category_code: String::new(),
            catalog_site_code: String::new(),
            catalog_status: String::new(),
            state: CustodyState::InField,
            opened_at,
            closed_at: None,
            note: String::new(),
            photo_refs: Vec::new(),
        }
    }
}

/// The check-out ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Document id assigned by the system of record
    pub id: String,
    /// Human-facing sequential number, monotonic per site
    pub report_number: u32,
    pub site: String,
    pub employee: String,
    /// Employee membership id resolved from the employee catalog
    #[serde(default)]
    pub membership_id: String,
    pub state: ReportState,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Opaque image ref; required at commit
    pub opening_signature: String,
    /// Opaque image ref; required before the last record may close
    pub closing_signature: Option<String>,
    pub custom_tools: Vec<CustodyRecord>,
}

impl Report {
    /// Records still in the field.
    pub fn open_records(&self) -> impl Iterator<Item = &CustodyRecord> {
        self.custom_tools.iter().filter(|r| !r.state.is_closed())
    }

    pub fn all_records_closed(&self) -> bool {
        self.custom_tools.iter().all(|r| r.state.is_closed())
    }

    /// The closure invariant: CLOSED iff every record is closed, a
    /// closing signature is present and closed_at is set.
    pub fn closure_invariant_holds(&self) -> bool {
        match self.state {
            ReportState::Closed => {
                self.all_records_closed()
                    && self.closing_signature.is_some()
                    && self.closed_at.is_some()
            }
            ReportState::Open => true,
        }
    }
}

/// Aging bucket of an open report, from days since opening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aging {
    OnTime,
    Late,
    Critical,
}

impl std::fmt::Display for Aging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Aging::OnTime => write!(f, "on time"),
            Aging::Late => write!(f, "late"),
            Aging::Critical => write!(f, "critical"),
        }
    }
}

/// Classify a report by age: late after a week in the field, critical
/// after two. Clock skew is clamped to zero days.
pub fn aging(opened_at: DateTime<Utc>, now: DateTime<Utc>) -> (i64, Aging) {
    let days = (now - opened_at).num_days().max(0);
    let bucket = if days >= 14 {
        Aging::Critical
    } else if days >= 7 {
        Aging::Late
    } else {
        Aging::OnTime
    };
    (days, bucket)
}
