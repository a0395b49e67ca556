//! Custody conflict detection
//!
//! A tool may sit in at most one IN_FIELD record per site. Candidates
//! are checked against the draft being assembled and against the
//! ledger mirror before they are admitted. When the ledger has never
//! synced there is no basis for the check and the candidate is
//! rejected rather than waved through.

use thiserror::Error;

use crate::core::identity::{ToolIdentity, BATTERY_CATEGORY};
use crate::core::ledger::LedgerSnapshot;
use crate::core::report::CustodyRecord;

/// Checks candidates for custody conflicts.
#[derive(Debug, Clone)]
pub struct ConflictDetector {
    /// Category codes whose patrimony numbers carry a letter prefix on
    /// some labels and not others (batteries, by default).
    battery_categories: Vec<String>,
}

impl Default for ConflictDetector {
    fn default() -> Self {
        Self {
            battery_categories: vec![BATTERY_CATEGORY.to_string()],
        }
    }
}

impl ConflictDetector {
    pub fn new(battery_categories: Vec<String>) -> Self {
        Self { battery_categories }
    }

    fn is_battery(&self, category_code: &str) -> bool {
        !category_code.is_empty()
            && self.battery_categories.iter().any(|c| c == category_code)
    }

    /// Admit or reject a candidate tool for the draft. `draft` holds
    /// the records already picked for the report being assembled.
    pub fn check(
        &self,
        identity: &ToolIdentity,
        category_code: &str,
        draft: &[CustodyRecord],
        ledger: &LedgerSnapshot,
    ) -> Result<(), ConflictError> {
        for record in draft {
            let battery = self.is_battery(category_code) || self.is_battery(&record.category_code);
            if identity.matches(&record.identity, battery) {
                return Err(ConflictError::DuplicateInDraft {
                    description: record.description.clone(),
                });
            }
        }

        let entries = match ledger {
            LedgerSnapshot::Unknown => return Err(ConflictError::LedgerUnavailable),
            LedgerSnapshot::Ready(entries) => entries,
        };

        for entry in entries {
            let battery = self.is_battery(category_code) || self.is_battery(&entry.category_code);
            if identity.matches(&entry.identity, battery) {
                return Err(ConflictError::InUseElsewhere {
                    report_number: entry.report_number,
                    employee: entry.employee.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Why a candidate was rejected
#[derive(Debug, Error, PartialEq)]
pub enum ConflictError {
    #[error("already on this report: {description}")]
    DuplicateInDraft { description: String },

    #[error("already in the field on report #{report_number} with {employee}")]
    InUseElsewhere { report_number: u32, employee: String },

    #[error("the custody ledger has not synced yet; cannot rule out a conflict")]
    LedgerUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::OpenCustody;
    use chrono::{TimeZone, Utc};

    fn entry(patrimony: &str, serial: &str, category: &str, number: u32) -> OpenCustody {
        OpenCustody {
            report_id: format!("r{number}"),
            report_number: number,
            employee: "JOAO COSTA".to_string(),
            identity: ToolIdentity::new(patrimony, serial).unwrap(),
            description: "DRILL".to_string(),
            category_code: category.to_string(),
            opened_at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        }
    }

    fn draft_record(patrimony: &str, serial: &str, category: &str) -> CustodyRecord {
        let mut record = CustodyRecord::new(
            ToolIdentity::new(patrimony, serial).unwrap(),
            "GRINDER",
            Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        );
        record.category_code = category.to_string();
        record
    }

    #[test]
    fn test_clear_candidate_is_admitted() {
        let detector = ConflictDetector::default();
        let identity = ToolIdentity::new("T100", "").unwrap();
        let ledger = LedgerSnapshot::Ready(vec![entry("T200", "", "100200300", 7)]);

        assert_eq!(detector.check(&identity, "100200300", &[], &ledger), Ok(()));
    }

    #[test]
    fn test_tool_in_field_elsewhere_is_blocked() {
        let detector = ConflictDetector::default();
        let identity = ToolIdentity::new("T100", "").unwrap();
        let ledger = LedgerSnapshot::Ready(vec![entry("T100", "", "100200300", 12)]);

        assert_eq!(
            detector.check(&identity, "100200300", &[], &ledger),
            Err(ConflictError::InUseElsewhere {
                report_number: 12,
                employee: "JOAO COSTA".to_string(),
            })
        );
    }

    #[test]
    fn test_serial_match_blocks_when_patrimony_differs() {
        let detector = ConflictDetector::default();
        // Relabelled tool: new patrimony plate, same serial.
        let identity = ToolIdentity::new("T999", "SN-44").unwrap();
        let ledger = LedgerSnapshot::Ready(vec![entry("T100", "SN-44", "100200300", 3)]);

        assert!(detector.check(&identity, "100200300", &[], &ledger).is_err());
    }

    #[test]
    fn test_battery_prefix_normalized_on_both_sides() {
        let detector = ConflictDetector::default();
        // The scanner reads the bare number; the ledger has the
        // B-prefixed label from an earlier entry.
        let identity = ToolIdentity::new("54321", "").unwrap();
        let ledger = LedgerSnapshot::Ready(vec![entry("B54321", "", BATTERY_CATEGORY, 5)]);

        assert_eq!(
            detector.check(&identity, BATTERY_CATEGORY, &[], &ledger),
            Err(ConflictError::InUseElsewhere {
                report_number: 5,
                employee: "JOAO COSTA".to_string(),
            })
        );
    }

    #[test]
    fn test_battery_normalization_needs_a_battery_category() {
        let detector = ConflictDetector::default();
        let identity = ToolIdentity::new("54321", "").unwrap();
        // Same digits, but neither side is a battery; B54321 is an
        // unrelated tool and must not block.
        let ledger = LedgerSnapshot::Ready(vec![entry("B54321", "", "100200300", 5)]);

        assert_eq!(detector.check(&identity, "100200300", &[], &ledger), Ok(()));
    }

    #[test]
    fn test_duplicate_in_draft_is_blocked_first() {
        let detector = ConflictDetector::default();
        let identity = ToolIdentity::new("T100", "").unwrap();
        let draft = vec![draft_record("T100", "", "100200300")];
        // Even with the same tool also in the ledger, the draft
        // duplicate is the error reported.
        let ledger = LedgerSnapshot::Ready(vec![entry("T100", "", "100200300", 2)]);

        assert_eq!(
            detector.check(&identity, "100200300", &draft, &ledger),
            Err(ConflictError::DuplicateInDraft {
                description: "GRINDER".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_ledger_fails_closed() {
        let detector = ConflictDetector::default();
        let identity = ToolIdentity::new("T100", "").unwrap();

        assert_eq!(
            detector.check(&identity, "100200300", &[], &LedgerSnapshot::Unknown),
            Err(ConflictError::LedgerUnavailable)
        );
    }

    #[test]
    fn test_custom_battery_categories_from_config() {
        let detector = ConflictDetector::new(vec!["777888999".to_string()]);
        let identity = ToolIdentity::new("54321", "").unwrap();
        let ledger = LedgerSnapshot::Ready(vec![entry("B54321", "", "777888999", 9)]);

        assert!(detector.check(&identity, "777888999", &[], &ledger).is_err());
    }
}
