//! Tool identity: the (patrimony, serial) natural key
//!
//! A physical tool is recognized by its asset tag (patrimony) and/or its
//! manufacturer serial. Consumables may carry only a serial; either field
//! may be empty, but never both. Matching is non-empty-field equality:
//! an empty patrimony never matches another empty patrimony.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category code the remote catalog uses for battery-style consumables.
/// Their patrimony may be entered with or without an alphabetic prefix
/// depending on entry method (scan vs manual).
pub const BATTERY_CATEGORY: &str = "531080001";

/// Natural key of a physical tool
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolIdentity {
    pub patrimony: String,
    pub serial: String,
}

impl ToolIdentity {
    /// Build an identity from raw operator input.
    ///
    /// Trims and uppercases both fields; rejects input where both end up
    /// empty, so empty-equality can never be mistaken for a match later.
    pub fn new(patrimony: &str, serial: &str) -> Result<Self, IdentityError> {
        let patrimony = patrimony.trim().to_uppercase();
        let serial = serial.trim().to_uppercase();

        if patrimony.is_empty() && serial.is_empty() {
            return Err(IdentityError::MissingIdentity);
        }

        Ok(Self { patrimony, serial })
    }

    /// Patrimony with the battery prefix stripped when the category calls
    /// for it ("B12345" and "12345" are the same physical unit).
    pub fn comparable_patrimony(&self, battery: bool) -> &str {
        if battery {
            strip_alpha_prefix(&self.patrimony)
        } else {
            &self.patrimony
        }
    }

    /// Non-empty-field equality, with battery normalization applied to
    /// BOTH sides. `battery` must reflect the candidate's category; the
    /// caller resolves it once so both operands get the same treatment.
    pub fn matches(&self, other: &ToolIdentity, battery: bool) -> bool {
        let pat_match = {
            let a = self.comparable_patrimony(battery);
            let b = other.comparable_patrimony(battery);
            !a.is_empty() && a == b
        };
        let ser_match = !self.serial.is_empty() && self.serial == other.serial;
        pat_match || ser_match
    }

    /// Exact equality on both raw fields (used to recognize the same
    /// draft entry, not to detect conflicts).
    pub fn same_entry(&self, other: &ToolIdentity) -> bool {
        self.patrimony == other.patrimony && self.serial == other.serial
    }
}

impl fmt::Display for ToolIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.patrimony.is_empty(), self.serial.is_empty()) {
            (false, false) => write!(f, "{}/{}", self.patrimony, self.serial),
            (false, true) => write!(f, "{}", self.patrimony),
            (true, false) => write!(f, "s:{}", self.serial),
            (true, true) => write!(f, "?"),
        }
    }
}

/// Strip a leading run of ASCII alphabetic characters ("B12345" -> "12345").
fn strip_alpha_prefix(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_ascii_alphabetic())
}

/// Normalize a scan/search term the way the warehouse labels are printed:
/// a bare 5-digit number is a battery tag missing its "B" prefix.
pub fn normalize_search_term(term: &str) -> String {
    let term = term.trim().to_uppercase();
    if term.len() == 5 && term.chars().all(|c| c.is_ascii_digit()) {
        format!("B{}", term)
    } else {
        term
    }
}

/// True when the (normalized) term has the battery tag shape B#####.
pub fn is_battery_term(term: &str) -> bool {
    let mut chars = term.chars();
    matches!(chars.next(), Some('B')) && term.len() == 6 && chars.all(|c| c.is_ascii_digit())
}

/// Errors from identity construction
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("a tool needs a patrimony tag or a serial number (both were empty)")]
    MissingIdentity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_and_uppercases() {
        let id = ToolIdentity::new("  a123 ", " sn9 ").unwrap();
        assert_eq!(id.patrimony, "A123");
        assert_eq!(id.serial, "SN9");
    }

    #[test]
    fn test_new_rejects_both_empty() {
        assert_eq!(
            ToolIdentity::new("  ", "").unwrap_err(),
            IdentityError::MissingIdentity
        );
    }

    #[test]
    fn test_patrimony_only_matches() {
        let a = ToolIdentity::new("A1", "").unwrap();
        let b = ToolIdentity::new("A1", "S2").unwrap();
        assert!(a.matches(&b, false));
        assert!(b.matches(&a, false));
    }

    #[test]
    fn test_empty_fields_never_match() {
        let a = ToolIdentity::new("A1", "").unwrap();
        let b = ToolIdentity::new("A2", "").unwrap();
        // Both serials empty: must not count as a serial match.
        assert!(!a.matches(&b, false));
    }

    #[test]
    fn test_serial_only_matches() {
        let a = ToolIdentity::new("", "S9").unwrap();
        let b = ToolIdentity::new("X1", "S9").unwrap();
        assert!(a.matches(&b, false));
    }

    #[test]
    fn test_battery_normalization_both_directions() {
        let tagged = ToolIdentity::new("B12345", "").unwrap();
        let bare = ToolIdentity::new("12345", "").unwrap();
        assert!(tagged.matches(&bare, true));
        assert!(bare.matches(&tagged, true));
        // Without the battery category the prefix is significant.
        assert!(!tagged.matches(&bare, false));
    }

    #[test]
    fn test_search_term_battery_shorthand() {
        assert_eq!(normalize_search_term("77777"), "B77777");
        assert_eq!(normalize_search_term(" b77777 "), "B77777");
        assert_eq!(normalize_search_term("123456"), "123456");
        assert_eq!(normalize_search_term("mak18v"), "MAK18V");
    }

    #[test]
    fn test_is_battery_term() {
        assert!(is_battery_term("B77777"));
        assert!(!is_battery_term("B7777"));
        assert!(!is_battery_term("77777"));
        assert!(!is_battery_term("BX7777"));
    }
}
