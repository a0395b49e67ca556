//! Session context: who is logged in and which site they work
//!
//! Site and role travel as an explicit value handed to every component
//! whose behavior is site-scoped, never as ambient process-wide state.
//! Lifetime is login to logout.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Roles known to the system. Authorization mechanics live elsewhere;
/// components only need to know which role acts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Field worker: opens reports, checks tools out and back in
    #[default]
    Field,
    /// Warehouse keeper: inventory views, report oversight
    Warehouse,
    /// Site administrator
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Field => write!(f, "field"),
            Role::Warehouse => write!(f, "warehouse"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "field" => Ok(Role::Field),
            "warehouse" => Ok(Role::Warehouse),
            "admin" => Ok(Role::Admin),
            other => Err(SessionError::UnknownRole(other.to_string())),
        }
    }
}

/// Explicit per-login context passed into cache, ledger and detector
/// constructors instead of a global singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Site identifier (the "obra"), scopes every query and cache key
    pub site: String,
    /// Login name of the operating user
    pub user: String,
    pub role: Role,
}

impl SessionContext {
    pub fn new(site: &str, user: &str, role: Role) -> Result<Self, SessionError> {
        let site = site.trim().to_string();
        if site.is_empty() {
            return Err(SessionError::MissingSite);
        }
        Ok(Self {
            site,
            user: user.trim().to_string(),
            role,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no site configured for this session. Set 'site' in .campo/config.yaml or CAMPO_SITE")]
    MissingSite,

    #[error("unknown role: '{0}' (valid: field, warehouse, admin)")]
    UnknownRole(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_requires_site() {
        let err = SessionContext::new("  ", "ana", Role::Field).unwrap_err();
        assert_eq!(err, SessionError::MissingSite);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("warehouse".parse::<Role>().unwrap(), Role::Warehouse);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!(matches!(
            "boss".parse::<Role>(),
            Err(SessionError::UnknownRole(_))
        ));
    }
}
