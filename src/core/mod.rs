//! Core module - custody domain types and storage

pub mod cache;
pub mod catalog;
pub mod config;
pub mod conflict;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod report;
pub mod session;
pub mod store;
pub mod workspace;

pub use cache::{Cached, CacheError, ReferenceCache, RefreshOutcome};
pub use catalog::{
    search, site_code, Catalog, CatalogError, CatalogTool, Employee, LocalCatalog, RestCatalog,
};
pub use config::Config;
pub use conflict::{ConflictDetector, ConflictError};
pub use identity::{IdentityError, ToolIdentity, BATTERY_CATEGORY};
pub use ledger::{CustodyLedger, LedgerError, LedgerSnapshot, OpenCustody};
pub use lifecycle::{Disposition, LifecycleError, ReportDraft, ReportLifecycle};
pub use report::{aging, Aging, CustodyRecord, CustodyState, Report, ReportState};
pub use session::{Role, SessionContext, SessionError};
pub use store::{PendingReport, RecordStore, ReportChange, SqliteStore, StoreError};
pub use workspace::{Workspace, WorkspaceError};
