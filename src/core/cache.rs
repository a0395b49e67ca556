//! Reference-data cache
//!
//! Tool and employee catalogs change slowly and the catalog endpoint is
//! slow and flaky from the field, so both lists are cached locally in
//! SQLite per site. Entries carry a fetch timestamp for TTL staleness
//! and a content fingerprint so an unchanged refresh only renews the
//! TTL. The read-through loaders serve fresh entries untouched, refresh
//! stale or missing ones, and keep serving the stale copy when the
//! catalog is down. A failed refresh never evicts what is already
//! cached.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::catalog::{site_code, Catalog, CatalogError, CatalogTool, Employee};

const SCHEMA_VERSION: i32 = 3;

/// A cached payload together with its freshness.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub payload: T,
    pub fetched_at: DateTime<Utc>,
    /// Past its TTL. Still usable; refresh when convenient.
    pub stale: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New content replaced the cached payload.
    Updated,
    /// Remote content was identical; only the TTL was renewed.
    Unchanged,
}

/// Site-scoped cache over the remote catalog
pub struct ReferenceCache {
    conn: Connection,
    tools_ttl: Duration,
    employees_ttl: Duration,
}

impl ReferenceCache {
    pub fn open(
        path: &Path,
        tools_ttl: Duration,
        employees_ttl: Duration,
    ) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::Io(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let cache = Self {
            conn,
            tools_ttl,
            employees_ttl,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        let found: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        if found != 0 && found != SCHEMA_VERSION {
            // Cache contents are derived data; rebuild on any mismatch.
            self.conn.execute_batch(
                "DROP TABLE IF EXISTS cache_entries; DROP TABLE IF EXISTS schema_version;",
            )?;
        }

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                fetched_at INTEGER NOT NULL
            );
            "#,
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Cached tool list for a site, if any. Stale entries are returned
    /// with the flag set rather than withheld.
    pub fn tools(&self, site: &str) -> Result<Option<Cached<Vec<CatalogTool>>>, CacheError> {
        self.load(&tools_key(site), self.tools_ttl)
    }

    pub fn employees(&self, site: &str) -> Result<Option<Cached<Vec<Employee>>>, CacheError> {
        self.load(&employees_key(site), self.employees_ttl)
    }

    /// Read-through load of the tool list. A fresh entry is served as
    /// is; a stale or missing entry pulls from the catalog first. When
    /// the catalog is unreachable a stale copy is still served, and only
    /// a miss with no reachable catalog is an error.
    pub fn tools_through(
        &self,
        site: &str,
        catalog: &dyn Catalog,
    ) -> Result<Cached<Vec<CatalogTool>>, CacheError> {
        if let Some(entry) = self.tools(site)? {
            if !entry.stale {
                return Ok(entry);
            }
            if let Err(e) = self.refresh_tools(site, catalog) {
                return match e {
                    CacheError::Catalog(_) => Ok(entry),
                    other => Err(other),
                };
            }
        } else {
            self.refresh_tools(site, catalog)?;
        }
        self.tools(site)?
            .ok_or_else(|| CacheError::Io("cache entry missing after refresh".to_string()))
    }

    /// Read-through load of the employee list, same semantics as
    /// [`tools_through`](Self::tools_through).
    pub fn employees_through(
        &self,
        site: &str,
        catalog: &dyn Catalog,
    ) -> Result<Cached<Vec<Employee>>, CacheError> {
        if let Some(entry) = self.employees(site)? {
            if !entry.stale {
                return Ok(entry);
            }
            if let Err(e) = self.refresh_employees(site, catalog) {
                return match e {
                    CacheError::Catalog(_) => Ok(entry),
                    other => Err(other),
                };
            }
        } else {
            self.refresh_employees(site, catalog)?;
        }
        self.employees(site)?
            .ok_or_else(|| CacheError::Io("cache entry missing after refresh".to_string()))
    }

    /// Fetch the tool list from the catalog and store it. The catalog
    /// assigns tools to sites via its own prefixed code; anything not
    /// belonging to this site is dropped before caching.
    pub fn refresh_tools(
        &self,
        site: &str,
        catalog: &dyn Catalog,
    ) -> Result<RefreshOutcome, CacheError> {
        let mut tools = catalog.tools(site)?;
        tools.retain(|t| t.belongs_to(site));
        let fingerprint =
            identity_fingerprint(tools.iter().map(|t| format!("{}|{}", t.patrimony, t.serial)));
        self.save(&tools_key(site), &tools, &fingerprint)
    }

    /// Fetch the employee list and store it, keeping only employees
    /// whose site group matches the requested site. The endpoint has
    /// been seen returning neighbouring groups.
    pub fn refresh_employees(
        &self,
        site: &str,
        catalog: &dyn Catalog,
    ) -> Result<RefreshOutcome, CacheError> {
        let code = site_code(site);
        let mut employees = catalog.employees(site)?;
        employees.retain(|e| e.site_group == code);
        let fingerprint =
            identity_fingerprint(employees.iter().map(|e| e.membership_id.clone()));
        self.save(&employees_key(site), &employees, &fingerprint)
    }

    /// Drop both cached lists for a site.
    pub fn reset(&self, site: &str) -> Result<(), CacheError> {
        self.conn.execute(
            "DELETE FROM cache_entries WHERE key IN (?1, ?2)",
            params![tools_key(site), employees_key(site)],
        )?;
        Ok(())
    }

    fn load<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<Cached<T>>, CacheError> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT payload, fetched_at FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((payload, fetched_epoch)) = row else {
            return Ok(None);
        };

        let fetched_at = Utc
            .timestamp_opt(fetched_epoch, 0)
            .single()
            .ok_or(CacheError::CorruptTimestamp(fetched_epoch))?;
        let stale = Utc::now() - fetched_at > ttl;

        Ok(Some(Cached {
            payload: serde_json::from_str(&payload)?,
            fetched_at,
            stale,
        }))
    }

    fn save<T: serde::Serialize>(
        &self,
        key: &str,
        payload: &T,
        fingerprint: &str,
    ) -> Result<RefreshOutcome, CacheError> {
        let payload = serde_json::to_string(payload)?;
        let now = Utc::now().timestamp();

        let previous: Option<String> = self
            .conn
            .query_row(
                "SELECT fingerprint FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        if previous.as_deref() == Some(fingerprint) {
            self.conn.execute(
                "UPDATE cache_entries SET fetched_at = ?1 WHERE key = ?2",
                params![now, key],
            )?;
            return Ok(RefreshOutcome::Unchanged);
        }

        self.conn.execute(
            r#"INSERT INTO cache_entries (key, payload, fingerprint, fetched_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(key) DO UPDATE SET
                   payload = excluded.payload,
                   fingerprint = excluded.fingerprint,
                   fetched_at = excluded.fetched_at"#,
            params![key, payload, fingerprint, now],
        )?;
        Ok(RefreshOutcome::Updated)
    }
}

fn tools_key(site: &str) -> String {
    format!("tools:{site}")
}

fn employees_key(site: &str) -> String {
    format!("employees:{site}")
}

/// Hash of the sorted identity fields. The endpoint does not order its
/// results, so hashing the raw payload would report phantom updates on
/// every reshuffle.
fn identity_fingerprint<I: IntoIterator<Item = String>>(ids: I) -> String {
    let mut ids: Vec<String> = ids.into_iter().collect();
    ids.sort();
    let mut hasher = Sha256::new();
    for id in &ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Errors from the reference cache
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt cached payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("corrupt cache timestamp: {0}")]
    CorruptTimestamp(i64),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("cache I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    struct FakeCatalog {
        tools: Vec<CatalogTool>,
        employees: Vec<Employee>,
        fail: bool,
    }

    impl Catalog for FakeCatalog {
        fn tools(&self, _site: &str) -> Result<Vec<CatalogTool>, CatalogError> {
            if self.fail {
                return Err(CatalogError::Status {
                    url: "http://catalog/tools".to_string(),
                    status: 503,
                });
            }
            Ok(self.tools.clone())
        }

        fn employees(&self, _site: &str) -> Result<Vec<Employee>, CatalogError> {
            if self.fail {
                return Err(CatalogError::Status {
                    url: "http://catalog/employees".to_string(),
                    status: 503,
                });
            }
            Ok(self.employees.clone())
        }

        fn find_tool(&self, term: &str) -> Result<Vec<CatalogTool>, CatalogError> {
            Ok(self
                .tools
                .iter()
                .filter(|t| t.patrimony == term || t.serial == term)
                .cloned()
                .collect())
        }
    }

    fn tool(patrimony: &str, site: &str) -> CatalogTool {
        CatalogTool {
            patrimony: patrimony.to_string(),
            serial: String::new(),
            description: "DRILL".to_string(),
            category_code: "100200300".to_string(),
            site_code: site_code(site),
            catalog_status: "DISPONIVEL".to_string(),
        }
    }

    fn employee(membership_id: &str, site: &str) -> Employee {
        Employee {
            membership_id: membership_id.to_string(),
            name: "ANA SILVA".to_string(),
            site_group: site_code(site),
        }
    }

    fn open_cache(dir: &Path) -> ReferenceCache {
        ReferenceCache::open(&dir.join("cache.db"), Duration::hours(2), Duration::hours(6))
            .unwrap()
    }

    fn backdate(cache: &ReferenceCache, key: &str, hours: i64) {
        let then = (Utc::now() - Duration::hours(hours)).timestamp();
        cache
            .conn
            .execute(
                "UPDATE cache_entries SET fetched_at = ?1 WHERE key = ?2",
                params![then, key],
            )
            .unwrap();
    }

    #[test]
    fn test_miss_returns_none() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        assert!(cache.tools("OBRA01").unwrap().is_none());
    }

    #[test]
    fn test_refresh_then_get() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let catalog = FakeCatalog {
            tools: vec![tool("T100", "OBRA01")],
            employees: vec![],
            fail: false,
        };

        let outcome = cache.refresh_tools("OBRA01", &catalog).unwrap();
        assert_eq!(outcome, RefreshOutcome::Updated);

        let cached = cache.tools("OBRA01").unwrap().unwrap();
        assert_eq!(cached.payload.len(), 1);
        assert_eq!(cached.payload[0].patrimony, "T100");
        assert!(!cached.stale);
    }

    #[test]
    fn test_unchanged_refresh_renews_ttl_only() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let catalog = FakeCatalog {
            tools: vec![tool("T100", "OBRA01")],
            employees: vec![],
            fail: false,
        };

        cache.refresh_tools("OBRA01", &catalog).unwrap();
        backdate(&cache, &tools_key("OBRA01"), 3);
        assert!(cache.tools("OBRA01").unwrap().unwrap().stale);

        let outcome = cache.refresh_tools("OBRA01", &catalog).unwrap();
        assert_eq!(outcome, RefreshOutcome::Unchanged);
        assert!(!cache.tools("OBRA01").unwrap().unwrap().stale);
    }

    #[test]
    fn test_changed_content_reports_updated() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());

        let first = FakeCatalog {
            tools: vec![tool("T100", "OBRA01")],
            employees: vec![],
            fail: false,
        };
        cache.refresh_tools("OBRA01", &first).unwrap();

        let second = FakeCatalog {
            tools: vec![tool("T100", "OBRA01"), tool("T200", "OBRA01")],
            employees: vec![],
            fail: false,
        };
        let outcome = cache.refresh_tools("OBRA01", &second).unwrap();
        assert_eq!(outcome, RefreshOutcome::Updated);
        assert_eq!(cache.tools("OBRA01").unwrap().unwrap().payload.len(), 2);
    }

    #[test]
    fn test_failed_refresh_preserves_stale_entry() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let good = FakeCatalog {
            tools: vec![tool("T100", "OBRA01")],
            employees: vec![],
            fail: false,
        };
        cache.refresh_tools("OBRA01", &good).unwrap();
        backdate(&cache, &tools_key("OBRA01"), 5);

        let down = FakeCatalog {
            tools: vec![],
            employees: vec![],
            fail: true,
        };
        assert!(cache.refresh_tools("OBRA01", &down).is_err());

        // Outage leaves the stale list in place for offline work.
        let cached = cache.tools("OBRA01").unwrap().unwrap();
        assert_eq!(cached.payload[0].patrimony, "T100");
        assert!(cached.stale);
    }

    #[test]
    fn test_tools_filtered_to_requested_site() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let catalog = FakeCatalog {
            tools: vec![tool("T100", "OBRA01"), tool("T999", "OBRA02")],
            employees: vec![],
            fail: false,
        };

        cache.refresh_tools("OBRA01", &catalog).unwrap();
        let cached = cache.tools("OBRA01").unwrap().unwrap();
        assert_eq!(cached.payload.len(), 1);
        assert_eq!(cached.payload[0].patrimony, "T100");
    }

    #[test]
    fn test_employees_refiltered_by_site_group() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let catalog = FakeCatalog {
            tools: vec![],
            employees: vec![employee("M100", "OBRA01"), employee("M200", "OBRA02")],
            fail: false,
        };

        cache.refresh_employees("OBRA01", &catalog).unwrap();
        let cached = cache.employees("OBRA01").unwrap().unwrap();
        assert_eq!(cached.payload.len(), 1);
        assert_eq!(cached.payload[0].membership_id, "M100");
    }

    #[test]
    fn test_sites_are_independent() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let catalog = FakeCatalog {
            tools: vec![tool("T100", "OBRA01")],
            employees: vec![],
            fail: false,
        };

        cache.refresh_tools("OBRA01", &catalog).unwrap();
        assert!(cache.tools("OBRA01").unwrap().is_some());
        assert!(cache.tools("OBRA02").unwrap().is_none());
    }

    #[test]
    fn test_reset_clears_both_lists() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let catalog = FakeCatalog {
            tools: vec![tool("T100", "OBRA01")],
            employees: vec![employee("M100", "OBRA01")],
            fail: false,
        };

        cache.refresh_tools("OBRA01", &catalog).unwrap();
        cache.refresh_employees("OBRA01", &catalog).unwrap();
        cache.reset("OBRA01").unwrap();

        assert!(cache.tools("OBRA01").unwrap().is_none());
        assert!(cache.employees("OBRA01").unwrap().is_none());
    }

    #[test]
    fn test_reordered_payload_only_renews_ttl() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());

        let first = FakeCatalog {
            tools: vec![tool("T100", "OBRA01"), tool("T200", "OBRA01")],
            employees: vec![],
            fail: false,
        };
        cache.refresh_tools("OBRA01", &first).unwrap();

        // Same tools, different order: the fingerprint must not move.
        let reshuffled = FakeCatalog {
            tools: vec![tool("T200", "OBRA01"), tool("T100", "OBRA01")],
            employees: vec![],
            fail: false,
        };
        let outcome = cache.refresh_tools("OBRA01", &reshuffled).unwrap();
        assert_eq!(outcome, RefreshOutcome::Unchanged);
    }

    #[test]
    fn test_read_through_miss_blocks_on_first_fetch() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let catalog = FakeCatalog {
            tools: vec![tool("T100", "OBRA01")],
            employees: vec![],
            fail: false,
        };

        let cached = cache.tools_through("OBRA01", &catalog).unwrap();
        assert_eq!(cached.payload.len(), 1);
        assert!(!cached.stale);
    }

    #[test]
    fn test_read_through_serves_fresh_without_fetching() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let catalog = FakeCatalog {
            tools: vec![tool("T100", "OBRA01")],
            employees: vec![],
            fail: false,
        };
        cache.refresh_tools("OBRA01", &catalog).unwrap();

        // A dead catalog is never consulted while the entry is fresh.
        let dead = FakeCatalog {
            tools: vec![],
            employees: vec![],
            fail: true,
        };
        let cached = cache.tools_through("OBRA01", &dead).unwrap();
        assert_eq!(cached.payload[0].patrimony, "T100");
    }

    #[test]
    fn test_read_through_refreshes_stale_entry() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let old = FakeCatalog {
            tools: vec![tool("T100", "OBRA01")],
            employees: vec![],
            fail: false,
        };
        cache.refresh_tools("OBRA01", &old).unwrap();
        backdate(&cache, &tools_key("OBRA01"), 3);

        let newer = FakeCatalog {
            tools: vec![tool("T100", "OBRA01"), tool("T200", "OBRA01")],
            employees: vec![],
            fail: false,
        };
        let cached = cache.tools_through("OBRA01", &newer).unwrap();
        assert_eq!(cached.payload.len(), 2);
        assert!(!cached.stale);
    }

    #[test]
    fn test_read_through_stale_survives_catalog_outage() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let catalog = FakeCatalog {
            tools: vec![tool("T100", "OBRA01")],
            employees: vec![],
            fail: false,
        };
        cache.refresh_tools("OBRA01", &catalog).unwrap();
        backdate(&cache, &tools_key("OBRA01"), 3);

        let dead = FakeCatalog {
            tools: vec![],
            employees: vec![],
            fail: true,
        };
        let cached = cache.tools_through("OBRA01", &dead).unwrap();
        assert_eq!(cached.payload[0].patrimony, "T100");
        assert!(cached.stale);
    }

    #[test]
    fn test_read_through_miss_with_outage_errors() {
        let tmp = tempdir().unwrap();
        let cache = open_cache(tmp.path());
        let dead = FakeCatalog {
            tools: vec![],
            employees: vec![],
            fail: true,
        };

        assert!(matches!(
            cache.tools_through("OBRA01", &dead),
            Err(CacheError::Catalog(_))
        ));
        assert!(matches!(
            cache.employees_through("OBRA01", &dead),
            Err(CacheError::Catalog(_))
        ));
    }
}
