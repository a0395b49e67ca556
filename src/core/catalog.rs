//! Remote reference catalog client
//!
//! The catalog is a slow REST service holding the master list of tools
//! and employees per site. This module owns the seam (`Catalog`) plus the
//! HTTP implementation, and is the single place where the catalog's
//! legacy UPPERCASE field names are normalized into typed records.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::identity::{
    is_battery_term, normalize_search_term, IdentityError, ToolIdentity, BATTERY_CATEGORY,
};

/// Site codes in the catalog carry a fixed company prefix in front of the
/// site id ("8028" + site).
const SITE_CODE_PREFIX: &str = "8028";

/// Full catalog site code for a session site id.
pub fn site_code(site: &str) -> String {
    format!("{}{}", SITE_CODE_PREFIX, site)
}

/// One tool as the remote catalog describes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTool {
    #[serde(rename = "PATRIMONIO", default)]
    pub patrimony: String,
    #[serde(rename = "NUMSER", default)]
    pub serial: String,
    #[serde(rename = "DESCRICAO", default)]
    pub description: String,
    #[serde(rename = "COD_FERRA_COB", default)]
    pub category_code: String,
    /// Which site the catalog believes holds this tool (prefixed code)
    #[serde(rename = "T035GCODI", default)]
    pub site_code: String,
    /// Advisory status string maintained by the catalog itself
    #[serde(rename = "STATUS", default)]
    pub catalog_status: String,
}

impl CatalogTool {
    pub fn identity(&self) -> Result<ToolIdentity, IdentityError> {
        ToolIdentity::new(&self.patrimony, &self.serial)
    }

    /// Whether the catalog assigns this tool to the given session site.
    pub fn belongs_to(&self, site: &str) -> bool {
        self.site_code == site_code(site)
    }
}

/// One employee as the remote catalog describes them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    #[serde(rename = "MATRICULA", default)]
    pub membership_id: String,
    #[serde(rename = "NOME", default)]
    pub name: String,
    /// Site group the employee is assigned to; must be re-checked
    /// client-side against the requested site
    #[serde(rename = "GRUPODEF", default)]
    pub site_group: String,
}

/// Seam to the remote catalog. Read-only; there is no write path.
pub trait Catalog {
    /// All tools the catalog knows for a site.
    fn tools(&self, site: &str) -> Result<Vec<CatalogTool>, CatalogError>;

    /// All employees the catalog knows for a site. Implementations may
    /// return more than asked for; callers re-filter by `site_group`.
    fn employees(&self, site: &str) -> Result<Vec<Employee>, CatalogError>;

    /// Look a single term up (patrimony or serial, as scanned/typed).
    fn find_tool(&self, term: &str) -> Result<Vec<CatalogTool>, CatalogError>;
}

/// Search with entry normalization: bare 5-digit terms get the battery
/// prefix, and battery-shaped terms only match the battery category
/// (the same number can collide with an unrelated patrimony otherwise).
pub fn search(catalog: &dyn Catalog, raw_term: &str) -> Result<Vec<CatalogTool>, CatalogError> {
    let term = normalize_search_term(raw_term);
    if term.is_empty() {
        return Err(CatalogError::EmptyTerm);
    }

    let mut found = catalog.find_tool(&term)?;
    if is_battery_term(&term) {
        found.retain(|t| t.category_code == BATTERY_CATEGORY);
    }

    if found.is_empty() {
        return Err(CatalogError::NotFound { term });
    }
    Ok(found)
}

/// HTTP implementation of [`Catalog`]
pub struct RestCatalog {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl RestCatalog {
    pub fn new(base_url: &str) -> Result<Self, CatalogError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CatalogError> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self.client.get(&url).query(query).send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(resp.json()?)
    }
}

impl Catalog for RestCatalog {
    fn tools(&self, site: &str) -> Result<Vec<CatalogTool>, CatalogError> {
        self.get_json("tools", &[("site", site)])
    }

    fn employees(&self, site: &str) -> Result<Vec<Employee>, CatalogError> {
        self.get_json("employees", &[("site", site)])
    }

    fn find_tool(&self, term: &str) -> Result<Vec<CatalogTool>, CatalogError> {
        // The endpoint answers with a single object or an array depending
        // on how many records match.
        let value: serde_json::Value = self.get_json(&format!("tools/{}", term), &[])?;
        let tools = match value {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<Vec<CatalogTool>, _>>()?,
            other => vec![serde_json::from_value(other)?],
        };
        Ok(tools)
    }
}

/// In-memory [`Catalog`] over already-fetched lists. Backs offline
/// search against the cached copies.
pub struct LocalCatalog {
    tools: Vec<CatalogTool>,
    employees: Vec<Employee>,
}

impl LocalCatalog {
    pub fn new(tools: Vec<CatalogTool>, employees: Vec<Employee>) -> Self {
        Self { tools, employees }
    }
}

impl Catalog for LocalCatalog {
    fn tools(&self, _site: &str) -> Result<Vec<CatalogTool>, CatalogError> {
        Ok(self.tools.clone())
    }

    fn employees(&self, _site: &str) -> Result<Vec<Employee>, CatalogError> {
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

/// Errors from catalog access
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("unexpected catalog payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("tool not found in catalog: {term}")]
    NotFound { term: String },

    #[error("empty search term")]
    EmptyTerm,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCatalog {
        tools: Vec<CatalogTool>,
    }

    impl Catalog for FakeCatalog {
        fn tools(&self, _site: &str) -> Result<Vec<CatalogTool>, CatalogError> {
            Ok(self.tools.clone())
        }

        fn employees(&self, _site: &str) -> Result<Vec<Employee>, CatalogError> {
            Ok(vec![])
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

    fn tool(patrimony: &str, category: &str) -> CatalogTool {
        CatalogTool {
            patrimony: patrimony.to_string(),
            serial: String::new(),
            description: "BATTERY 18V".to_string(),
            category_code: category.to_string(),
            site_code: site_code("OBRA01"),
            catalog_status: "ATIVO".to_string(),
        }
    }

    #[test]
    fn test_wire_field_names_are_normalized() {
        let json = r#"{
            "PATRIMONIO": "A123",
            "NUMSER": "SN1",
            "DESCRICAO": "DRILL",
            "COD_FERRA_COB": "100",
            "T035GCODI": "8028OBRA01",
            "STATUS": "ATIVO"
        }"#;
        let t: CatalogTool = serde_json::from_str(json).unwrap();
        assert_eq!(t.patrimony, "A123");
        assert_eq!(t.serial, "SN1");
        assert!(t.belongs_to("OBRA01"));
        assert!(!t.belongs_to("OBRA02"));
    }

    #[test]
    fn test_missing_wire_fields_default_to_empty() {
        let t: CatalogTool = serde_json::from_str(r#"{"PATRIMONIO": "A1"}"#).unwrap();
        assert_eq!(t.serial, "");
        assert_eq!(t.category_code, "");
    }

    #[test]
    fn test_search_normalizes_bare_battery_number() {
        let catalog = FakeCatalog {
            tools: vec![tool("B77777", BATTERY_CATEGORY)],
        };
        let found = search(&catalog, "77777").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].patrimony, "B77777");
    }

    #[test]
    fn test_search_battery_term_filters_category() {
        // A non-battery tool that happens to carry a B-number patrimony
        // must not satisfy a battery search.
        let catalog = FakeCatalog {
            tools: vec![tool("B77777", "999")],
        };
        let err = search(&catalog, "77777").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn test_search_plain_term_keeps_all_matches() {
        let catalog = FakeCatalog {
            tools: vec![tool("A123456", "999")],
        };
        let found = search(&catalog, "a123456").unwrap();
        assert_eq!(found.len(), 1);
    }
}
