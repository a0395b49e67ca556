//! Configuration management with layered hierarchy

use chrono::Duration;
use serde::Deserialize;
use std::path::PathBuf;

use crate::core::identity::BATTERY_CATEGORY;
use crate::core::Workspace;

/// campo configuration with layered hierarchy
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site id this office works for
    pub site: Option<String>,

    /// Base URL of the remote catalog
    pub api_base: Option<String>,

    /// Tool list TTL in hours
    pub tools_ttl_hours: Option<i64>,

    /// Employee list TTL in hours
    pub employees_ttl_hours: Option<i64>,

    /// Category codes that get battery patrimony normalization
    pub battery_categories: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/campo/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                if let Ok(contents) = std::fs::read_to_string(&global_path) {
                    if let Ok(global) = serde_yml::from_str::<Config>(&contents) {
                        config.merge(global);
                    }
                }
            }
        }

        // 3. Workspace config (.campo/config.yaml)
        if let Ok(workspace) = Workspace::discover() {
            let workspace_config_path = workspace.campo_dir().join("config.yaml");
            if workspace_config_path.exists() {
                if let Ok(contents) = std::fs::read_to_string(&workspace_config_path) {
                    if let Ok(workspace_config) = serde_yml::from_str::<Config>(&contents) {
                        config.merge(workspace_config);
                    }
                }
            }
        }

        // 4. Environment variables
        if let Ok(site) = std::env::var("CAMPO_SITE") {
            config.site = Some(site);
        }
        if let Ok(api_base) = std::env::var("CAMPO_API_BASE") {
            config.api_base = Some(api_base);
        }

        config
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "campo")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.site.is_some() {
            self.site = other.site;
        }
        if other.api_base.is_some() {
            self.api_base = other.api_base;
        }
        if other.tools_ttl_hours.is_some() {
            self.tools_ttl_hours = other.tools_ttl_hours;
        }
        if other.employees_ttl_hours.is_some() {
            self.employees_ttl_hours = other.employees_ttl_hours;
        }
        if other.battery_categories.is_some() {
            self.battery_categories = other.battery_categories;
        }
    }

    /// Tool cache TTL, defaulting to 2 hours
    pub fn tools_ttl(&self) -> Duration {
        Duration::hours(self.tools_ttl_hours.unwrap_or(2).max(0))
    }

    /// Employee cache TTL, defaulting to 6 hours
    pub fn employees_ttl(&self) -> Duration {
        Duration::hours(self.employees_ttl_hours.unwrap_or(6).max(0))
    }

    /// Battery category codes, defaulting to the one known code
    pub fn battery_categories(&self) -> Vec<String> {
        self.battery_categories
            .clone()
            .unwrap_or_else(|| vec![BATTERY_CATEGORY.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.site.is_none());
        assert_eq!(config.tools_ttl(), Duration::hours(2));
        assert_eq!(config.employees_ttl(), Duration::hours(6));
        assert_eq!(config.battery_categories(), vec![BATTERY_CATEGORY.to_string()]);
    }

    #[test]
    fn test_merge_takes_other_when_set() {
        let mut base = Config {
            site: Some("OBRA01".to_string()),
            tools_ttl_hours: Some(1),
            ..Config::default()
        };
        base.merge(Config {
            site: Some("OBRA02".to_string()),
            employees_ttl_hours: Some(12),
            ..Config::default()
        });

        assert_eq!(base.site.as_deref(), Some("OBRA02"));
        // Unset fields in the overlay leave the base alone.
        assert_eq!(base.tools_ttl(), Duration::hours(1));
        assert_eq!(base.employees_ttl(), Duration::hours(12));
    }

    #[test]
    fn test_yaml_parses_partial_files() {
        let config: Config =
            serde_yml::from_str("site: OBRA07\nbattery_categories: [\"777888999\"]").unwrap();
        assert_eq!(config.site.as_deref(), Some("OBRA07"));
        assert_eq!(config.battery_categories(), vec!["777888999".to_string()]);
        assert_eq!(config.tools_ttl(), Duration::hours(2));
    }
}
