//! Workspace discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

/// A site office workspace (the parent of .campo/)
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Find the workspace root by walking up from the current directory
    pub fn discover() -> Result<Self, WorkspaceError> {
        let current =
            std::env::current_dir().map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find the workspace root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, WorkspaceError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        loop {
            let campo_dir = current.join(".campo");
            if campo_dir.is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(WorkspaceError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new workspace at the given path
    pub fn init(path: &Path) -> Result<Self, WorkspaceError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        let campo_dir = root.join(".campo");
        if campo_dir.exists() {
            return Err(WorkspaceError::AlreadyExists(root.clone()));
        }

        std::fs::create_dir_all(&campo_dir)
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;
        std::fs::create_dir_all(root.join("signatures"))
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        let config_path = campo_dir.join("config.yaml");
        std::fs::write(&config_path, Self::default_config())
            .map_err(|e| WorkspaceError::IoError(e.to_string()))?;

        Ok(Self { root })
    }

    fn default_config() -> &'static str {
        r#"# campo workspace configuration

# Site id this office works for (required; can also come from CAMPO_SITE)
# site: ""

# Base URL of the remote tool/employee catalog
# api_base: ""

# Cache TTLs in hours (tools default 2, employees default 6)
# tools_ttl_hours: 2
# employees_ttl_hours: 6

# Category codes whose patrimony labels carry a letter prefix
# battery_categories: ["531080001"]
"#
    }

    /// Get the workspace root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .campo configuration directory
    pub fn campo_dir(&self) -> PathBuf {
        self.root.join(".campo")
    }

    /// Shared record store database
    pub fn records_db(&self) -> PathBuf {
        self.campo_dir().join("records.db")
    }

    /// Local reference cache database
    pub fn cache_db(&self) -> PathBuf {
        self.campo_dir().join("cache.db")
    }

    /// Local custody ledger mirror database
    pub fn ledger_db(&self) -> PathBuf {
        self.campo_dir().join("ledger.db")
    }

    /// Where captured signature images land
    pub fn signatures_dir(&self) -> PathBuf {
        self.root.join("signatures")
    }
}

/// Errors that can occur during workspace operations
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("not a campo workspace (searched from {searched_from:?}). Run 'campo init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("campo workspace already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_workspace_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let workspace = Workspace::init(tmp.path()).unwrap();

        assert!(workspace.campo_dir().is_dir());
        assert!(workspace.campo_dir().join("config.yaml").exists());
        assert!(workspace.signatures_dir().is_dir());
    }

    #[test]
    fn test_workspace_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Workspace::init(tmp.path()).unwrap();

        let err = Workspace::init(tmp.path()).unwrap_err();
        assert!(matches!(err, WorkspaceError::AlreadyExists(_)));
    }

    #[test]
    fn test_workspace_discover_finds_campo_dir() {
        let tmp = tempdir().unwrap();
        Workspace::init(tmp.path()).unwrap();

        let subdir = tmp.path().join("some/nested/dir");
        std::fs::create_dir_all(&subdir).unwrap();

        let workspace = Workspace::discover_from(&subdir).unwrap();
        assert_eq!(
            workspace.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_workspace_discover_fails_without_campo_dir() {
        let tmp = tempdir().unwrap();
        let err = Workspace::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound { .. }));
    }
}
