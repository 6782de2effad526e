//! Project discovery and layout
//!
//! A project is any directory holding an `.aprv/` folder:
//!
//! ```text
//! .aprv/config.yaml     project configuration
//! .aprv/approvals.db    instance store
//! team.yaml             directory of approvers
//! templates/*.yaml      approval templates
//! lines/*.yaml          legacy approval lines
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::team::ROSTER_FILE;

pub const APRV_DIR: &str = ".aprv";
pub const DATABASE_FILE: &str = "approvals.db";
pub const TEMPLATES_DIR: &str = "templates";
pub const LINES_DIR: &str = "lines";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not inside an aprv project (no .aprv directory found from {0})")]
    NotFound(PathBuf),

    #[error("An aprv project already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

const CONFIG_TEMPLATE: &str = r#"# aprv project configuration
# tenant: acme
# user: jsmith
engine:
  auto_start: true
  conflict_retries: 3
notifications:
  enabled: true
"#;

const ROSTER_TEMPLATE: &str = r#"# Approvers. Roles, positions and department heads resolve to these users.
members: []
#  - tenant: acme
#    username: jsmith
#    name: Jane Smith
#    roles: [manager]
#    position: Plant Manager
#    department: production
#    department_head: true
"#;

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    /// Find the project containing the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let cwd = std::env::current_dir()?;
        Self::discover_from(&cwd)
    }

    /// Walk up from `start` looking for an `.aprv` directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        start
            .ancestors()
            .find(|dir| dir.join(APRV_DIR).is_dir())
            .map(|dir| Self {
                root: dir.to_path_buf(),
            })
            .ok_or_else(|| ProjectError::NotFound(start.to_path_buf()))
    }

    /// Create the project layout at `root`
    pub fn init(root: &Path, force: bool) -> Result<Self, ProjectError> {
        let aprv = root.join(APRV_DIR);
        if aprv.exists() && !force {
            return Err(ProjectError::AlreadyExists(root.to_path_buf()));
        }

        fs::create_dir_all(&aprv)?;
        fs::create_dir_all(root.join(TEMPLATES_DIR))?;
        fs::create_dir_all(root.join(LINES_DIR))?;

        let config = aprv.join(crate::core::config::CONFIG_FILE);
        if !config.exists() {
            fs::write(&config, CONFIG_TEMPLATE)?;
        }
        let roster = root.join(ROSTER_FILE);
        if !roster.exists() {
            fs::write(&roster, ROSTER_TEMPLATE)?;
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn aprv_dir(&self) -> PathBuf {
        self.root.join(APRV_DIR)
    }

    pub fn default_database(&self) -> PathBuf {
        self.aprv_dir().join(DATABASE_FILE)
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join(TEMPLATES_DIR)
    }

    pub fn lines_dir(&self) -> PathBuf {
        self.root.join(LINES_DIR)
    }
}
