//! Configuration - layered from defaults, user file, project file and environment
//!
//! Later layers override earlier ones key by key:
//!
//! 1. built-in defaults
//! 2. `~/.config/aprv/config.yaml` (platform equivalent via `directories`)
//! 3. `<project>/.aprv/config.yaml`
//! 4. `APRV_TENANT`, `APRV_USER`, `APRV_DB`

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_yml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::project::Project;

pub const CONFIG_FILE: &str = "config.yaml";

/// Engine behaviour switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Start the first stage right after a request creates its instance
    pub auto_start: bool,

    /// How often the CLI retries an operation that lost a concurrent race
    pub conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            conflict_retries: 3,
        }
    }
}

/// Tera message templates, one per notification kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationTemplates {
    pub assigned: String,
    pub approved: String,
    pub rejected: String,
    pub cancelled: String,
    pub timed_out: String,
    pub completed: String,
}

const DOC: &str =
    "{{ document_type }} {% if document_no %}{{ document_no }}{% else %}{{ document_id }}{% endif %}";

impl Default for NotificationTemplates {
    fn default() -> Self {
        Self {
            assigned: format!("{{{{ recipient }}}}: {DOC} is waiting for your approval at step {{{{ step_order }}}}"),
            approved: format!("{{{{ recipient }}}}: step {{{{ step_order }}}} of {DOC} was approved"),
            rejected: format!("{{{{ recipient }}}}: step {{{{ step_order }}}} of {DOC} was rejected"),
            cancelled: format!("{{{{ recipient }}}}: approval of {DOC} was cancelled"),
            timed_out: format!("{{{{ recipient }}}}: step {{{{ step_order }}}} of {DOC} timed out"),
            completed: format!("{{{{ recipient }}}}: approval of {DOC} finished as {{{{ status }}}}"),
        }
    }
}

impl NotificationTemplates {
    /// `(kind, template)` pairs keyed like `NotificationKind::as_str`
    pub fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("assigned", self.assigned.as_str()),
            ("approved", self.approved.as_str()),
            ("rejected", self.rejected.as_str()),
            ("cancelled", self.cancelled.as_str()),
            ("timed_out", self.timed_out.as_str()),
            ("completed", self.completed.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub templates: NotificationTemplates,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            templates: NotificationTemplates::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tenant used when `--tenant` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    /// Acting user when `--as` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Database path; relative paths are taken from the project root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,

    pub engine: EngineConfig,

    pub notifications: NotificationConfig,
}

impl Config {
    /// Load every layer for a project (or none, outside a project)
    pub fn load(project: Option<&Project>) -> Self {
        let user_file = ProjectDirs::from("", "", "aprv").map(|d| d.config_dir().join(CONFIG_FILE));
        let project_file = project.map(|p| p.aprv_dir().join(CONFIG_FILE));
        Self::load_layers(
            user_file.as_deref(),
            project_file.as_deref(),
            |key| std::env::var(key).ok(),
        )
    }

    /// Merge the given files over the defaults, then apply `env`
    pub fn load_layers<F>(user_file: Option<&Path>, project_file: Option<&Path>, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut merged = Value::Mapping(Mapping::new());
        for path in [user_file, project_file].into_iter().flatten() {
            if let Some(layer) = read_layer(path) {
                merge(&mut merged, layer);
            }
        }

        let mut config: Config = match serde_yml::from_value(merged) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "ignoring invalid configuration");
                Config::default()
            }
        };

        if let Some(tenant) = env("APRV_TENANT") {
            config.tenant = Some(tenant);
        }
        if let Some(user) = env("APRV_USER") {
            config.user = Some(user);
        }
        if let Some(db) = env("APRV_DB") {
            config.database = Some(PathBuf::from(db));
        }
        config
    }

    /// Database location for a project
    pub fn database_path(&self, project: &Project) -> PathBuf {
        match &self.database {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => project.root().join(path),
            None => project.default_database(),
        }
    }
}

fn read_layer(path: &Path) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read config file");
            return None;
        }
    };
    match serde_yml::from_str::<Value>(&content) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot parse config file");
            None
        }
    }
}

/// Deep-merge `overlay` into `base`; mappings merge, anything else replaces
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::load_layers(None, None, |_| None);
        assert!(config.engine.auto_start);
        assert_eq!(config.engine.conflict_retries, 3);
        assert!(config.notifications.enabled);
        assert!(config.tenant.is_none());
    }

    #[test]
    fn test_project_overrides_user_key_by_key() {
        let tmp = TempDir::new().unwrap();
        let user = tmp.path().join("user.yaml");
        let project = tmp.path().join("project.yaml");
        fs::write(&user, "tenant: acme\nuser: jsmith\nengine:\n  conflict_retries: 7\n").unwrap();
        fs::write(&project, "tenant: globex\nengine:\n  auto_start: false\n").unwrap();

        let config = Config::load_layers(Some(&user), Some(&project), |_| None);
        assert_eq!(config.tenant.as_deref(), Some("globex"));
        assert_eq!(config.user.as_deref(), Some("jsmith"));
        assert!(!config.engine.auto_start);
        assert_eq!(config.engine.conflict_retries, 7);
    }

    #[test]
    fn test_environment_wins() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project.yaml");
        fs::write(&project, "tenant: acme\n").unwrap();

        let config = Config::load_layers(None, Some(&project), |key| match key {
            "APRV_TENANT" => Some("initech".to_string()),
            "APRV_DB" => Some("/tmp/other.db".to_string()),
            _ => None,
        });
        assert_eq!(config.tenant.as_deref(), Some("initech"));
        assert_eq!(config.database, Some(PathBuf::from("/tmp/other.db")));
    }

    #[test]
    fn test_broken_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project.yaml");
        fs::write(&project, "tenant: [unclosed\n").unwrap();
        let config = Config::load_layers(None, Some(&project), |_| None);
        assert_eq!(config, Config::default());
    }
}
