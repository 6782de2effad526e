//! Shared helper functions for CLI commands
//!
//! Every command that touches the store goes through [`Session`], which
//! discovers the project, layers the configuration and wires the service.

use miette::{miette, IntoDiagnostic, Result};
use std::sync::Arc;
use tracing::debug;

use crate::cli::GlobalOpts;
use crate::core::{
    ApprovalError, ApprovalService, Config, EntityId, LogNotifier, Project, SqliteStore,
    SystemClock, TeamRoster, TenantId, UserId,
};

/// An opened project with its configured service
pub struct Session {
    pub project: Project,
    pub config: Config,
    pub tenant: TenantId,
    user: Option<UserId>,
    pub roster: Arc<TeamRoster>,
    pub service: ApprovalService,
}

impl Session {
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = Project::discover().into_diagnostic()?;
        let config = Config::load(Some(&project));

        let tenant = global
            .tenant
            .clone()
            .or_else(|| config.tenant.clone())
            .map(TenantId::new)
            .ok_or_else(|| {
                miette!("No tenant selected. Pass --tenant or set `tenant:` in .aprv/config.yaml")
            })?;

        let env_user = std::env::var("USER").or_else(|_| std::env::var("USERNAME")).ok();
        let user = acting_user(global.as_user.as_deref(), config.user.as_deref(), env_user.as_deref());

        let db_path = config.database_path(&project);
        debug!(path = %db_path.display(), tenant = %tenant, user = ?user, "opening store");
        let store = SqliteStore::open(&db_path).into_diagnostic()?;
        let roster = Arc::new(TeamRoster::load(&project)?);
        let notifier = LogNotifier::new(&config.notifications).into_diagnostic()?;

        let service = ApprovalService::new(
            Arc::new(store),
            roster.clone(),
            Arc::new(notifier),
            Arc::new(SystemClock),
        )
        .with_config(config.engine.clone());

        Ok(Self {
            project,
            config,
            tenant,
            user,
            roster,
            service,
        })
    }

    /// The acting user, required by commands that decide or request
    pub fn user(&self) -> Result<&UserId> {
        self.user
            .as_ref()
            .ok_or_else(|| miette!("Cannot tell who you are. Pass --as or set `user:` in config"))
    }

    /// Department of the acting user according to the roster
    pub fn department_of_user(&self) -> Option<String> {
        let user = self.user.as_ref()?;
        self.roster
            .find(&self.tenant, user.as_str())
            .and_then(|m| m.department.clone())
    }

    /// Run an operation, retrying it on concurrent modification
    pub fn retrying<T, F>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> std::result::Result<T, ApprovalError>,
    {
        with_retry(self.config.engine.conflict_retries, op).into_diagnostic()
    }
}

/// Pick the acting user: `--as`, then config, then the login name
pub fn acting_user(flag: Option<&str>, config: Option<&str>, env: Option<&str>) -> Option<UserId> {
    [flag, config, env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(UserId::new)
}

/// Retry `op` up to `retries` extra times while it fails with a retryable error
pub fn with_retry<T, F>(retries: u32, mut op: F) -> std::result::Result<T, ApprovalError>
where
    F: FnMut() -> std::result::Result<T, ApprovalError>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Err(e) if e.is_retryable() && attempt < retries => {
                attempt += 1;
                debug!(attempt, error = %e, "retrying after conflict");
            }
            other => return other,
        }
    }
}

pub fn parse_instance_id(id: &str) -> Result<EntityId> {
    id.trim()
        .parse()
        .map_err(|e| miette!("Invalid instance ID '{}': {}", id, e))
}

/// Truncate a string to max_len, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityPrefix;

    #[test]
    fn test_acting_user_precedence() {
        assert_eq!(acting_user(Some("cfo"), Some("boss"), Some("root")).unwrap().as_str(), "cfo");
        assert_eq!(acting_user(None, Some("boss"), Some("root")).unwrap().as_str(), "boss");
        assert_eq!(acting_user(Some(" "), None, Some("root")).unwrap().as_str(), "root");
        assert!(acting_user(None, None, None).is_none());
    }

    #[test]
    fn test_with_retry_stops_on_success() {
        let id = EntityId::new(EntityPrefix::Inst);
        let mut calls = 0;
        let result = with_retry(3, || {
            calls += 1;
            if calls < 3 {
                Err(ApprovalError::ConcurrentModification { id })
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_with_retry_gives_up() {
        let id = EntityId::new(EntityPrefix::Inst);
        let mut calls = 0;
        let result: std::result::Result<(), _> = with_retry(2, || {
            calls += 1;
            Err(ApprovalError::ConcurrentModification { id })
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_retryable_error_returns_immediately() {
        let mut calls = 0;
        let result: std::result::Result<(), _> = with_retry(5, || {
            calls += 1;
            Err(ApprovalError::InstanceNotFound("INST-x".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 8), "hello...");
    }
}
