//! Team roster - the directory that turns roles, positions and departments
//! into concrete users

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::identity::{TenantId, UserId};
use crate::core::project::Project;
use crate::entities::template::ApproverType;
use crate::yaml::{parse_yaml_file, YamlError};

/// Roster file name at the project root
pub const ROSTER_FILE: &str = "team.yaml";

/// Looks up concrete users for abstract approver specs
pub trait Directory: Send + Sync {
    /// Resolve a ROLE, POSITION or DEPARTMENT identifier to one active user
    fn resolve(
        &self,
        tenant: &TenantId,
        approver_type: ApproverType,
        identifier: &str,
    ) -> Option<UserId>;
}

/// A member of the team roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub tenant: TenantId,

    /// Login name, used as the user id
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Resolves DEPARTMENT approvers for `department`
    #[serde(default)]
    pub department_head: bool,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl TeamMember {
    pub fn new(tenant: TenantId, username: impl Into<String>) -> Self {
        Self {
            tenant,
            username: username.into(),
            name: String::new(),
            email: String::new(),
            roles: Vec::new(),
            position: None,
            department: None,
            department_head: false,
            active: true,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_position(mut self, position: impl Into<String>) -> Self {
        self.position = Some(position.into());
        self
    }

    pub fn heading(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self.department_head = true;
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn user_id(&self) -> UserId {
        UserId::new(self.username.clone())
    }
}

/// Team roster loaded from `team.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamRoster {
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

impl TeamRoster {
    pub fn new(members: Vec<TeamMember>) -> Self {
        Self { members }
    }

    /// Load the roster of a project; a missing file is an empty roster
    pub fn load(project: &Project) -> Result<Self, YamlError> {
        let path = project.root().join(ROSTER_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_file(&path)
    }

    pub fn load_file(path: &Path) -> Result<Self, YamlError> {
        parse_yaml_file(path)
    }

    pub fn active_members<'a>(&'a self, tenant: &'a TenantId) -> impl Iterator<Item = &'a TeamMember> {
        self.members
            .iter()
            .filter(move |m| m.active && &m.tenant == tenant)
    }

    pub fn members_with_role<'a>(
        &'a self,
        tenant: &'a TenantId,
        role: &'a str,
    ) -> impl Iterator<Item = &'a TeamMember> {
        self.active_members(tenant).filter(move |m| m.has_role(role))
    }

    pub fn find(&self, tenant: &TenantId, username: &str) -> Option<&TeamMember> {
        self.members
            .iter()
            .find(|m| &m.tenant == tenant && m.username == username)
    }
}

impl Directory for TeamRoster {
    fn resolve(
        &self,
        tenant: &TenantId,
        approver_type: ApproverType,
        identifier: &str,
    ) -> Option<UserId> {
        let member = match approver_type {
            ApproverType::Role => self.members_with_role(tenant, identifier).next(),
            ApproverType::Position => self.active_members(tenant).find(|m| {
                m.position
                    .as_deref()
                    .is_some_and(|p| p.eq_ignore_ascii_case(identifier))
            }),
            ApproverType::Department => self.active_members(tenant).find(|m| {
                m.department_head
                    && m.department
                        .as_deref()
                        .is_some_and(|d| d.eq_ignore_ascii_case(identifier))
            }),
            ApproverType::User => self
                .active_members(tenant)
                .find(|m| m.username == identifier),
        };
        member.map(|m| m.user_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> TeamRoster {
        let acme = TenantId::new("acme");
        let mut retired = TeamMember::new(acme.clone(), "old").with_role("quality");
        retired.active = false;
        TeamRoster::new(vec![
            retired,
            TeamMember::new(acme.clone(), "qa1").with_role("quality"),
            TeamMember::new(acme.clone(), "plant").with_position("Plant Manager"),
            TeamMember::new(acme.clone(), "buyer_lead").heading("purchasing"),
            TeamMember::new(TenantId::new("globex"), "qa2").with_role("quality"),
        ])
    }

    #[test]
    fn test_resolve_role_skips_inactive() {
        let r = roster();
        let user = r.resolve(&TenantId::new("acme"), ApproverType::Role, "QUALITY");
        assert_eq!(user.unwrap().as_str(), "qa1");
    }

    #[test]
    fn test_resolve_is_tenant_scoped() {
        let r = roster();
        let user = r.resolve(&TenantId::new("globex"), ApproverType::Role, "quality");
        assert_eq!(user.unwrap().as_str(), "qa2");
        assert!(r
            .resolve(&TenantId::new("globex"), ApproverType::Position, "plant manager")
            .is_none());
    }

    #[test]
    fn test_resolve_position_and_department() {
        let r = roster();
        let acme = TenantId::new("acme");
        assert_eq!(
            r.resolve(&acme, ApproverType::Position, "plant manager").unwrap().as_str(),
            "plant"
        );
        assert_eq!(
            r.resolve(&acme, ApproverType::Department, "Purchasing").unwrap().as_str(),
            "buyer_lead"
        );
        assert!(r.resolve(&acme, ApproverType::Department, "finance").is_none());
    }

    #[test]
    fn test_roster_yaml() {
        let yaml = r#"
members:
  - tenant: acme
    username: jsmith
    roles: [engineering, quality]
    department: quality
    department_head: true
"#;
        let roster: TeamRoster = serde_yml::from_str(yaml).unwrap();
        let member = roster.find(&TenantId::new("acme"), "jsmith").unwrap();
        assert!(member.active);
        assert!(member.has_role("Engineering"));
    }
}
