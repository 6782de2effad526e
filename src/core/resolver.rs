//! Approver resolution - abstract approver plus delegation state to a concrete user

use chrono::NaiveDate;
use tracing::debug;

use crate::core::delegation::DelegationRegistry;
use crate::core::error::ApprovalError;
use crate::core::identity::{TenantId, UserId};
use crate::core::team::Directory;
use crate::entities::instance::StepInstance;
use crate::entities::template::ApproverType;

/// Outcome of resolving one step's approver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedApprover {
    /// Who the template designates
    pub nominal: UserId,
    /// Who acts instead, when a delegation is in force
    pub delegate: Option<UserId>,
}

impl ResolvedApprover {
    pub fn actual(&self) -> &UserId {
        self.delegate.as_ref().unwrap_or(&self.nominal)
    }
}

/// What the resolver needs to know about the request
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    pub tenant: &'a TenantId,
    pub document_type: &'a str,
    pub requester_department: Option<&'a str>,
    pub date: NaiveDate,
}

pub struct ApproverResolver<'a> {
    directory: &'a dyn Directory,
    delegations: &'a DelegationRegistry,
}

impl<'a> ApproverResolver<'a> {
    pub fn new(directory: &'a dyn Directory, delegations: &'a DelegationRegistry) -> Self {
        Self {
            directory,
            delegations,
        }
    }

    /// Resolve the nominal approver, then apply delegation if the step allows it
    pub fn resolve(
        &self,
        step: &StepInstance,
        ctx: &ResolutionContext<'_>,
    ) -> Result<ResolvedApprover, ApprovalError> {
        let nominal = self.resolve_nominal(step, ctx)?;

        let delegation = if step.allow_delegation {
            self.delegations
                .find_active_delegate(&nominal, ctx.document_type, ctx.date)
        } else {
            None
        };

        if let Some(d) = delegation {
            debug!(
                step = step.step_order,
                nominal = %nominal,
                delegate = %d.delegate_id,
                delegation = %d.id,
                "approver delegated"
            );
        }

        Ok(ResolvedApprover {
            delegate: delegation.map(|d| d.delegate_id.clone()),
            nominal,
        })
    }

    fn resolve_nominal(
        &self,
        step: &StepInstance,
        ctx: &ResolutionContext<'_>,
    ) -> Result<UserId, ApprovalError> {
        let unresolved = |identifier: &str| ApprovalError::ApproverResolution {
            step_order: step.step_order,
            approver_type: step.approver_type.to_string(),
            identifier: identifier.to_string(),
        };

        let wanted = step.approver_spec.trim();
        match step.approver_type {
            ApproverType::User => {
                if wanted.is_empty() {
                    Err(unresolved(wanted))
                } else {
                    Ok(UserId::new(wanted))
                }
            }
            ApproverType::Department if wanted.is_empty() => {
                let department = ctx
                    .requester_department
                    .ok_or_else(|| unresolved("<requester department>"))?;
                self.directory
                    .resolve(ctx.tenant, ApproverType::Department, department)
                    .ok_or_else(|| unresolved(department))
            }
            other => self
                .directory
                .resolve(ctx.tenant, other, wanted)
                .ok_or_else(|| unresolved(wanted)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::team::{TeamMember, TeamRoster};
    use crate::entities::delegation::Delegation;
    use crate::entities::template::StepDef;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup() -> (TeamRoster, DelegationRegistry) {
        let acme = TenantId::new("acme");
        let roster = TeamRoster::new(vec![
            TeamMember::new(acme.clone(), "d").with_role("controller"),
            TeamMember::new(acme.clone(), "e"),
            TeamMember::new(acme.clone(), "head").heading("production"),
        ]);
        let registry = DelegationRegistry::new(vec![Delegation::new(
            acme,
            UserId::new("d"),
            UserId::new("e"),
            date(2026, 1, 1),
            date(2026, 1, 31),
        )]);
        (roster, registry)
    }

    fn ctx<'a>(tenant: &'a TenantId, on: NaiveDate) -> ResolutionContext<'a> {
        ResolutionContext {
            tenant,
            document_type: "purchase_order",
            requester_department: Some("production"),
            date: on,
        }
    }

    #[test]
    fn test_delegation_applies_inside_window() {
        let (roster, registry) = setup();
        let resolver = ApproverResolver::new(&roster, &registry);
        let tenant = TenantId::new("acme");
        let step = StepInstance::snapshot(&StepDef::new(1, ApproverType::Role, "controller"), 1);

        let inside = resolver.resolve(&step, &ctx(&tenant, date(2026, 1, 15))).unwrap();
        assert_eq!(inside.nominal.as_str(), "d");
        assert_eq!(inside.actual().as_str(), "e");

        let after = resolver.resolve(&step, &ctx(&tenant, date(2026, 2, 1))).unwrap();
        assert_eq!(after.actual().as_str(), "d");
        assert!(after.delegate.is_none());
    }

    #[test]
    fn test_delegation_disallowed_by_step() {
        let (roster, registry) = setup();
        let resolver = ApproverResolver::new(&roster, &registry);
        let tenant = TenantId::new("acme");
        let mut step = StepInstance::snapshot(&StepDef::new(1, ApproverType::User, "d"), 1);
        step.allow_delegation = false;

        let resolved = resolver.resolve(&step, &ctx(&tenant, date(2026, 1, 15))).unwrap();
        assert_eq!(resolved.actual().as_str(), "d");
    }

    #[test]
    fn test_blank_department_uses_requester_department() {
        let (roster, registry) = setup();
        let resolver = ApproverResolver::new(&roster, &registry);
        let tenant = TenantId::new("acme");
        let step = StepInstance::snapshot(&StepDef::new(1, ApproverType::Department, ""), 1);

        let resolved = resolver.resolve(&step, &ctx(&tenant, date(2026, 3, 1))).unwrap();
        assert_eq!(resolved.nominal.as_str(), "head");
    }

    #[test]
    fn test_unfillable_role_is_an_error() {
        let (roster, registry) = setup();
        let resolver = ApproverResolver::new(&roster, &registry);
        let tenant = TenantId::new("acme");
        let step = StepInstance::snapshot(&StepDef::new(3, ApproverType::Role, "cfo"), 3);

        let err = resolver.resolve(&step, &ctx(&tenant, date(2026, 3, 1))).unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::ApproverResolution { step_order: 3, .. }
        ));
    }
}
