//! Instance engine - per-instance state machine
//!
//! ```text
//! PENDING -> IN_PROGRESS -> APPROVED | REJECTED | CANCELLED
//! ```
//!
//! Every operation mutates the instance it is handed and returns the
//! notifications the transition produced. Callers work on a private copy and
//! commit it as one unit, so an error part-way leaves nothing behind.
//!
//! A step whose approver cannot be resolved when its stage starts is parked:
//! it stays PENDING with an `approver_unresolved` history entry until
//! [`InstanceEngine::retry_unresolved`] assigns it.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::core::error::ApprovalError;
use crate::core::identity::UserId;
use crate::core::notify::{Notification, NotificationKind};
use crate::core::resolver::{ApproverResolver, ResolutionContext};
use crate::core::step::{GroupOutcome, StepEngine, TimeoutOutcome};
use crate::entities::instance::{
    ApprovalEvent, EventAction, Instance, InstanceStatus, StepInstance, StepStatus,
};
use crate::entities::template::StepType;

const GROUP_RESOLVED: &str = "group resolved";
const GROUP_FAILED: &str = "group failed";
const SAME_APPROVER: &str = "same approver";
const NOTIFICATION_DELIVERED: &str = "notification delivered";

/// Counts from one timeout pass over an instance
#[derive(Debug, Default)]
pub struct TimeoutPass {
    pub timed_out: usize,
    pub auto_approved: usize,
    pub notifications: Vec<Notification>,
}

pub struct InstanceEngine<'a> {
    resolver: ApproverResolver<'a>,
}

impl<'a> InstanceEngine<'a> {
    pub fn new(resolver: ApproverResolver<'a>) -> Self {
        Self { resolver }
    }

    /// PENDING -> IN_PROGRESS; activates the first stage
    pub fn start_approval(
        &self,
        inst: &mut Instance,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, ApprovalError> {
        match inst.status {
            InstanceStatus::Pending => {}
            InstanceStatus::InProgress => {
                return Err(ApprovalError::InvalidTransition {
                    action: "start",
                    target: inst.id.to_string(),
                    current: inst.status.to_string(),
                    detail: "approval is already running".to_string(),
                })
            }
            _ => return Err(not_active(inst)),
        }

        let mut out = Vec::new();
        inst.status = InstanceStatus::InProgress;
        inst.record(ApprovalEvent::new(now, EventAction::Started).by(actor));
        debug!(instance = %inst.id, actor = %actor, "approval started");

        match inst.stages().first().copied() {
            Some(first) => self.activate_stage(inst, first, now, &mut out)?,
            None => self.finish(inst, InstanceStatus::Approved, UserId::system(), now, &mut out),
        }
        Ok(out)
    }

    pub fn approve_step(
        &self,
        inst: &mut Instance,
        step_order: u32,
        actor: &UserId,
        comment: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, ApprovalError> {
        ensure_in_progress(inst)?;
        let step = step_mut(inst, step_order)?;
        StepEngine::approve(step, actor, comment, now)?;
        let stage = step.stage;
        let on_behalf_of = delegated_from(step);

        inst.record(
            ApprovalEvent::new(now, EventAction::StepApproved)
                .step(step_order)
                .by(actor)
                .on_behalf_of(on_behalf_of.as_ref())
                .comment(comment),
        );
        debug!(instance = %inst.id, step = step_order, actor = %actor, "step approved");

        let mut out = Vec::new();
        self.settle(inst, stage, now, &mut out)?;
        out.insert(
            0,
            Notification::new(NotificationKind::Approved, &inst.requester_id, inst, Some(step_order)),
        );
        Ok(out)
    }

    pub fn reject_step(
        &self,
        inst: &mut Instance,
        step_order: u32,
        actor: &UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, ApprovalError> {
        ensure_in_progress(inst)?;
        let step = step_mut(inst, step_order)?;
        StepEngine::reject(step, actor, reason, now)?;
        let stage = step.stage;
        let on_behalf_of = delegated_from(step);

        inst.record(
            ApprovalEvent::new(now, EventAction::StepRejected)
                .step(step_order)
                .by(actor)
                .on_behalf_of(on_behalf_of.as_ref())
                .comment(Some(reason)),
        );
        debug!(instance = %inst.id, step = step_order, actor = %actor, "step rejected");

        let mut out = Vec::new();
        self.settle(inst, stage, now, &mut out)?;
        out.insert(
            0,
            Notification::new(NotificationKind::Rejected, &inst.requester_id, inst, Some(step_order)),
        );
        Ok(out)
    }

    pub fn skip_step(
        &self,
        inst: &mut Instance,
        step_order: u32,
        actor: &UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, ApprovalError> {
        ensure_in_progress(inst)?;
        let step = step_mut(inst, step_order)?;
        StepEngine::skip(step, actor, reason, now)?;
        let stage = step.stage;

        inst.record(
            ApprovalEvent::new(now, EventAction::StepSkipped)
                .step(step_order)
                .by(actor)
                .comment(Some(reason)),
        );
        debug!(instance = %inst.id, step = step_order, actor = %actor, "step skipped");

        let mut out = Vec::new();
        self.settle(inst, stage, now, &mut out)?;
        Ok(out)
    }

    /// Expire every overdue step of the instance.
    ///
    /// A no-op on an instance that is not running or has nothing overdue.
    pub fn timeout_overdue(
        &self,
        inst: &mut Instance,
        now: DateTime<Utc>,
    ) -> Result<TimeoutPass, ApprovalError> {
        let mut pass = TimeoutPass::default();
        if inst.status != InstanceStatus::InProgress {
            return Ok(pass);
        }

        let overdue: Vec<u32> = inst
            .steps
            .iter()
            .filter(|s| s.is_overdue(now))
            .map(|s| s.step_order)
            .collect();

        for step_order in overdue {
            if inst.status != InstanceStatus::InProgress {
                break;
            }
            let step = step_mut(inst, step_order)?;
            // An earlier timeout in this pass may already have settled the stage
            if !step.is_overdue(now) {
                continue;
            }
            let outcome = StepEngine::timeout(step, now)?;
            let stage = step.stage;
            let approver = step.actual_approver().cloned();

            let (action, comment) = match outcome {
                TimeoutOutcome::AutoApproved => {
                    pass.auto_approved += 1;
                    (EventAction::StepApproved, "auto-approved on timeout")
                }
                TimeoutOutcome::TimedOut => {
                    pass.timed_out += 1;
                    (EventAction::StepTimedOut, "timed out")
                }
            };
            inst.record(
                ApprovalEvent::new(now, action)
                    .step(step_order)
                    .by(&UserId::system())
                    .comment(Some(comment)),
            );
            debug!(instance = %inst.id, step = step_order, outcome = ?outcome, "step timed out");

            let first = pass.notifications.len();
            self.settle(inst, stage, now, &mut pass.notifications)?;
            if let Some(approver) = approver {
                pass.notifications.insert(
                    first,
                    Notification::new(NotificationKind::TimedOut, &approver, inst, Some(step_order)),
                );
            }
        }
        Ok(pass)
    }

    /// PENDING | IN_PROGRESS -> CANCELLED. Steps are left as they are.
    pub fn cancel(
        &self,
        inst: &mut Instance,
        actor: &UserId,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, ApprovalError> {
        if inst.status.is_terminal() {
            return Err(not_active(inst));
        }

        inst.status = InstanceStatus::Cancelled;
        inst.completed_at = Some(now);
        inst.cancelled_by = Some(actor.clone());
        inst.record(
            ApprovalEvent::new(now, EventAction::Cancelled)
                .by(actor)
                .comment(reason),
        );
        info!(instance = %inst.id, actor = %actor, "approval cancelled");

        let mut recipients: BTreeSet<UserId> = inst
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::InProgress)
            .filter_map(|s| s.actual_approver().cloned())
            .collect();
        if &inst.requester_id != actor {
            recipients.insert(inst.requester_id.clone());
        }

        Ok(recipients
            .iter()
            .map(|r| Notification::new(NotificationKind::Cancelled, r, inst, None))
            .collect())
    }

    /// Assign the parked steps of the current stage, then settle it.
    ///
    /// Fails without changes if any of them still cannot be resolved.
    pub fn retry_unresolved(
        &self,
        inst: &mut Instance,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, ApprovalError> {
        ensure_in_progress(inst)?;
        let parked = parked_steps(inst);
        let stage = match (inst.current_step_order, parked.is_empty()) {
            (Some(stage), false) => stage,
            _ => {
                return Err(ApprovalError::InvalidTransition {
                    action: "retry",
                    target: inst.id.to_string(),
                    current: inst.status.to_string(),
                    detail: "no step is waiting on an approver".to_string(),
                })
            }
        };
        info!(instance = %inst.id, actor = %actor, steps = ?parked, "retrying approver resolution");

        let mut out = Vec::new();
        self.assign_steps(inst, stage, parked, false, now, &mut out)?;
        self.settle(inst, stage, now, &mut out)?;
        Ok(out)
    }

    /// Start every step of a stage, then settle it
    fn activate_stage(
        &self,
        inst: &mut Instance,
        stage: u32,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) -> Result<(), ApprovalError> {
        inst.current_step_order = Some(stage);
        let orders: Vec<u32> = inst.stage_steps(stage).map(|s| s.step_order).collect();
        self.assign_steps(inst, stage, orders, true, now, out)?;
        self.settle(inst, stage, now, out)
    }

    /// Resolve and start the given steps of `stage`.
    ///
    /// With `park` set an unresolvable approver leaves its step PENDING and
    /// recorded instead of failing the transition.
    fn assign_steps(
        &self,
        inst: &mut Instance,
        stage: u32,
        orders: Vec<u32>,
        park: bool,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) -> Result<(), ApprovalError> {
        let tenant = inst.tenant.clone();
        let document_type = inst.document.document_type.clone();
        let department = inst.requester_department.clone();
        let ctx = ResolutionContext {
            tenant: &tenant,
            document_type: &document_type,
            requester_department: department.as_deref(),
            date: now.date_naive(),
        };

        for step_order in orders {
            let outcome = self.resolver.resolve(step_ref(inst, step_order)?, &ctx);
            let resolved = match outcome {
                Ok(resolved) => resolved,
                Err(e @ ApprovalError::ApproverResolution { .. }) if park => {
                    warn!(instance = %inst.id, step = step_order, error = %e, "approver unresolved");
                    inst.record(
                        ApprovalEvent::new(now, EventAction::ApproverUnresolved)
                            .step(step_order)
                            .by(&UserId::system())
                            .comment(Some(&e.to_string())),
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            let actual = resolved.actual().clone();
            let nominal = resolved.delegate.as_ref().map(|_| resolved.nominal.clone());
            let same_person =
                inst.skip_if_same_person && approved_before(inst, &actual, stage);

            let step = step_mut(inst, step_order)?;
            StepEngine::start(step, resolved, now)?;
            let step_type = step.step_type;

            inst.record(
                ApprovalEvent::new(now, EventAction::Assigned)
                    .step(step_order)
                    .by(&actual)
                    .on_behalf_of(nominal.as_ref()),
            );
            debug!(instance = %inst.id, step = step_order, approver = %actual, "step assigned");

            if same_person {
                self.system_skip(inst, step_order, SAME_APPROVER, now)?;
                continue;
            }

            out.push(Notification::new(
                NotificationKind::Assigned,
                &actual,
                inst,
                Some(step_order),
            ));
            if step_type == StepType::Notification {
                self.system_skip(inst, step_order, NOTIFICATION_DELIVERED, now)?;
            }
        }
        Ok(())
    }

    /// React to a terminal step transition inside `stage`
    fn settle(
        &self,
        inst: &mut Instance,
        stage: u32,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) -> Result<(), ApprovalError> {
        let members: Vec<&StepInstance> = inst.stage_steps(stage).collect();
        match StepEngine::evaluate_group(&members) {
            GroupOutcome::Open => Ok(()),
            GroupOutcome::Failed { step_order, by } => {
                debug!(instance = %inst.id, stage, step = step_order, "stage failed");
                self.skip_open_members(inst, stage, GROUP_FAILED, now)?;
                self.finish(inst, InstanceStatus::Rejected, by, now, out);
                Ok(())
            }
            GroupOutcome::Passed => {
                debug!(instance = %inst.id, stage, "stage passed");
                self.skip_open_members(inst, stage, GROUP_RESOLVED, now)?;
                match inst.stages().into_iter().find(|s| *s > stage) {
                    Some(next) => self.activate_stage(inst, next, now, out),
                    None => {
                        let last = last_approver(inst);
                        self.finish(inst, InstanceStatus::Approved, last, now, out);
                        Ok(())
                    }
                }
            }
        }
    }

    fn skip_open_members(
        &self,
        inst: &mut Instance,
        stage: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        let open: Vec<u32> = inst
            .stage_steps(stage)
            .filter(|s| s.is_active())
            .map(|s| s.step_order)
            .collect();
        for step_order in open {
            self.system_skip(inst, step_order, reason, now)?;
        }
        Ok(())
    }

    fn system_skip(
        &self,
        inst: &mut Instance,
        step_order: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        StepEngine::resolve_skipped(step_mut(inst, step_order)?, reason, now)?;
        inst.record(
            ApprovalEvent::new(now, EventAction::StepSkipped)
                .step(step_order)
                .by(&UserId::system())
                .comment(Some(reason)),
        );
        Ok(())
    }

    fn finish(
        &self,
        inst: &mut Instance,
        status: InstanceStatus,
        final_approver: UserId,
        now: DateTime<Utc>,
        out: &mut Vec<Notification>,
    ) {
        inst.status = status;
        inst.completed_at = Some(now);
        inst.final_approver = Some(final_approver.clone());

        let action = if status == InstanceStatus::Approved {
            EventAction::Approved
        } else {
            EventAction::Rejected
        };
        inst.record(ApprovalEvent::new(now, action).by(&final_approver));
        info!(
            instance = %inst.id,
            status = %status,
            final_approver = %final_approver,
            "approval completed"
        );

        out.push(Notification::new(
            NotificationKind::Completed,
            &inst.requester_id,
            inst,
            None,
        ));
    }
}

fn not_active(inst: &Instance) -> ApprovalError {
    ApprovalError::InstanceNotActive {
        id: inst.id,
        status: inst.status.to_string(),
    }
}

fn ensure_in_progress(inst: &Instance) -> Result<(), ApprovalError> {
    if inst.status != InstanceStatus::InProgress {
        return Err(not_active(inst));
    }
    Ok(())
}

fn step_ref(inst: &Instance, step_order: u32) -> Result<&StepInstance, ApprovalError> {
    let id = inst.id;
    inst.step(step_order)
        .ok_or(ApprovalError::StepNotFound { id, step_order })
}

fn step_mut(inst: &mut Instance, step_order: u32) -> Result<&mut StepInstance, ApprovalError> {
    let id = inst.id;
    inst.step_mut(step_order)
        .ok_or(ApprovalError::StepNotFound { id, step_order })
}

/// Steps of the current stage still waiting for an approver
pub fn parked_steps(inst: &Instance) -> Vec<u32> {
    match inst.current_step_order {
        Some(stage) if inst.status == InstanceStatus::InProgress => inst
            .stage_steps(stage)
            .filter(|s| s.status == StepStatus::Pending)
            .map(|s| s.step_order)
            .collect(),
        _ => Vec::new(),
    }
}

/// Nominal approver of a delegated step
fn delegated_from(step: &StepInstance) -> Option<UserId> {
    step.delegated_to.as_ref().and(step.approver_id.clone())
}

/// Whether `user` approved a step of an earlier stage
fn approved_before(inst: &Instance, user: &UserId, stage: u32) -> bool {
    inst.steps.iter().any(|s| {
        s.stage < stage && s.status == StepStatus::Approved && s.decided_by.as_ref() == Some(user)
    })
}

fn last_approver(inst: &Instance) -> UserId {
    inst.steps
        .iter()
        .filter(|s| s.status == StepStatus::Approved)
        .max_by_key(|s| (s.decided_at, s.step_order))
        .and_then(|s| s.decided_by.clone())
        .unwrap_or_else(UserId::system)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::delegation::DelegationRegistry;
    use crate::core::identity::TenantId;
    use crate::core::team::{TeamMember, TeamRoster};
    use crate::entities::instance::DocumentRef;
    use crate::entities::template::{ApprovalMethod, ApproverType, StepDef, Template};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()
    }

    fn roster() -> TeamRoster {
        let acme = TenantId::new("acme");
        TeamRoster::new(vec![
            TeamMember::new(acme.clone(), "buyer").with_role("purchasing"),
            TeamMember::new(acme.clone(), "boss").with_role("manager"),
            TeamMember::new(acme, "cfo").with_position("CFO"),
        ])
    }

    fn instance_for(template: &Template) -> Instance {
        let doc = DocumentRef {
            document_type: template.document_type.clone(),
            document_id: "PO-1".to_string(),
            document_no: None,
            title: None,
            amount: Some(5000.0),
        };
        let mut inst = Instance::new(
            template.tenant.clone(),
            template.code.clone(),
            template.revision,
            doc,
            UserId::new("req"),
            now(),
        );
        inst.skip_if_same_person = template.skip_if_same_person;
        for (def, (_, stage)) in template.ordered_steps().into_iter().zip(template.stage_plan()) {
            inst.steps.push(StepInstance::snapshot(def, stage));
        }
        inst
    }

    fn sequential() -> Template {
        Template::new(TenantId::new("acme"), "PO-STD", "PO", "purchase_order", "admin")
            .with_step(StepDef::new(1, ApproverType::Role, "manager"))
            .with_step(StepDef::new(2, ApproverType::Position, "CFO"))
    }

    fn run<F>(f: F)
    where
        F: FnOnce(&InstanceEngine<'_>),
    {
        let roster = roster();
        let registry = DelegationRegistry::default();
        let engine = InstanceEngine::new(ApproverResolver::new(&roster, &registry));
        f(&engine);
    }

    #[test]
    fn test_sequential_chain_approves() {
        run(|engine| {
            let mut inst = instance_for(&sequential());
            let notes = engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            assert_eq!(inst.current_step_order, Some(1));
            assert_eq!(notes[0].recipient.as_str(), "boss");

            engine
                .approve_step(&mut inst, 1, &UserId::new("boss"), Some("ok"), now())
                .unwrap();
            assert_eq!(inst.current_step_order, Some(2));
            assert_eq!(inst.step(2).unwrap().status, StepStatus::InProgress);

            engine
                .approve_step(&mut inst, 2, &UserId::new("cfo"), None, now())
                .unwrap();
            assert_eq!(inst.status, InstanceStatus::Approved);
            assert_eq!(inst.final_approver.as_ref().unwrap().as_str(), "cfo");
            assert_eq!(inst.completed_at, Some(now()));
        });
    }

    #[test]
    fn test_rejection_stops_chain() {
        run(|engine| {
            let mut inst = instance_for(&sequential());
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            engine
                .reject_step(&mut inst, 1, &UserId::new("boss"), "over budget", now())
                .unwrap();
            assert_eq!(inst.status, InstanceStatus::Rejected);
            assert_eq!(inst.final_approver.as_ref().unwrap().as_str(), "boss");
            assert_eq!(inst.step(2).unwrap().status, StepStatus::Pending);
        });
    }

    #[test]
    fn test_wrong_actor_leaves_step_in_progress() {
        run(|engine| {
            let mut inst = instance_for(&sequential());
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            let err = engine
                .approve_step(&mut inst, 1, &UserId::new("cfo"), None, now())
                .unwrap_err();
            assert!(matches!(err, ApprovalError::InvalidTransition { .. }));
            assert_eq!(inst.step(1).unwrap().status, StepStatus::InProgress);
        });
    }

    #[test]
    fn test_cancelled_instance_refuses_actions() {
        run(|engine| {
            let mut inst = instance_for(&sequential());
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            let notes = engine
                .cancel(&mut inst, &UserId::new("req"), Some("withdrawn"), now())
                .unwrap();
            assert_eq!(notes.len(), 1);
            assert_eq!(inst.step(1).unwrap().status, StepStatus::InProgress);

            let err = engine
                .approve_step(&mut inst, 1, &UserId::new("boss"), None, now())
                .unwrap_err();
            assert!(matches!(err, ApprovalError::InstanceNotActive { .. }));
            let err = engine
                .cancel(&mut inst, &UserId::new("req"), None, now())
                .unwrap_err();
            assert!(matches!(err, ApprovalError::InstanceNotActive { .. }));
        });
    }

    #[test]
    fn test_majority_group_resolves_early() {
        let template = Template::new(TenantId::new("acme"), "PO-PAR", "PO", "purchase_order", "admin")
            .with_approval_type(crate::entities::template::ApprovalType::Hybrid)
            .with_step(StepDef::new(1, ApproverType::User, "a").in_group(1, ApprovalMethod::Majority))
            .with_step(StepDef::new(2, ApproverType::User, "b").in_group(1, ApprovalMethod::Majority))
            .with_step(StepDef::new(3, ApproverType::User, "c").in_group(1, ApprovalMethod::Majority));
        run(|engine| {
            let mut inst = instance_for(&template);
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            assert_eq!(inst.stage_steps(1).filter(|s| s.status == StepStatus::InProgress).count(), 3);

            engine.approve_step(&mut inst, 1, &UserId::new("a"), None, now()).unwrap();
            assert_eq!(inst.status, InstanceStatus::InProgress);
            engine.approve_step(&mut inst, 2, &UserId::new("b"), None, now()).unwrap();
            assert_eq!(inst.status, InstanceStatus::Approved);
            assert_eq!(inst.step(3).unwrap().status, StepStatus::Skipped);

            let err = engine
                .reject_step(&mut inst, 3, &UserId::new("c"), "no", now())
                .unwrap_err();
            assert!(matches!(err, ApprovalError::InstanceNotActive { .. }));
        });
    }

    #[test]
    fn test_same_person_skip() {
        let mut template = Template::new(TenantId::new("acme"), "PO-SAME", "PO", "purchase_order", "admin")
            .with_step(StepDef::new(1, ApproverType::User, "boss"))
            .with_step(StepDef::new(2, ApproverType::Role, "manager"))
            .with_step(StepDef::new(3, ApproverType::Position, "CFO"));
        template.skip_if_same_person = true;
        run(|engine| {
            let mut inst = instance_for(&template);
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            engine.approve_step(&mut inst, 1, &UserId::new("boss"), None, now()).unwrap();
            assert_eq!(inst.step(2).unwrap().status, StepStatus::Skipped);
            assert_eq!(inst.step(2).unwrap().comment.as_deref(), Some(SAME_APPROVER));
            assert_eq!(inst.current_step_order, Some(3));
        });
    }

    #[test]
    fn test_notification_step_does_not_block() {
        let template = Template::new(TenantId::new("acme"), "PO-NOTE", "PO", "purchase_order", "admin")
            .with_step(StepDef::new(1, ApproverType::Role, "purchasing").with_step_type(StepType::Notification))
            .with_step(StepDef::new(2, ApproverType::Role, "manager"));
        run(|engine| {
            let mut inst = instance_for(&template);
            let notes = engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            assert_eq!(inst.step(1).unwrap().status, StepStatus::Skipped);
            assert_eq!(inst.current_step_order, Some(2));
            let recipients: Vec<&str> = notes.iter().map(|n| n.recipient.as_str()).collect();
            assert_eq!(recipients, vec!["buyer", "boss"]);
        });
    }

    #[test]
    fn test_unresolvable_approver_parks_step() {
        let template = Template::new(TenantId::new("acme"), "PO-BAD", "PO", "purchase_order", "admin")
            .with_step(StepDef::new(1, ApproverType::Role, "treasurer"));
        run(|engine| {
            let mut inst = instance_for(&template);
            let notes = engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            assert!(notes.is_empty());
            assert_eq!(inst.status, InstanceStatus::InProgress);
            assert_eq!(inst.step(1).unwrap().status, StepStatus::Pending);
            assert_eq!(parked_steps(&inst), vec![1]);

            let last = inst.history.last().unwrap();
            assert_eq!(last.action, EventAction::ApproverUnresolved);
            assert_eq!(last.step_order, Some(1));
            assert!(last.comment.as_deref().unwrap().contains("treasurer"));
        });
    }

    #[test]
    fn test_decision_commits_when_next_approver_is_unresolved() {
        let template = Template::new(TenantId::new("acme"), "PO-GAP", "PO", "purchase_order", "admin")
            .with_step(StepDef::new(1, ApproverType::Role, "manager"))
            .with_step(StepDef::new(2, ApproverType::Role, "treasurer"));
        run(|engine| {
            let mut inst = instance_for(&template);
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            engine
                .approve_step(&mut inst, 1, &UserId::new("boss"), None, now())
                .unwrap();
            assert_eq!(inst.step(1).unwrap().status, StepStatus::Approved);
            assert_eq!(inst.current_step_order, Some(2));
            assert_eq!(parked_steps(&inst), vec![2]);

            let err = engine
                .retry_unresolved(&mut inst, &UserId::new("admin"), now())
                .unwrap_err();
            assert!(matches!(err, ApprovalError::ApproverResolution { step_order: 2, .. }));
        });
    }

    #[test]
    fn test_retry_assigns_parked_step() {
        let template = Template::new(TenantId::new("acme"), "PO-FIX", "PO", "purchase_order", "admin")
            .with_step(StepDef::new(1, ApproverType::Role, "treasurer"));
        let mut inst = instance_for(&template);
        run(|engine| {
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
        });

        let acme = TenantId::new("acme");
        let fixed = TeamRoster::new(vec![TeamMember::new(acme, "tina").with_role("treasurer")]);
        let registry = DelegationRegistry::default();
        let engine = InstanceEngine::new(ApproverResolver::new(&fixed, &registry));
        let notes = engine
            .retry_unresolved(&mut inst, &UserId::new("admin"), now())
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].recipient.as_str(), "tina");
        assert_eq!(inst.step(1).unwrap().status, StepStatus::InProgress);
        assert!(parked_steps(&inst).is_empty());

        let err = engine
            .retry_unresolved(&mut inst, &UserId::new("admin"), now())
            .unwrap_err();
        assert!(matches!(err, ApprovalError::InvalidTransition { .. }));
    }

    #[test]
    fn test_cancel_notifies_each_approver_once() {
        let template = Template::new(TenantId::new("acme"), "PO-DUP", "PO", "purchase_order", "admin")
            .with_approval_type(crate::entities::template::ApprovalType::Parallel)
            .with_step(StepDef::new(1, ApproverType::User, "a").in_group(1, ApprovalMethod::All))
            .with_step(StepDef::new(2, ApproverType::User, "b").in_group(1, ApprovalMethod::All))
            .with_step(StepDef::new(3, ApproverType::User, "a").in_group(1, ApprovalMethod::All));
        run(|engine| {
            let mut inst = instance_for(&template);
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            let notes = engine
                .cancel(&mut inst, &UserId::new("boss"), None, now())
                .unwrap();
            let mut recipients: Vec<&str> = notes.iter().map(|n| n.recipient.as_str()).collect();
            recipients.sort();
            assert_eq!(recipients, vec!["a", "b", "req"]);
        });
    }

    #[test]
    fn test_step_notification_reports_settled_status() {
        run(|engine| {
            let mut inst = instance_for(&sequential());
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            let notes = engine
                .approve_step(&mut inst, 1, &UserId::new("boss"), None, now())
                .unwrap();
            assert_eq!(notes[0].kind, NotificationKind::Approved);
            assert_eq!(notes[0].status, "in_progress");

            let notes = engine
                .approve_step(&mut inst, 2, &UserId::new("cfo"), None, now())
                .unwrap();
            assert_eq!(notes[0].kind, NotificationKind::Approved);
            assert_eq!(notes[0].status, "approved");
            assert_eq!(notes.last().unwrap().kind, NotificationKind::Completed);
        });
    }

    #[test]
    fn test_mandatory_timeout_rejects() {
        let template = Template::new(TenantId::new("acme"), "PO-TO", "PO", "purchase_order", "admin")
            .with_step(StepDef::new(1, ApproverType::Role, "manager").with_timeout(24, false))
            .with_step(StepDef::new(2, ApproverType::Position, "CFO"));
        run(|engine| {
            let mut inst = instance_for(&template);
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();

            let early = engine.timeout_overdue(&mut inst, now() + Duration::hours(2)).unwrap();
            assert_eq!(early.timed_out, 0);

            let pass = engine.timeout_overdue(&mut inst, now() + Duration::hours(25)).unwrap();
            assert_eq!(pass.timed_out, 1);
            assert_eq!(inst.status, InstanceStatus::Rejected);
            assert!(inst.final_approver.as_ref().unwrap().is_system());

            let again = engine.timeout_overdue(&mut inst, now() + Duration::hours(26)).unwrap();
            assert_eq!(again.timed_out + again.auto_approved, 0);
        });
    }

    #[test]
    fn test_auto_approve_on_timeout_advances() {
        let template = Template::new(TenantId::new("acme"), "PO-AUTO", "PO", "purchase_order", "admin")
            .with_step(StepDef::new(1, ApproverType::Role, "manager").with_timeout(8, true))
            .with_step(StepDef::new(2, ApproverType::Position, "CFO"));
        run(|engine| {
            let mut inst = instance_for(&template);
            engine.start_approval(&mut inst, &UserId::new("req"), now()).unwrap();
            let pass = engine.timeout_overdue(&mut inst, now() + Duration::hours(9)).unwrap();
            assert_eq!(pass.auto_approved, 1);
            assert_eq!(inst.step(1).unwrap().status, StepStatus::Approved);
            assert_eq!(inst.current_step_order, Some(2));
        });
    }
}
