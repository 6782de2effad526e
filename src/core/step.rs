//! Step engine - per-step state machine and parallel-group completion
//!
//! ```text
//! PENDING -> IN_PROGRESS -> APPROVED | REJECTED | SKIPPED | TIMEOUT
//! ```
//!
//! All terminal states are final. Functions here only touch the step they are
//! given; cascading to the instance is the instance engine's job.

use chrono::{DateTime, Duration, Utc};

use crate::core::error::ApprovalError;
use crate::core::identity::UserId;
use crate::core::resolver::ResolvedApprover;
use crate::entities::instance::{StepInstance, StepStatus};
use crate::entities::template::ApprovalMethod;

/// Result of a timeout on a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    AutoApproved,
    TimedOut,
}

/// State of a stage (a single step or a parallel group)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOutcome {
    /// Still waiting on members
    Open,
    Passed,
    /// Failed by this step; `by` is the deciding actor
    Failed { step_order: u32, by: UserId },
}

fn invalid(step: &StepInstance, action: &'static str, detail: impl Into<String>) -> ApprovalError {
    ApprovalError::InvalidTransition {
        action,
        target: step.label(),
        current: step.status.to_string(),
        detail: detail.into(),
    }
}

fn require_in_progress(step: &StepInstance, action: &'static str) -> Result<(), ApprovalError> {
    if step.status != StepStatus::InProgress {
        return Err(invalid(step, action, "step is not in progress"));
    }
    Ok(())
}

fn decide(step: &mut StepInstance, status: StepStatus, by: UserId, comment: Option<&str>, now: DateTime<Utc>) {
    step.status = status;
    step.decided_at = Some(now);
    step.decided_by = Some(by);
    step.comment = comment.map(|c| c.to_string());
}

pub struct StepEngine;

impl StepEngine {
    /// PENDING -> IN_PROGRESS with a resolved approver
    pub fn start(
        step: &mut StepInstance,
        approver: ResolvedApprover,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        if step.status != StepStatus::Pending {
            return Err(invalid(step, "start", "step is not pending"));
        }
        step.approver_id = Some(approver.nominal);
        step.delegated_to = approver.delegate;
        step.assigned_at = Some(now);
        step.due_at = step
            .timeout_hours
            .map(|hours| now + Duration::hours(i64::from(hours)));
        step.status = StepStatus::InProgress;
        Ok(())
    }

    /// IN_PROGRESS -> APPROVED; only the actual approver may act
    pub fn approve(
        step: &mut StepInstance,
        actor: &UserId,
        comment: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        require_in_progress(step, "approve")?;
        Self::check_actor(step, actor, "approve")?;
        decide(step, StepStatus::Approved, actor.clone(), comment, now);
        Ok(())
    }

    /// IN_PROGRESS -> REJECTED; only the actual approver may act
    pub fn reject(
        step: &mut StepInstance,
        actor: &UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        require_in_progress(step, "reject")?;
        Self::check_actor(step, actor, "reject")?;
        if reason.trim().is_empty() {
            return Err(invalid(step, "reject", "a rejection reason is required"));
        }
        decide(step, StepStatus::Rejected, actor.clone(), Some(reason), now);
        Ok(())
    }

    /// IN_PROGRESS -> SKIPPED on request; needs `allow_skip` and not mandatory+critical
    pub fn skip(
        step: &mut StepInstance,
        actor: &UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        require_in_progress(step, "skip")?;
        if !step.allow_skip {
            return Err(invalid(step, "skip", "step does not allow skipping"));
        }
        if step.is_mandatory && step.is_critical {
            return Err(invalid(step, "skip", "mandatory critical steps cannot be skipped"));
        }
        decide(step, StepStatus::Skipped, actor.clone(), Some(reason), now);
        Ok(())
    }

    /// Engine-initiated skip (group resolved, same approver, notification).
    /// Bypasses `allow_skip`; the step must still be active.
    pub fn resolve_skipped(
        step: &mut StepInstance,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ApprovalError> {
        if !step.is_active() {
            return Err(invalid(step, "skip", "step is already resolved"));
        }
        decide(step, StepStatus::Skipped, UserId::system(), Some(reason), now);
        Ok(())
    }

    /// Expire an overdue step
    pub fn timeout(step: &mut StepInstance, now: DateTime<Utc>) -> Result<TimeoutOutcome, ApprovalError> {
        require_in_progress(step, "time out")?;
        if !step.is_overdue(now) {
            return Err(invalid(step, "time out", "step is not overdue"));
        }
        if step.auto_approve_on_timeout {
            decide(
                step,
                StepStatus::Approved,
                UserId::system(),
                Some("auto-approved on timeout"),
                now,
            );
            Ok(TimeoutOutcome::AutoApproved)
        } else {
            decide(step, StepStatus::Timeout, UserId::system(), Some("timed out"), now);
            Ok(TimeoutOutcome::TimedOut)
        }
    }

    fn check_actor(step: &StepInstance, actor: &UserId, action: &'static str) -> Result<(), ApprovalError> {
        match step.actual_approver() {
            Some(approver) if approver == actor => Ok(()),
            Some(approver) => Err(invalid(
                step,
                action,
                format!("{} is not the assigned approver ({})", actor, approver),
            )),
            None => Err(invalid(step, action, "step has no assigned approver")),
        }
    }

    /// Completion predicate over the members of one stage.
    ///
    /// SKIPPED members and non-mandatory TIMEOUT members are neutral and do
    /// not count toward N. A REJECTED member, or a mandatory member that timed
    /// out, fails the stage whatever the method.
    pub fn evaluate_group(steps: &[&StepInstance]) -> GroupOutcome {
        if let Some(failed) = steps.iter().find(|s| Self::is_failure(s)) {
            return GroupOutcome::Failed {
                step_order: failed.step_order,
                by: failed.decided_by.clone().unwrap_or_else(UserId::system),
            };
        }

        let counted: Vec<&&StepInstance> = steps.iter().filter(|s| !Self::is_neutral(s)).collect();
        let approved = counted
            .iter()
            .filter(|s| s.status == StepStatus::Approved)
            .count();
        let active = counted.iter().filter(|s| s.is_active()).count();

        if active == 0 {
            return GroupOutcome::Passed;
        }

        let method = steps
            .first()
            .map(|s| s.approval_method)
            .unwrap_or_default();
        let passed = match method {
            ApprovalMethod::Single => approved >= 1,
            ApprovalMethod::Majority => approved * 2 > counted.len(),
            ApprovalMethod::All => false,
        };

        if passed {
            GroupOutcome::Passed
        } else {
            GroupOutcome::Open
        }
    }

    fn is_failure(step: &StepInstance) -> bool {
        match step.status {
            StepStatus::Rejected => true,
            StepStatus::Timeout => step.is_mandatory,
            _ => false,
        }
    }

    fn is_neutral(step: &StepInstance) -> bool {
        match step.status {
            StepStatus::Skipped => true,
            StepStatus::Timeout => !step.is_mandatory,
            _ => false,
        }
    }
}
