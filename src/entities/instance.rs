//! Approval instance entity - one document's journey through its chain
//!
//! Step instances are snapshot copies of the template's step definitions taken
//! at creation time. Later template edits never reach a running instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::{EntityId, EntityPrefix, TenantId, UserId};
use crate::entities::template::{ApprovalMethod, ApproverType, StepDef, StepType};

/// Instance-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum InstanceStatus {
    #[default]
    Pending,
    InProgress,
    Approved,
    Rejected,
    Cancelled,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Approved | InstanceStatus::Rejected | InstanceStatus::Cancelled
        )
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Pending => write!(f, "pending"),
            InstanceStatus::InProgress => write!(f, "in_progress"),
            InstanceStatus::Approved => write!(f, "approved"),
            InstanceStatus::Rejected => write!(f, "rejected"),
            InstanceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(InstanceStatus::Pending),
            "in_progress" => Ok(InstanceStatus::InProgress),
            "approved" => Ok(InstanceStatus::Approved),
            "rejected" => Ok(InstanceStatus::Rejected),
            "cancelled" => Ok(InstanceStatus::Cancelled),
            _ => Err(format!("Unknown instance status: {}", s)),
        }
    }
}

/// Step-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Approved,
    Rejected,
    Skipped,
    Timeout,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::InProgress)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in_progress"),
            StepStatus::Approved => write!(f, "approved"),
            StepStatus::Rejected => write!(f, "rejected"),
            StepStatus::Skipped => write!(f, "skipped"),
            StepStatus::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(StepStatus::Pending),
            "in_progress" => Ok(StepStatus::InProgress),
            "approved" => Ok(StepStatus::Approved),
            "rejected" => Ok(StepStatus::Rejected),
            "skipped" => Ok(StepStatus::Skipped),
            "timeout" => Ok(StepStatus::Timeout),
            _ => Err(format!("Unknown step status: {}", s)),
        }
    }
}

/// The document under approval, as supplied by its producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_type: String,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

/// Runtime copy of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepInstance {
    pub step_order: u32,

    /// Lowest step_order of the stage this step activates with
    pub stage: u32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    pub step_type: StepType,
    pub approver_type: ApproverType,
    pub approver_spec: String,
    pub is_mandatory: bool,
    pub is_critical: bool,
    pub approval_method: ApprovalMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_hours: Option<u32>,
    pub auto_approve_on_timeout: bool,
    pub allow_delegation: bool,
    pub allow_skip: bool,

    #[serde(default)]
    pub status: StepStatus,

    /// Nominal approver, kept for audit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<UserId>,

    /// Actual approver when the nominal one delegated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_to: Option<UserId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<UserId>,

    /// Approval comment, rejection or skip reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl StepInstance {
    /// Snapshot a step definition into a fresh pending step
    pub fn snapshot(def: &StepDef, stage: u32) -> Self {
        Self {
            step_order: def.step_order,
            stage,
            name: def.name.clone(),
            step_type: def.step_type,
            approver_type: def.approver_type,
            approver_spec: def.approver.clone(),
            is_mandatory: def.is_mandatory,
            is_critical: def.is_critical,
            approval_method: def.approval_method,
            parallel_group: def.parallel_group,
            timeout_hours: def.timeout_hours,
            auto_approve_on_timeout: def.auto_approve_on_timeout,
            allow_delegation: def.allow_delegation,
            allow_skip: def.allow_skip,
            status: StepStatus::Pending,
            approver_id: None,
            delegated_to: None,
            assigned_at: None,
            due_at: None,
            decided_at: None,
            decided_by: None,
            comment: None,
        }
    }

    /// Whoever must act on the step: the delegate if any, else the nominal approver
    pub fn actual_approver(&self) -> Option<&UserId> {
        self.delegated_to.as_ref().or(self.approver_id.as_ref())
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, StepStatus::Pending | StepStatus::InProgress)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == StepStatus::InProgress && self.due_at.is_some_and(|due| due < now)
    }

    pub fn label(&self) -> String {
        format!("step {}", self.step_order)
    }
}

/// Kind of history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Requested,
    AutoApproved,
    Started,
    Assigned,
    /// No concrete approver could be found; the step waits for an admin
    ApproverUnresolved,
    StepApproved,
    StepRejected,
    StepSkipped,
    StepTimedOut,
    Approved,
    Rejected,
    Cancelled,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventAction::Requested => "requested",
            EventAction::AutoApproved => "auto_approved",
            EventAction::Started => "started",
            EventAction::Assigned => "assigned",
            EventAction::ApproverUnresolved => "approver_unresolved",
            EventAction::StepApproved => "step_approved",
            EventAction::StepRejected => "step_rejected",
            EventAction::StepSkipped => "step_skipped",
            EventAction::StepTimedOut => "step_timed_out",
            EventAction::Approved => "approved",
            EventAction::Rejected => "rejected",
            EventAction::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Audit trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalEvent {
    pub at: DateTime<Utc>,
    pub action: EventAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<UserId>,
    /// Nominal approver when the actor acted as delegate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_behalf_of: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ApprovalEvent {
    pub fn new(at: DateTime<Utc>, action: EventAction) -> Self {
        Self {
            at,
            action,
            step_order: None,
            actor: None,
            on_behalf_of: None,
            comment: None,
        }
    }

    pub fn step(mut self, step_order: u32) -> Self {
        self.step_order = Some(step_order);
        self
    }

    pub fn by(mut self, actor: &UserId) -> Self {
        self.actor = Some(actor.clone());
        self
    }

    pub fn on_behalf_of(mut self, nominal: Option<&UserId>) -> Self {
        self.on_behalf_of = nominal.cloned();
        self
    }

    pub fn comment(mut self, comment: Option<&str>) -> Self {
        self.comment = comment.map(|c| c.to_string());
        self
    }
}

/// An approval instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: EntityId,
    pub tenant: TenantId,

    pub template_code: String,
    pub template_revision: u32,

    pub document: DocumentRef,

    pub requester_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_department: Option<String>,

    #[serde(default)]
    pub status: InstanceStatus,

    /// Stage number currently active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_order: Option<u32>,

    /// Snapshot of the template flag
    #[serde(default)]
    pub skip_if_same_person: bool,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_approver: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<UserId>,

    /// Optimistic concurrency token, bumped by every commit
    #[serde(default)]
    pub version: u64,

    pub steps: Vec<StepInstance>,

    #[serde(default)]
    pub history: Vec<ApprovalEvent>,
}

impl Instance {
    pub fn new(
        tenant: TenantId,
        template_code: impl Into<String>,
        template_revision: u32,
        document: DocumentRef,
        requester_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Inst),
            tenant,
            template_code: template_code.into(),
            template_revision,
            document,
            requester_id,
            requester_department: None,
            status: InstanceStatus::Pending,
            current_step_order: None,
            skip_if_same_person: false,
            created_at,
            completed_at: None,
            final_approver: None,
            cancelled_by: None,
            version: 0,
            steps: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn step(&self, step_order: u32) -> Option<&StepInstance> {
        self.steps.iter().find(|s| s.step_order == step_order)
    }

    pub fn step_mut(&mut self, step_order: u32) -> Option<&mut StepInstance> {
        self.steps.iter_mut().find(|s| s.step_order == step_order)
    }

    /// Distinct stage numbers in activation order
    pub fn stages(&self) -> Vec<u32> {
        let mut stages: Vec<u32> = self.steps.iter().map(|s| s.stage).collect();
        stages.sort_unstable();
        stages.dedup();
        stages
    }

    pub fn stage_steps(&self, stage: u32) -> impl Iterator<Item = &StepInstance> {
        self.steps.iter().filter(move |s| s.stage == stage)
    }

    pub fn step_orders(&self) -> Vec<u32> {
        self.steps.iter().map(|s| s.step_order).collect()
    }

    /// Share of steps in a terminal state, 0-100
    pub fn progress_percentage(&self) -> f64 {
        if self.steps.is_empty() {
            return if self.status == InstanceStatus::Approved {
                100.0
            } else {
                0.0
            };
        }
        let done = self.steps.iter().filter(|s| s.status.is_terminal()).count();
        done as f64 / self.steps.len() as f64 * 100.0
    }

    pub fn record(&mut self, event: ApprovalEvent) {
        self.history.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::template::StepDef;

    fn doc() -> DocumentRef {
        DocumentRef {
            document_type: "purchase_order".to_string(),
            document_id: "PO-1001".to_string(),
            document_no: Some("PO-1001".to_string()),
            title: None,
            amount: Some(2500.0),
        }
    }

    #[test]
    fn test_status_parse_roundtrip_names() {
        for status in [
            InstanceStatus::Pending,
            InstanceStatus::InProgress,
            InstanceStatus::Approved,
            InstanceStatus::Rejected,
            InstanceStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<InstanceStatus>().unwrap(), status);
        }
        assert_eq!("timeout".parse::<StepStatus>().unwrap(), StepStatus::Timeout);
    }

    #[test]
    fn test_progress_percentage() {
        let mut inst = Instance::new(
            TenantId::new("acme"),
            "PO-STD",
            1,
            doc(),
            UserId::new("req"),
            Utc::now(),
        );
        for order in 1..=4 {
            inst.steps.push(StepInstance::snapshot(
                &StepDef::new(order, ApproverType::User, "a"),
                order,
            ));
        }
        assert_eq!(inst.progress_percentage(), 0.0);
        inst.steps[0].status = StepStatus::Approved;
        inst.steps[1].status = StepStatus::Skipped;
        assert_eq!(inst.progress_percentage(), 50.0);
    }

    #[test]
    fn test_actual_approver_prefers_delegate() {
        let mut step = StepInstance::snapshot(&StepDef::new(1, ApproverType::User, "d"), 1);
        step.approver_id = Some(UserId::new("d"));
        assert_eq!(step.actual_approver().unwrap().as_str(), "d");
        step.delegated_to = Some(UserId::new("e"));
        assert_eq!(step.actual_approver().unwrap().as_str(), "e");
    }
}
