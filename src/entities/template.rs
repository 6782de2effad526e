//! Approval template entity - reusable approval chain for a document type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::error::ApprovalError;
use crate::core::identity::{EntityId, EntityPrefix, TenantId};

/// How the steps of a template are arranged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum ApprovalType {
    /// One step after another
    #[default]
    Sequential,
    /// Every step at once, as a single group
    Parallel,
    /// Sequential stages, some of which are parallel groups
    Hybrid,
}

impl std::fmt::Display for ApprovalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalType::Sequential => write!(f, "sequential"),
            ApprovalType::Parallel => write!(f, "parallel"),
            ApprovalType::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Kind of work a step asks of its approver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum StepType {
    #[default]
    Approval,
    Review,
    /// Informational only, never blocks
    Notification,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepType::Approval => write!(f, "approval"),
            StepType::Review => write!(f, "review"),
            StepType::Notification => write!(f, "notification"),
        }
    }
}

/// How the approver of a step is identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApproverType {
    Role,
    Position,
    Department,
    User,
}

impl std::fmt::Display for ApproverType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApproverType::Role => write!(f, "role"),
            ApproverType::Position => write!(f, "position"),
            ApproverType::Department => write!(f, "department"),
            ApproverType::User => write!(f, "user"),
        }
    }
}

/// Completion rule of a parallel group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum ApprovalMethod {
    /// At least one approval
    #[default]
    Single,
    /// Every counted member approves
    All,
    /// Strictly more than half of the counted members approve
    Majority,
}

impl std::fmt::Display for ApprovalMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalMethod::Single => write!(f, "single"),
            ApprovalMethod::All => write!(f, "all"),
            ApprovalMethod::Majority => write!(f, "majority"),
        }
    }
}

/// A step definition within a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    /// Position in the chain, unique per template
    pub step_order: u32,

    /// Display name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default)]
    pub step_type: StepType,

    pub approver_type: ApproverType,

    /// Role, position, department or username, depending on `approver_type`.
    /// Empty for DEPARTMENT means the requester's department.
    #[serde(default)]
    pub approver: String,

    #[serde(default = "default_true")]
    pub is_mandatory: bool,

    #[serde(default)]
    pub is_critical: bool,

    #[serde(default)]
    pub approval_method: ApprovalMethod,

    /// Steps sharing a group number activate and resolve together
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_hours: Option<u32>,

    #[serde(default)]
    pub auto_approve_on_timeout: bool,

    #[serde(default = "default_true")]
    pub allow_delegation: bool,

    #[serde(default)]
    pub allow_skip: bool,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    100
}

fn default_revision() -> u32 {
    1
}

fn new_template_id() -> EntityId {
    EntityId::new(EntityPrefix::Tpl)
}

impl StepDef {
    /// Create a mandatory single-approver step
    pub fn new(step_order: u32, approver_type: ApproverType, approver: impl Into<String>) -> Self {
        Self {
            step_order,
            name: String::new(),
            step_type: StepType::Approval,
            approver_type,
            approver: approver.into(),
            is_mandatory: true,
            is_critical: false,
            approval_method: ApprovalMethod::Single,
            parallel_group: None,
            timeout_hours: None,
            auto_approve_on_timeout: false,
            allow_delegation: true,
            allow_skip: false,
        }
    }

    pub fn in_group(mut self, group: u32, method: ApprovalMethod) -> Self {
        self.parallel_group = Some(group);
        self.approval_method = method;
        self
    }

    pub fn with_timeout(mut self, hours: u32, auto_approve: bool) -> Self {
        self.timeout_hours = Some(hours);
        self.auto_approve_on_timeout = auto_approve;
        self
    }

    pub fn with_step_type(mut self, step_type: StepType) -> Self {
        self.step_type = step_type;
        self
    }

    pub fn skippable(mut self) -> Self {
        self.allow_skip = true;
        self
    }
}

/// An approval template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    #[serde(default = "new_template_id")]
    pub id: EntityId,

    pub tenant: TenantId,

    /// Unique code per tenant, referenced by approval lines
    pub code: String,

    pub name: String,

    /// Document type this template applies to (e.g. "purchase_order")
    pub document_type: String,

    #[serde(default)]
    pub approval_type: ApprovalType,

    /// Documents with an amount strictly below this are approved outright
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_approve_amount: Option<f64>,

    #[serde(default)]
    pub skip_if_same_person: bool,

    /// Restrict to requests from one department
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Lower wins during template selection
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default)]
    pub is_default: bool,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default)]
    pub steps: Vec<StepDef>,

    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,

    #[serde(default)]
    pub author: String,

    /// Bumped on every edit; instances remember the revision they snapshot
    #[serde(default = "default_revision")]
    pub revision: u32,
}

impl Template {
    pub fn new(
        tenant: TenantId,
        code: impl Into<String>,
        name: impl Into<String>,
        document_type: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: new_template_id(),
            tenant,
            code: code.into(),
            name: name.into(),
            document_type: document_type.into(),
            approval_type: ApprovalType::Sequential,
            auto_approve_amount: None,
            skip_if_same_person: false,
            department: None,
            priority: default_priority(),
            is_default: false,
            is_active: true,
            steps: Vec::new(),
            created: Utc::now(),
            author: author.into(),
            revision: 1,
        }
    }

    pub fn with_approval_type(mut self, approval_type: ApprovalType) -> Self {
        self.approval_type = approval_type;
        self
    }

    pub fn with_step(mut self, step: StepDef) -> Self {
        self.steps.push(step);
        self
    }

    /// Steps sorted by step_order
    pub fn ordered_steps(&self) -> Vec<&StepDef> {
        let mut steps: Vec<&StepDef> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.step_order);
        steps
    }

    /// Stage number for each step, in step order.
    ///
    /// A stage is a maximal run of consecutive steps sharing a parallel group;
    /// its number is the lowest step_order inside it.
    pub fn stage_plan(&self) -> Vec<(u32, u32)> {
        let steps = self.ordered_steps();
        let mut plan = Vec::with_capacity(steps.len());

        if self.approval_type == ApprovalType::Parallel {
            let stage = steps.first().map(|s| s.step_order).unwrap_or(0);
            for step in steps {
                plan.push((step.step_order, stage));
            }
            return plan;
        }

        let mut current: Option<(Option<u32>, u32)> = None;
        for step in steps {
            let stage = match (current, step.parallel_group) {
                (Some((Some(group), stage)), Some(g)) if group == g => stage,
                _ => step.step_order,
            };
            current = Some((step.parallel_group, stage));
            plan.push((step.step_order, stage));
        }
        plan
    }

    /// Check the authoring rules. Run once on import/save, not per transition.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        let invalid = |reason: String| ApprovalError::InvalidTemplate {
            code: self.code.clone(),
            reason,
        };

        if self.code.trim().is_empty() {
            return Err(invalid("template code is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(invalid("template has no steps".to_string()));
        }
        if let Some(amount) = self.auto_approve_amount {
            if !amount.is_finite() || amount < 0.0 {
                return Err(invalid(format!("auto_approve_amount {} is not a valid amount", amount)));
            }
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.step_order) {
                return Err(invalid(format!("duplicate step_order {}", step.step_order)));
            }
            if step.approver.trim().is_empty() && step.approver_type != ApproverType::Department {
                return Err(invalid(format!(
                    "step {} has no {} identifier",
                    step.step_order, step.approver_type
                )));
            }
            if step.auto_approve_on_timeout && step.timeout_hours.is_none() {
                return Err(invalid(format!(
                    "step {} auto-approves on timeout but has no timeout_hours",
                    step.step_order
                )));
            }
            if step.timeout_hours == Some(0) {
                return Err(invalid(format!("step {} has a zero timeout", step.step_order)));
            }
            if self.approval_type == ApprovalType::Sequential && step.parallel_group.is_some() {
                return Err(invalid(format!(
                    "step {} uses a parallel group in a sequential template",
                    step.step_order
                )));
            }
        }

        // A group may not reappear once a different stage has started
        let mut closed_groups: HashSet<u32> = HashSet::new();
        let mut open: Option<(u32, ApprovalMethod)> = None;
        for step in self.ordered_steps() {
            match (open, step.parallel_group) {
                (Some((group, method)), Some(g)) if group == g => {
                    if method != step.approval_method {
                        return Err(invalid(format!(
                            "parallel group {} mixes approval methods {} and {}",
                            g, method, step.approval_method
                        )));
                    }
                }
                (_, next) => {
                    if let Some((group, _)) = open {
                        closed_groups.insert(group);
                    }
                    if let Some(g) = next {
                        if closed_groups.contains(&g) {
                            return Err(invalid(format!(
                                "parallel group {} is split by other steps",
                                g
                            )));
                        }
                        open = Some((g, step.approval_method));
                    } else {
                        open = None;
                    }
                }
            }
        }

        if self.approval_type == ApprovalType::Parallel {
            let methods: HashSet<ApprovalMethod> =
                self.steps.iter().map(|s| s.approval_method).collect();
            if methods.len() > 1 {
                return Err(invalid("parallel template mixes approval methods".to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(approval_type: ApprovalType) -> Template {
        Template::new(TenantId::new("acme"), "PO-STD", "Standard PO", "purchase_order", "test")
            .with_approval_type(approval_type)
    }

    #[test]
    fn test_step_def_yaml_defaults() {
        let yaml = "step_order: 1\napprover_type: role\napprover: quality\n";
        let step: StepDef = serde_yml::from_str(yaml).unwrap();
        assert!(step.is_mandatory);
        assert!(step.allow_delegation);
        assert!(!step.allow_skip);
        assert_eq!(step.approval_method, ApprovalMethod::Single);
        assert_eq!(step.step_type, StepType::Approval);
    }

    #[test]
    fn test_validate_requires_steps() {
        let err = template(ApprovalType::Sequential).validate().unwrap_err();
        assert!(err.to_string().contains("no steps"));
    }

    #[test]
    fn test_validate_rejects_duplicate_order() {
        let t = template(ApprovalType::Sequential)
            .with_step(StepDef::new(1, ApproverType::User, "a"))
            .with_step(StepDef::new(1, ApproverType::User, "b"));
        assert!(t.validate().unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_rejects_group_in_sequential() {
        let t = template(ApprovalType::Sequential)
            .with_step(StepDef::new(1, ApproverType::User, "a").in_group(1, ApprovalMethod::All));
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_split_group() {
        let t = template(ApprovalType::Hybrid)
            .with_step(StepDef::new(1, ApproverType::User, "a").in_group(1, ApprovalMethod::All))
            .with_step(StepDef::new(2, ApproverType::User, "b"))
            .with_step(StepDef::new(3, ApproverType::User, "c").in_group(1, ApprovalMethod::All));
        assert!(t.validate().unwrap_err().to_string().contains("split"));
    }

    #[test]
    fn test_validate_rejects_mixed_methods_in_group() {
        let t = template(ApprovalType::Hybrid)
            .with_step(StepDef::new(1, ApproverType::User, "a").in_group(1, ApprovalMethod::All))
            .with_step(StepDef::new(2, ApproverType::User, "b").in_group(1, ApprovalMethod::Majority));
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_validate_timeout_rules() {
        let mut step = StepDef::new(1, ApproverType::User, "a");
        step.auto_approve_on_timeout = true;
        let t = template(ApprovalType::Sequential).with_step(step);
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_validate_department_may_be_blank() {
        let t = template(ApprovalType::Sequential)
            .with_step(StepDef::new(1, ApproverType::Department, ""));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_stage_plan_hybrid() {
        let t = template(ApprovalType::Hybrid)
            .with_step(StepDef::new(10, ApproverType::User, "a"))
            .with_step(StepDef::new(20, ApproverType::User, "b").in_group(1, ApprovalMethod::Majority))
            .with_step(StepDef::new(30, ApproverType::User, "c").in_group(1, ApprovalMethod::Majority))
            .with_step(StepDef::new(40, ApproverType::User, "d").in_group(2, ApprovalMethod::All))
            .with_step(StepDef::new(50, ApproverType::User, "e"));
        assert_eq!(
            t.stage_plan(),
            vec![(10, 10), (20, 20), (30, 20), (40, 40), (50, 50)]
        );
    }

    #[test]
    fn test_stage_plan_parallel_is_one_stage() {
        let t = template(ApprovalType::Parallel)
            .with_step(StepDef::new(2, ApproverType::User, "b"))
            .with_step(StepDef::new(1, ApproverType::User, "a"));
        assert_eq!(t.stage_plan(), vec![(1, 1), (2, 1)]);
    }
}
