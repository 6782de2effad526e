//! Instance factory - materializes a template into an approval instance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::error::ApprovalError;
use crate::core::identity::{TenantId, UserId};
use crate::core::store::ApprovalStore;
use crate::entities::instance::{
    ApprovalEvent, DocumentRef, EventAction, Instance, InstanceStatus, StepInstance, StepStatus,
};
use crate::entities::template::Template;

const AUTO_APPROVED: &str = "auto-approved by amount";

/// A document submitted for approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub tenant: TenantId,
    pub document: DocumentRef,
    pub requester_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_department: Option<String>,
}

impl ApprovalRequest {
    pub fn new(tenant: TenantId, document: DocumentRef, requester_id: UserId) -> Self {
        Self {
            tenant,
            document,
            requester_id,
            requester_department: None,
        }
    }

    pub fn from_department(mut self, department: impl Into<String>) -> Self {
        self.requester_department = Some(department.into());
        self
    }
}

/// Whether the request falls under the template's auto-approve threshold
pub fn qualifies_for_auto_approve(template: &Template, amount: Option<f64>) -> bool {
    match (template.auto_approve_amount, amount) {
        (Some(threshold), Some(amount)) => amount < threshold,
        _ => false,
    }
}

pub struct InstanceFactory<'a> {
    store: &'a dyn ApprovalStore,
}

impl<'a> InstanceFactory<'a> {
    pub fn new(store: &'a dyn ApprovalStore) -> Self {
        Self { store }
    }

    /// Build and persist the instance for a document.
    ///
    /// Fails with `DuplicateInstance` when the document already has one.
    pub fn create(
        &self,
        template: &Template,
        request: &ApprovalRequest,
        now: DateTime<Utc>,
    ) -> Result<Instance, ApprovalError> {
        if let Some(existing) = self.store.find_instance(
            &request.tenant,
            &request.document.document_type,
            &request.document.document_id,
        )? {
            return Err(ApprovalError::DuplicateInstance {
                document_type: request.document.document_type.clone(),
                document_id: request.document.document_id.clone(),
                existing: existing.id,
            });
        }

        let instance = Self::build(template, request, now)?;
        self.store.insert_instance(&instance)?;
        info!(
            instance = %instance.id,
            template = %template.code,
            document_type = %instance.document.document_type,
            document_id = %instance.document.document_id,
            status = %instance.status,
            "approval instance created"
        );
        Ok(instance)
    }

    /// Snapshot the template into a fresh instance without touching storage
    pub fn build(
        template: &Template,
        request: &ApprovalRequest,
        now: DateTime<Utc>,
    ) -> Result<Instance, ApprovalError> {
        template.validate()?;
        if template.tenant != request.tenant {
            return Err(ApprovalError::InvalidTemplate {
                code: template.code.clone(),
                reason: format!("belongs to tenant {}, not {}", template.tenant, request.tenant),
            });
        }

        let mut inst = Instance::new(
            request.tenant.clone(),
            template.code.clone(),
            template.revision,
            request.document.clone(),
            request.requester_id.clone(),
            now,
        );
        inst.requester_department = request.requester_department.clone();
        inst.skip_if_same_person = template.skip_if_same_person;

        let plan = template.stage_plan();
        for (def, (_, stage)) in template.ordered_steps().into_iter().zip(plan) {
            inst.steps.push(StepInstance::snapshot(def, stage));
        }
        inst.record(ApprovalEvent::new(now, EventAction::Requested).by(&request.requester_id));

        if qualifies_for_auto_approve(template, request.document.amount) {
            let system = UserId::system();
            for step in &mut inst.steps {
                step.status = StepStatus::Skipped;
                step.decided_at = Some(now);
                step.decided_by = Some(system.clone());
                step.comment = Some(AUTO_APPROVED.to_string());
            }
            inst.status = InstanceStatus::Approved;
            inst.completed_at = Some(now);
            inst.final_approver = Some(system.clone());
            inst.record(
                ApprovalEvent::new(now, EventAction::AutoApproved)
                    .by(&system)
                    .comment(Some(AUTO_APPROVED)),
            );
            debug!(
                template = %template.code,
                amount = ?request.document.amount,
                threshold = ?template.auto_approve_amount,
                "request auto-approved"
            );
        }

        Ok(inst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;
    use crate::entities::template::{ApprovalMethod, ApprovalType, ApproverType, StepDef};

    fn template() -> Template {
        let mut t = Template::new(TenantId::new("acme"), "PO-STD", "PO", "purchase_order", "admin")
            .with_approval_type(ApprovalType::Hybrid)
            .with_step(StepDef::new(10, ApproverType::Role, "manager"))
            .with_step(StepDef::new(20, ApproverType::User, "a").in_group(1, ApprovalMethod::All))
            .with_step(StepDef::new(30, ApproverType::User, "b").in_group(1, ApprovalMethod::All))
            .with_step(StepDef::new(40, ApproverType::Position, "CFO"));
        t.auto_approve_amount = Some(1000.0);
        t
    }

    fn request(amount: Option<f64>) -> ApprovalRequest {
        ApprovalRequest::new(
            TenantId::new("acme"),
            DocumentRef {
                document_type: "purchase_order".to_string(),
                document_id: "PO-7".to_string(),
                document_no: Some("PO-7".to_string()),
                title: Some("Valves".to_string()),
                amount,
            },
            UserId::new("req"),
        )
    }

    #[test]
    fn test_build_snapshots_steps_and_stages() {
        let inst = InstanceFactory::build(&template(), &request(Some(5000.0)), Utc::now()).unwrap();
        assert_eq!(inst.status, InstanceStatus::Pending);
        assert_eq!(inst.step_orders(), vec![10, 20, 30, 40]);
        assert_eq!(inst.stages(), vec![10, 20, 40]);
        assert!(inst.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(inst.current_step_order.is_none());
    }

    #[test]
    fn test_below_threshold_is_approved_outright() {
        let inst = InstanceFactory::build(&template(), &request(Some(500.0)), Utc::now()).unwrap();
        assert_eq!(inst.status, InstanceStatus::Approved);
        assert_eq!(inst.step_orders(), vec![10, 20, 30, 40]);
        assert!(inst.steps.iter().all(|s| !s.is_active()));
        assert_eq!(inst.progress_percentage(), 100.0);
        assert_eq!(inst.history.last().unwrap().action, EventAction::AutoApproved);
    }

    #[test]
    fn test_threshold_is_exclusive_and_needs_amount() {
        let at = InstanceFactory::build(&template(), &request(Some(1000.0)), Utc::now()).unwrap();
        assert_eq!(at.status, InstanceStatus::Pending);
        let none = InstanceFactory::build(&template(), &request(None), Utc::now()).unwrap();
        assert_eq!(none.status, InstanceStatus::Pending);
    }

    #[test]
    fn test_invalid_template_is_refused() {
        let empty = Template::new(TenantId::new("acme"), "EMPTY", "Empty", "purchase_order", "admin");
        let err = InstanceFactory::build(&empty, &request(None), Utc::now()).unwrap_err();
        assert!(matches!(err, ApprovalError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_create_refuses_duplicates() {
        let store = MemoryStore::new();
        let factory = InstanceFactory::new(&store);
        let first = factory.create(&template(), &request(Some(5000.0)), Utc::now()).unwrap();
        let err = factory
            .create(&template(), &request(Some(5000.0)), Utc::now())
            .unwrap_err();
        match err {
            ApprovalError::DuplicateInstance { existing, .. } => assert_eq!(existing, first.id),
            other => panic!("unexpected error: {other}"),
        }
    }
}
