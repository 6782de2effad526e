//! Approval service - the operations exposed to document producers and approvers
//!
//! Every state change follows the same path: load a snapshot, run the engine
//! on a private copy, commit with the loaded version, then hand the collected
//! notifications to the notifier. A lost race surfaces as
//! `ConcurrentModification` with nothing written.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::core::clock::Clock;
use crate::core::config::EngineConfig;
use crate::core::delegation::DelegationRegistry;
use crate::core::error::{ApprovalError, Result};
use crate::core::factory::{ApprovalRequest, InstanceFactory};
use crate::core::identity::{EntityId, TenantId, UserId};
use crate::core::instance::{parked_steps, InstanceEngine};
use crate::core::notify::{Notification, Notifier};
use crate::core::resolver::ApproverResolver;
use crate::core::store::ApprovalStore;
use crate::core::sweeper::{SweepReport, TimeoutSweeper};
use crate::core::team::Directory;
use crate::core::template_resolver::{TemplateQuery, TemplateResolver};
use crate::entities::delegation::{Delegation, DelegationType};
use crate::entities::instance::{
    ApprovalEvent, DocumentRef, EventAction, Instance, InstanceStatus, StepStatus,
};
use crate::entities::line::ApprovalLine;
use crate::entities::template::{ApproverType, Template};

/// Summary returned by `get_instance_status`
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatusReport {
    pub id: EntityId,
    pub template_code: String,
    pub document: DocumentRef,
    pub requester_id: UserId,
    pub status: InstanceStatus,
    pub current_step_order: Option<u32>,
    pub progress: f64,
    pub final_approver: Option<UserId>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub step_order: u32,
    pub name: String,
    pub status: StepStatus,
    pub approver: Option<UserId>,
    pub delegated_to: Option<UserId>,
    pub due_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

/// A step waiting on a user
#[derive(Debug, Clone, Serialize)]
pub struct PendingStep {
    pub instance_id: EntityId,
    pub document: DocumentRef,
    pub requester_id: UserId,
    pub step_order: u32,
    pub name: String,
    /// Nominal approver when the user acts as delegate
    pub on_behalf_of: Option<UserId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
}

/// A step parked because no approver could be resolved
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedStep {
    pub instance_id: EntityId,
    pub document: DocumentRef,
    pub requester_id: UserId,
    pub step_order: u32,
    pub name: String,
    pub approver_type: ApproverType,
    pub approver: String,
    pub reason: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl From<&Instance> for InstanceStatusReport {
    fn from(inst: &Instance) -> Self {
        Self {
            id: inst.id,
            template_code: inst.template_code.clone(),
            document: inst.document.clone(),
            requester_id: inst.requester_id.clone(),
            status: inst.status,
            current_step_order: inst.current_step_order,
            progress: inst.progress_percentage(),
            final_approver: inst.final_approver.clone(),
            completed_at: inst.completed_at,
            steps: inst
                .steps
                .iter()
                .map(|s| StepSummary {
                    step_order: s.step_order,
                    name: s.name.clone(),
                    status: s.status,
                    approver: s.approver_id.clone(),
                    delegated_to: s.delegated_to.clone(),
                    due_at: s.due_at,
                    comment: s.comment.clone(),
                })
                .collect(),
        }
    }
}

pub struct ApprovalService {
    store: Arc<dyn ApprovalStore>,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn ApprovalStore>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            clock,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &dyn ApprovalStore {
        self.store.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // =====================================================================
    // Requests
    // =====================================================================

    /// Resolve the template, create the instance and, unless disabled, start it
    pub fn request_approval(&self, request: &ApprovalRequest) -> Result<Instance> {
        let instance = self.create_instance(request)?;
        if self.config.auto_start && instance.status == InstanceStatus::Pending {
            return self.start_approval(&request.tenant, &instance.id, &request.requester_id);
        }
        Ok(instance)
    }

    /// Resolve the template and create the instance without starting it
    pub fn create_instance(&self, request: &ApprovalRequest) -> Result<Instance> {
        let templates = self.store.templates(&request.tenant)?;
        let lines = self.store.lines(&request.tenant)?;
        let resolver = TemplateResolver::new(&templates, &lines);
        let selection = resolver.resolve(&TemplateQuery {
            tenant: &request.tenant,
            document_type: &request.document.document_type,
            amount: request.document.amount,
            department: request.requester_department.as_deref(),
        })?;
        InstanceFactory::new(self.store.as_ref()).create(selection.template, request, self.now())
    }

    // =====================================================================
    // Transitions
    // =====================================================================

    pub fn start_approval(&self, tenant: &TenantId, id: &EntityId, actor: &UserId) -> Result<Instance> {
        self.apply(tenant, id, |engine, inst, now| engine.start_approval(inst, actor, now))
    }

    pub fn approve_step(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        step_order: u32,
        actor: &UserId,
        comment: Option<&str>,
    ) -> Result<Instance> {
        self.apply(tenant, id, |engine, inst, now| {
            engine.approve_step(inst, step_order, actor, comment, now)
        })
    }

    pub fn reject_step(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        step_order: u32,
        actor: &UserId,
        reason: &str,
    ) -> Result<Instance> {
        self.apply(tenant, id, |engine, inst, now| {
            engine.reject_step(inst, step_order, actor, reason, now)
        })
    }

    pub fn skip_step(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        step_order: u32,
        actor: &UserId,
        reason: &str,
    ) -> Result<Instance> {
        self.apply(tenant, id, |engine, inst, now| {
            engine.skip_step(inst, step_order, actor, reason, now)
        })
    }

    pub fn cancel_instance(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        actor: &UserId,
        reason: Option<&str>,
    ) -> Result<Instance> {
        self.apply(tenant, id, |engine, inst, now| engine.cancel(inst, actor, reason, now))
    }

    /// Re-resolve the parked steps of an instance once the directory is fixed
    pub fn retry_unresolved(&self, tenant: &TenantId, id: &EntityId, actor: &UserId) -> Result<Instance> {
        self.apply(tenant, id, |engine, inst, now| engine.retry_unresolved(inst, actor, now))
    }

    /// Expire overdue steps of every running instance of the tenant
    pub fn sweep(&self, tenant: &TenantId) -> SweepReport {
        TimeoutSweeper::new(self).sweep(tenant, self.now())
    }

    fn apply<F>(&self, tenant: &TenantId, id: &EntityId, f: F) -> Result<Instance>
    where
        F: FnOnce(&InstanceEngine<'_>, &mut Instance, DateTime<Utc>) -> Result<Vec<Notification>>,
    {
        self.transition(tenant, id, |engine, inst, now| Ok(((), f(engine, inst, now)?)))
            .map(|(inst, _)| inst)
    }

    /// Load, mutate a copy, commit against the loaded version, then notify.
    ///
    /// An unchanged copy is not committed.
    pub(crate) fn transition<T, F>(
        &self,
        tenant: &TenantId,
        id: &EntityId,
        f: F,
    ) -> Result<(Instance, T)>
    where
        F: FnOnce(&InstanceEngine<'_>, &mut Instance, DateTime<Utc>) -> Result<(T, Vec<Notification>)>,
    {
        let current = self.store.load_instance(tenant, id)?;
        let registry = self.delegation_registry(tenant)?;
        let engine = InstanceEngine::new(ApproverResolver::new(self.directory.as_ref(), &registry));

        let mut next = current.clone();
        let now = self.now();
        let (value, notifications) = f(&engine, &mut next, now)?;
        if next == current {
            return Ok((current, value));
        }

        next.version = self.store.commit_instance(&next, current.version)?;
        debug!(
            instance = %next.id,
            version = next.version,
            status = %next.status,
            notifications = notifications.len(),
            "transition committed"
        );
        for notification in &notifications {
            self.notifier.notify(notification);
        }
        Ok((next, value))
    }

    // =====================================================================
    // Queries
    // =====================================================================

    pub fn get_instance(&self, tenant: &TenantId, id: &EntityId) -> Result<Instance> {
        self.store.load_instance(tenant, id)
    }

    pub fn get_instance_status(&self, tenant: &TenantId, id: &EntityId) -> Result<InstanceStatusReport> {
        Ok(InstanceStatusReport::from(&self.store.load_instance(tenant, id)?))
    }

    pub fn get_instance_history(&self, tenant: &TenantId, id: &EntityId) -> Result<Vec<ApprovalEvent>> {
        Ok(self.store.load_instance(tenant, id)?.history)
    }

    pub fn find_instance_for_document(
        &self,
        tenant: &TenantId,
        document_type: &str,
        document_id: &str,
    ) -> Result<Option<Instance>> {
        self.store.find_instance(tenant, document_type, document_id)
    }

    pub fn list_instances(&self, tenant: &TenantId) -> Result<Vec<Instance>> {
        self.store.list_instances(tenant)
    }

    /// IN_PROGRESS steps whose actual approver is `user`.
    ///
    /// Delegation was resolved when each step started, so a delegate sees the
    /// step and the nominal approver who delegated does not.
    pub fn get_pending_steps_for_user(&self, tenant: &TenantId, user: &UserId) -> Result<Vec<PendingStep>> {
        let mut pending = Vec::new();
        for inst in self.store.active_instances(tenant)? {
            for step in &inst.steps {
                if step.status != StepStatus::InProgress || step.actual_approver() != Some(user) {
                    continue;
                }
                pending.push(PendingStep {
                    instance_id: inst.id,
                    document: inst.document.clone(),
                    requester_id: inst.requester_id.clone(),
                    step_order: step.step_order,
                    name: step.name.clone(),
                    on_behalf_of: step.delegated_to.as_ref().and(step.approver_id.clone()),
                    assigned_at: step.assigned_at,
                    due_at: step.due_at,
                });
            }
        }
        pending.sort_by_key(|p| (p.due_at.is_none(), p.due_at, p.assigned_at));
        Ok(pending)
    }

    /// The admin queue: every parked step of the tenant, oldest first
    pub fn get_unresolved_steps(&self, tenant: &TenantId) -> Result<Vec<UnresolvedStep>> {
        let mut queue = Vec::new();
        for inst in self.store.active_instances(tenant)? {
            for step_order in parked_steps(&inst) {
                let Some(step) = inst.step(step_order) else {
                    continue;
                };
                let event = inst.history.iter().rev().find(|e| {
                    e.action == EventAction::ApproverUnresolved && e.step_order == Some(step_order)
                });
                queue.push(UnresolvedStep {
                    instance_id: inst.id,
                    document: inst.document.clone(),
                    requester_id: inst.requester_id.clone(),
                    step_order,
                    name: step.name.clone(),
                    approver_type: step.approver_type,
                    approver: step.approver_spec.clone(),
                    reason: event.and_then(|e| e.comment.clone()),
                    since: event.map(|e| e.at),
                });
            }
        }
        queue.sort_by_key(|u| (u.since, u.step_order));
        Ok(queue)
    }

    // =====================================================================
    // Authoring
    // =====================================================================

    /// Validate and store a template, bumping the revision of a replaced one
    pub fn save_template(&self, template: &Template) -> Result<Template> {
        template.validate()?;
        let mut stored = template.clone();
        if let Some(previous) = self
            .store
            .templates(&template.tenant)?
            .into_iter()
            .find(|t| t.code == template.code)
        {
            stored.id = previous.id;
            stored.created = previous.created;
            stored.revision = previous.revision.max(template.revision) + 1;
        }
        self.store.save_template(&stored)?;
        Ok(stored)
    }

    pub fn templates(&self, tenant: &TenantId) -> Result<Vec<Template>> {
        self.store.templates(tenant)
    }

    pub fn save_line(&self, line: &ApprovalLine) -> Result<()> {
        if line.code.trim().is_empty() {
            return Err(ApprovalError::InvalidTemplate {
                code: line.template_code.clone(),
                reason: "approval line has no code".to_string(),
            });
        }
        self.store.save_line(line)
    }

    pub fn lines(&self, tenant: &TenantId) -> Result<Vec<ApprovalLine>> {
        self.store.lines(tenant)
    }

    // =====================================================================
    // Delegations
    // =====================================================================

    pub fn add_delegation(&self, delegation: &Delegation) -> Result<()> {
        validate_delegation(delegation)?;
        self.store.save_delegation(delegation)
    }

    pub fn revoke_delegation(&self, tenant: &TenantId, id: &EntityId) -> Result<()> {
        self.store.deactivate_delegation(tenant, id)
    }

    pub fn delegations(&self, tenant: &TenantId) -> Result<Vec<Delegation>> {
        self.store.delegations(tenant)
    }

    fn delegation_registry(&self, tenant: &TenantId) -> Result<DelegationRegistry> {
        Ok(DelegationRegistry::new(self.store.delegations(tenant)?))
    }

    /// Today's date on the service clock
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

fn validate_delegation(d: &Delegation) -> Result<()> {
    if d.delegator_id == d.delegate_id {
        return Err(ApprovalError::InvalidDelegation(format!(
            "{} cannot delegate to themselves",
            d.delegator_id
        )));
    }
    if d.start_date > d.end_date {
        return Err(ApprovalError::InvalidDelegation(format!(
            "start date {} is after end date {}",
            d.start_date, d.end_date
        )));
    }
    if d.delegation_type == DelegationType::Partial && d.document_types.is_empty() {
        return Err(ApprovalError::InvalidDelegation(
            "a partial delegation needs at least one document type".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::notify::{NotificationKind, RecordingNotifier};
    use crate::core::store::MemoryStore;
    use crate::core::team::{TeamMember, TeamRoster};
    use crate::entities::template::{ApproverType, StepDef};
    use chrono::TimeZone;

    struct Fixture {
        service: ApprovalService,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture() -> Fixture {
        let acme = TenantId::new("acme");
        let roster = TeamRoster::new(vec![
            TeamMember::new(acme.clone(), "boss").with_role("manager"),
            TeamMember::new(acme, "cfo").with_position("CFO"),
        ]);
        let notifier = Arc::new(RecordingNotifier::new());
        let service = ApprovalService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(roster),
            notifier.clone(),
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap())),
        );
        service
            .save_template(
                &Template::new(TenantId::new("acme"), "PO-STD", "PO", "purchase_order", "admin")
                    .with_step(StepDef::new(1, ApproverType::Role, "manager"))
                    .with_step(StepDef::new(2, ApproverType::Position, "CFO")),
            )
            .unwrap();
        Fixture { service, notifier }
    }

    fn request(document_id: &str) -> ApprovalRequest {
        ApprovalRequest::new(
            TenantId::new("acme"),
            DocumentRef {
                document_type: "purchase_order".to_string(),
                document_id: document_id.to_string(),
                document_no: None,
                title: None,
                amount: Some(2500.0),
            },
            UserId::new("req"),
        )
    }

    #[test]
    fn test_request_starts_and_notifies_after_commit() {
        let f = fixture();
        let inst = f.service.request_approval(&request("PO-1")).unwrap();
        assert_eq!(inst.status, InstanceStatus::InProgress);
        assert_eq!(inst.version, 1);

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NotificationKind::Assigned);
        assert_eq!(sent[0].recipient.as_str(), "boss");
    }

    #[test]
    fn test_failed_transition_sends_nothing() {
        let f = fixture();
        let tenant = TenantId::new("acme");
        let inst = f.service.request_approval(&request("PO-1")).unwrap();
        let before = f.notifier.sent().len();

        let err = f
            .service
            .approve_step(&tenant, &inst.id, 1, &UserId::new("cfo"), None)
            .unwrap_err();
        assert!(matches!(err, ApprovalError::InvalidTransition { .. }));
        assert_eq!(f.notifier.sent().len(), before);
        assert_eq!(f.service.get_instance(&tenant, &inst.id).unwrap().version, 1);
    }

    #[test]
    fn test_pending_and_status() {
        let f = fixture();
        let tenant = TenantId::new("acme");
        let inst = f.service.request_approval(&request("PO-1")).unwrap();

        let pending = f
            .service
            .get_pending_steps_for_user(&tenant, &UserId::new("boss"))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].step_order, 1);

        f.service
            .approve_step(&tenant, &inst.id, 1, &UserId::new("boss"), Some("fine"))
            .unwrap();
        let status = f.service.get_instance_status(&tenant, &inst.id).unwrap();
        assert_eq!(status.current_step_order, Some(2));
        assert_eq!(status.progress, 50.0);
        assert!(f
            .service
            .get_pending_steps_for_user(&tenant, &UserId::new("boss"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_save_template_bumps_revision() {
        let f = fixture();
        let replacement = Template::new(TenantId::new("acme"), "PO-STD", "PO v2", "purchase_order", "admin")
            .with_step(StepDef::new(1, ApproverType::Role, "manager"));
        let stored = f.service.save_template(&replacement).unwrap();
        assert_eq!(stored.revision, 2);
    }

    #[test]
    fn test_delegation_validation() {
        let f = fixture();
        let day = |d| NaiveDate::from_ymd_opt(2026, 1, d).unwrap();
        let backwards = Delegation::new(
            TenantId::new("acme"),
            UserId::new("boss"),
            UserId::new("cfo"),
            day(20),
            day(10),
        );
        assert!(matches!(
            f.service.add_delegation(&backwards),
            Err(ApprovalError::InvalidDelegation(_))
        ));
        let to_self = Delegation::new(
            TenantId::new("acme"),
            UserId::new("boss"),
            UserId::new("boss"),
            day(1),
            day(10),
        );
        assert!(f.service.add_delegation(&to_self).is_err());
    }
}
