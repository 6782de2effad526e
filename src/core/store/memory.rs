//! In-memory store guarded by one mutex

use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};

use crate::core::error::{ApprovalError, Result};
use crate::core::identity::{EntityId, TenantId};
use crate::entities::delegation::Delegation;
use crate::entities::instance::{Instance, InstanceStatus};
use crate::entities::line::ApprovalLine;
use crate::entities::template::Template;

use super::ApprovalStore;

#[derive(Debug, Default)]
struct State {
    instances: Vec<Instance>,
    templates: Vec<Template>,
    lines: Vec<ApprovalLine>,
    delegations: Vec<Delegation>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn same_document(a: &Instance, tenant: &TenantId, document_type: &str, document_id: &str) -> bool {
    &a.tenant == tenant
        && a.document.document_type == document_type
        && a.document.document_id == document_id
}

impl ApprovalStore for MemoryStore {
    fn insert_instance(&self, instance: &Instance) -> Result<()> {
        let mut state = self.state();
        let doc = &instance.document;
        if let Some(existing) = state
            .instances
            .iter()
            .find(|i| same_document(i, &instance.tenant, &doc.document_type, &doc.document_id))
        {
            return Err(ApprovalError::DuplicateInstance {
                document_type: doc.document_type.clone(),
                document_id: doc.document_id.clone(),
                existing: existing.id,
            });
        }
        let mut stored = instance.clone();
        stored.version = 0;
        state.instances.push(stored);
        Ok(())
    }

    fn load_instance(&self, tenant: &TenantId, id: &EntityId) -> Result<Instance> {
        self.state()
            .instances
            .iter()
            .find(|i| &i.tenant == tenant && &i.id == id)
            .cloned()
            .ok_or_else(|| ApprovalError::InstanceNotFound(id.to_string()))
    }

    fn find_instance(
        &self,
        tenant: &TenantId,
        document_type: &str,
        document_id: &str,
    ) -> Result<Option<Instance>> {
        Ok(self
            .state()
            .instances
            .iter()
            .find(|i| same_document(i, tenant, document_type, document_id))
            .cloned())
    }

    fn commit_instance(&self, instance: &Instance, expected_version: u64) -> Result<u64> {
        let mut state = self.state();
        let stored = state
            .instances
            .iter_mut()
            .find(|i| i.tenant == instance.tenant && i.id == instance.id)
            .ok_or_else(|| ApprovalError::InstanceNotFound(instance.id.to_string()))?;
        if stored.version != expected_version {
            return Err(ApprovalError::ConcurrentModification { id: instance.id });
        }
        let version = expected_version + 1;
        *stored = instance.clone();
        stored.version = version;
        Ok(version)
    }

    fn list_instances(&self, tenant: &TenantId) -> Result<Vec<Instance>> {
        let mut list: Vec<Instance> = self
            .state()
            .instances
            .iter()
            .filter(|i| &i.tenant == tenant)
            .cloned()
            .collect();
        list.sort_by_key(|i| i.created_at);
        Ok(list)
    }

    fn active_instances(&self, tenant: &TenantId) -> Result<Vec<Instance>> {
        Ok(self
            .list_instances(tenant)?
            .into_iter()
            .filter(|i| i.status == InstanceStatus::InProgress)
            .collect())
    }

    fn overdue_instances(&self, tenant: &TenantId, now: DateTime<Utc>) -> Result<Vec<EntityId>> {
        Ok(self
            .active_instances(tenant)?
            .iter()
            .filter(|i| i.steps.iter().any(|s| s.is_overdue(now)))
            .map(|i| i.id)
            .collect())
    }

    fn save_template(&self, template: &Template) -> Result<()> {
        let mut state = self.state();
        state
            .templates
            .retain(|t| !(t.tenant == template.tenant && t.code == template.code));
        state.templates.push(template.clone());
        Ok(())
    }

    fn templates(&self, tenant: &TenantId) -> Result<Vec<Template>> {
        let mut list: Vec<Template> = self
            .state()
            .templates
            .iter()
            .filter(|t| &t.tenant == tenant)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(list)
    }

    fn save_line(&self, line: &ApprovalLine) -> Result<()> {
        let mut state = self.state();
        state
            .lines
            .retain(|l| !(l.tenant == line.tenant && l.code == line.code));
        state.lines.push(line.clone());
        Ok(())
    }

    fn lines(&self, tenant: &TenantId) -> Result<Vec<ApprovalLine>> {
        let mut list: Vec<ApprovalLine> = self
            .state()
            .lines
            .iter()
            .filter(|l| &l.tenant == tenant)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(list)
    }

    fn save_delegation(&self, delegation: &Delegation) -> Result<()> {
        let mut state = self.state();
        state.delegations.retain(|d| d.id != delegation.id);
        state.delegations.push(delegation.clone());
        Ok(())
    }

    fn delegations(&self, tenant: &TenantId) -> Result<Vec<Delegation>> {
        let mut list: Vec<Delegation> = self
            .state()
            .delegations
            .iter()
            .filter(|d| &d.tenant == tenant)
            .cloned()
            .collect();
        list.sort_by_key(|d| d.created);
        Ok(list)
    }

    fn deactivate_delegation(&self, tenant: &TenantId, id: &EntityId) -> Result<()> {
        let mut state = self.state();
        let delegation = state
            .delegations
            .iter_mut()
            .find(|d| &d.tenant == tenant && &d.id == id)
            .ok_or_else(|| ApprovalError::DelegationNotFound(id.to_string()))?;
        delegation.is_active = false;
        Ok(())
    }
}
