//! Persistence for templates, lines, delegations and instances
//!
//! Instance writes are optimistic: [`ApprovalStore::commit_instance`] only
//! succeeds when the stored version still equals the version the caller
//! loaded, and bumps it atomically.

mod memory;
mod serialize;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::core::error::Result;
use crate::core::identity::{EntityId, TenantId};
use crate::entities::delegation::Delegation;
use crate::entities::instance::Instance;
use crate::entities::line::ApprovalLine;
use crate::entities::template::Template;

pub trait ApprovalStore: Send + Sync {
    /// Insert a new instance. `(tenant, document_type, document_id)` is unique.
    fn insert_instance(&self, instance: &Instance) -> Result<()>;

    fn load_instance(&self, tenant: &TenantId, id: &EntityId) -> Result<Instance>;

    fn find_instance(
        &self,
        tenant: &TenantId,
        document_type: &str,
        document_id: &str,
    ) -> Result<Option<Instance>>;

    /// Write `instance` if the stored version is `expected_version`.
    /// Returns the new version; a mismatch is `ConcurrentModification`.
    fn commit_instance(&self, instance: &Instance, expected_version: u64) -> Result<u64>;

    /// All instances of a tenant, oldest first
    fn list_instances(&self, tenant: &TenantId) -> Result<Vec<Instance>>;

    /// IN_PROGRESS instances of a tenant, oldest first
    fn active_instances(&self, tenant: &TenantId) -> Result<Vec<Instance>>;

    /// Ids of instances holding an IN_PROGRESS step due before `now`
    fn overdue_instances(&self, tenant: &TenantId, now: DateTime<Utc>) -> Result<Vec<EntityId>>;

    /// Insert or replace by `(tenant, code)`
    fn save_template(&self, template: &Template) -> Result<()>;

    fn templates(&self, tenant: &TenantId) -> Result<Vec<Template>>;

    /// Insert or replace by `(tenant, code)`
    fn save_line(&self, line: &ApprovalLine) -> Result<()>;

    fn lines(&self, tenant: &TenantId) -> Result<Vec<ApprovalLine>>;

    fn save_delegation(&self, delegation: &Delegation) -> Result<()>;

    fn delegations(&self, tenant: &TenantId) -> Result<Vec<Delegation>>;

    /// Mark a delegation inactive; unknown ids are `DelegationNotFound`
    fn deactivate_delegation(&self, tenant: &TenantId, id: &EntityId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ApprovalError;
    use crate::core::identity::UserId;
    use crate::entities::instance::{DocumentRef, InstanceStatus, StepInstance, StepStatus};
    use crate::entities::template::{ApproverType, StepDef};
    use chrono::{Duration, NaiveDate, TimeZone};
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()
    }

    fn instance(document_id: &str) -> Instance {
        let mut inst = Instance::new(
            TenantId::new("acme"),
            "PO-STD",
            1,
            DocumentRef {
                document_type: "purchase_order".to_string(),
                document_id: document_id.to_string(),
                document_no: None,
                title: None,
                amount: Some(100.0),
            },
            UserId::new("req"),
            now(),
        );
        inst.steps.push(StepInstance::snapshot(
            &StepDef::new(1, ApproverType::User, "boss").with_timeout(24, false),
            1,
        ));
        inst
    }

    fn stores() -> (TempDir, Vec<Box<dyn ApprovalStore>>) {
        let tmp = TempDir::new().unwrap();
        let sqlite = SqliteStore::open(&tmp.path().join("approvals.db")).unwrap();
        let in_memory = SqliteStore::open_in_memory().unwrap();
        (
            tmp,
            vec![Box::new(MemoryStore::new()), Box::new(sqlite), Box::new(in_memory)],
        )
    }

    #[test]
    fn test_insert_is_unique_per_document() {
        let (_tmp, stores) = stores();
        for store in &stores {
            store.insert_instance(&instance("PO-1")).unwrap();
            let err = store.insert_instance(&instance("PO-1")).unwrap_err();
            assert!(matches!(err, ApprovalError::DuplicateInstance { .. }));
            store.insert_instance(&instance("PO-2")).unwrap();
            assert_eq!(store.list_instances(&TenantId::new("acme")).unwrap().len(), 2);
        }
    }

    #[test]
    fn test_stale_commit_is_rejected() {
        let (_tmp, stores) = stores();
        for store in &stores {
            let inst = instance("PO-1");
            store.insert_instance(&inst).unwrap();

            let mut first = store.load_instance(&inst.tenant, &inst.id).unwrap();
            let mut second = store.load_instance(&inst.tenant, &inst.id).unwrap();

            first.status = InstanceStatus::InProgress;
            let version = store.commit_instance(&first, first.version).unwrap();
            assert_eq!(version, 1);

            second.status = InstanceStatus::Cancelled;
            let err = store.commit_instance(&second, second.version).unwrap_err();
            assert!(err.is_retryable());

            let stored = store.load_instance(&inst.tenant, &inst.id).unwrap();
            assert_eq!(stored.status, InstanceStatus::InProgress);
            assert_eq!(stored.version, 1);
        }
    }

    #[test]
    fn test_overdue_and_active_queries() {
        let (_tmp, stores) = stores();
        for store in &stores {
            let mut inst = instance("PO-1");
            store.insert_instance(&inst).unwrap();
            inst.status = InstanceStatus::InProgress;
            inst.steps[0].status = StepStatus::InProgress;
            inst.steps[0].due_at = Some(now() + Duration::hours(24));
            store.commit_instance(&inst, 0).unwrap();

            let tenant = TenantId::new("acme");
            assert_eq!(store.active_instances(&tenant).unwrap().len(), 1);
            assert!(store.overdue_instances(&tenant, now()).unwrap().is_empty());
            assert_eq!(
                store.overdue_instances(&tenant, now() + Duration::hours(25)).unwrap(),
                vec![inst.id]
            );
            assert!(store
                .overdue_instances(&TenantId::new("globex"), now() + Duration::hours(25))
                .unwrap()
                .is_empty());
        }
    }

    #[test]
    fn test_templates_replace_by_code() {
        let (_tmp, stores) = stores();
        for store in &stores {
            let tenant = TenantId::new("acme");
            let mut t = Template::new(tenant.clone(), "PO-STD", "PO", "purchase_order", "admin")
                .with_step(StepDef::new(1, ApproverType::User, "boss"));
            store.save_template(&t).unwrap();
            t.name = "Purchase orders".to_string();
            t.revision = 2;
            store.save_template(&t).unwrap();

            let templates = store.templates(&tenant).unwrap();
            assert_eq!(templates.len(), 1);
            assert_eq!(templates[0].revision, 2);
        }
    }

    #[test]
    fn test_deactivate_delegation() {
        let (_tmp, stores) = stores();
        for store in &stores {
            let tenant = TenantId::new("acme");
            let d = Delegation::new(
                tenant.clone(),
                UserId::new("d"),
                UserId::new("e"),
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            );
            store.save_delegation(&d).unwrap();
            store.deactivate_delegation(&tenant, &d.id).unwrap();
            assert!(!store.delegations(&tenant).unwrap()[0].is_active);

            let missing = store
                .deactivate_delegation(&tenant, &EntityId::new(crate::core::identity::EntityPrefix::Dlg))
                .unwrap_err();
            assert!(matches!(missing, ApprovalError::DelegationNotFound(_)));
        }
    }
}
