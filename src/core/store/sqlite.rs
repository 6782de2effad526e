//! SQLite store
//!
//! Each record is kept as a JSON body next to the key columns used for
//! uniqueness and lookups. `step_instances` is a projection of the instance
//! body rewritten on every commit; it carries the `(instance_id, step_order)`
//! key and the due dates the sweeper queries.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::core::error::{ApprovalError, Result};
use crate::core::identity::{EntityId, TenantId};
use crate::entities::delegation::Delegation;
use crate::entities::instance::{Instance, InstanceStatus, StepStatus};
use crate::entities::line::ApprovalLine;
use crate::entities::template::Template;

use super::ApprovalStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS instances (
    id TEXT PRIMARY KEY,
    tenant TEXT NOT NULL,
    document_type TEXT NOT NULL,
    document_id TEXT NOT NULL,
    status TEXT NOT NULL,
    version INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    body TEXT NOT NULL,
    UNIQUE (tenant, document_type, document_id)
);

CREATE TABLE IF NOT EXISTS step_instances (
    instance_id TEXT NOT NULL REFERENCES instances(id) ON DELETE CASCADE,
    step_order INTEGER NOT NULL,
    status TEXT NOT NULL,
    approver_id TEXT,
    delegated_to TEXT,
    due_at TEXT,
    PRIMARY KEY (instance_id, step_order)
);

CREATE INDEX IF NOT EXISTS idx_instances_status ON instances(tenant, status);
CREATE INDEX IF NOT EXISTS idx_steps_due ON step_instances(status, due_at);

CREATE TABLE IF NOT EXISTS templates (
    tenant TEXT NOT NULL,
    code TEXT NOT NULL,
    body TEXT NOT NULL,
    PRIMARY KEY (tenant, code)
);

CREATE TABLE IF NOT EXISTS lines (
    tenant TEXT NOT NULL,
    code TEXT NOT NULL,
    body TEXT NOT NULL,
    PRIMARY KEY (tenant, code)
);

CREATE TABLE IF NOT EXISTS delegations (
    id TEXT PRIMARY KEY,
    tenant TEXT NOT NULL,
    created TEXT NOT NULL,
    body TEXT NOT NULL
);
"#;

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_steps(tx: &Transaction<'_>, instance: &Instance) -> Result<()> {
        let id = instance.id.to_string();
        tx.execute("DELETE FROM step_instances WHERE instance_id = ?1", [&id])?;
        let mut stmt = tx.prepare(
            "INSERT INTO step_instances
                (instance_id, step_order, status, approver_id, delegated_to, due_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for step in &instance.steps {
            stmt.execute(params![
                id,
                step.step_order,
                step.status,
                step.approver_id.as_ref().map(|u| u.as_str()),
                step.delegated_to.as_ref().map(|u| u.as_str()),
                step.due_at.map(timestamp),
            ])?;
        }
        Ok(())
    }

    fn query_bodies<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<T>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let bodies = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        bodies.iter().map(|b| decode(b)).collect()
    }
}

impl ApprovalStore for SqliteStore {
    fn insert_instance(&self, instance: &Instance) -> Result<()> {
        let mut stored = instance.clone();
        stored.version = 0;
        let body = serde_json::to_string(&stored)?;
        let doc = &stored.document;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let inserted = tx.execute(
            "INSERT INTO instances
                (id, tenant, document_type, document_id, status, version, created_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
            params![
                stored.id.to_string(),
                stored.tenant.as_str(),
                doc.document_type,
                doc.document_id,
                stored.status,
                timestamp(stored.created_at),
                body,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                let existing: String = tx.query_row(
                    "SELECT id FROM instances
                     WHERE tenant = ?1 AND document_type = ?2 AND document_id = ?3",
                    params![stored.tenant.as_str(), doc.document_type, doc.document_id],
                    |row| row.get(0),
                )?;
                let existing = existing
                    .parse::<EntityId>()
                    .map_err(|e| ApprovalError::Storage(e.to_string()))?;
                return Err(ApprovalError::DuplicateInstance {
                    document_type: doc.document_type.clone(),
                    document_id: doc.document_id.clone(),
                    existing,
                });
            }
            Err(e) => return Err(e.into()),
        }
        Self::write_steps(&tx, &stored)?;
        tx.commit()?;
        Ok(())
    }

    fn load_instance(&self, tenant: &TenantId, id: &EntityId) -> Result<Instance> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM instances WHERE tenant = ?1 AND id = ?2",
                params![tenant.as_str(), id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(body) => decode(&body),
            None => Err(ApprovalError::InstanceNotFound(id.to_string())),
        }
    }

    fn find_instance(
        &self,
        tenant: &TenantId,
        document_type: &str,
        document_id: &str,
    ) -> Result<Option<Instance>> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM instances
                 WHERE tenant = ?1 AND document_type = ?2 AND document_id = ?3",
                params![tenant.as_str(), document_type, document_id],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| decode(&b)).transpose()
    }

    fn commit_instance(&self, instance: &Instance, expected_version: u64) -> Result<u64> {
        let version = expected_version + 1;
        let mut stored = instance.clone();
        stored.version = version;
        let body = serde_json::to_string(&stored)?;
        let id = stored.id.to_string();

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE instances SET status = ?1, version = ?2, body = ?3
             WHERE id = ?4 AND tenant = ?5 AND version = ?6",
            params![
                stored.status,
                version as i64,
                body,
                id,
                stored.tenant.as_str(),
                expected_version as i64,
            ],
        )?;
        if updated == 0 {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT version FROM instances WHERE id = ?1 AND tenant = ?2",
                    params![id, stored.tenant.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match exists {
                Some(_) => ApprovalError::ConcurrentModification { id: stored.id },
                None => ApprovalError::InstanceNotFound(id),
            });
        }
        Self::write_steps(&tx, &stored)?;
        tx.commit()?;
        Ok(version)
    }

    fn list_instances(&self, tenant: &TenantId) -> Result<Vec<Instance>> {
        self.query_bodies(
            "SELECT body FROM instances WHERE tenant = ?1 ORDER BY created_at, id",
            [tenant.as_str()],
        )
    }

    fn active_instances(&self, tenant: &TenantId) -> Result<Vec<Instance>> {
        self.query_bodies(
            "SELECT body FROM instances WHERE tenant = ?1 AND status = ?2 ORDER BY created_at, id",
            params![tenant.as_str(), InstanceStatus::InProgress],
        )
    }

    fn overdue_instances(&self, tenant: &TenantId, now: DateTime<Utc>) -> Result<Vec<EntityId>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT i.id FROM instances i
             JOIN step_instances s ON s.instance_id = i.id
             WHERE i.tenant = ?1 AND i.status = ?2 AND s.status = ?3
               AND s.due_at IS NOT NULL AND s.due_at < ?4
             ORDER BY i.created_at, i.id",
        )?;
        let ids = stmt
            .query_map(
                params![
                    tenant.as_str(),
                    InstanceStatus::InProgress,
                    StepStatus::InProgress,
                    timestamp(now),
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        ids.iter()
            .map(|id| {
                id.parse::<EntityId>()
                    .map_err(|e| ApprovalError::Storage(e.to_string()))
            })
            .collect()
    }

    fn save_template(&self, template: &Template) -> Result<()> {
        let body = serde_json::to_string(template)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO templates (tenant, code, body) VALUES (?1, ?2, ?3)",
            params![template.tenant.as_str(), template.code, body],
        )?;
        Ok(())
    }

    fn templates(&self, tenant: &TenantId) -> Result<Vec<Template>> {
        self.query_bodies(
            "SELECT body FROM templates WHERE tenant = ?1 ORDER BY code",
            [tenant.as_str()],
        )
    }

    fn save_line(&self, line: &ApprovalLine) -> Result<()> {
        let body = serde_json::to_string(line)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO lines (tenant, code, body) VALUES (?1, ?2, ?3)",
            params![line.tenant.as_str(), line.code, body],
        )?;
        Ok(())
    }

    fn lines(&self, tenant: &TenantId) -> Result<Vec<ApprovalLine>> {
        self.query_bodies(
            "SELECT body FROM lines WHERE tenant = ?1 ORDER BY code",
            [tenant.as_str()],
        )
    }

    fn save_delegation(&self, delegation: &Delegation) -> Result<()> {
        let body = serde_json::to_string(delegation)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO delegations (id, tenant, created, body) VALUES (?1, ?2, ?3, ?4)",
            params![
                delegation.id.to_string(),
                delegation.tenant.as_str(),
                timestamp(delegation.created),
                body,
            ],
        )?;
        Ok(())
    }

    fn delegations(&self, tenant: &TenantId) -> Result<Vec<Delegation>> {
        self.query_bodies(
            "SELECT body FROM delegations WHERE tenant = ?1 ORDER BY created, id",
            [tenant.as_str()],
        )
    }

    fn deactivate_delegation(&self, tenant: &TenantId, id: &EntityId) -> Result<()> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM delegations WHERE tenant = ?1 AND id = ?2",
                params![tenant.as_str(), id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let mut delegation: Delegation = match body {
            Some(body) => decode(&body)?,
            None => return Err(ApprovalError::DelegationNotFound(id.to_string())),
        };
        delegation.is_active = false;
        self.save_delegation(&delegation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::UserId;
    use crate::entities::instance::DocumentRef;
    use tempfile::TempDir;

    #[test]
    fn test_reopen_keeps_instances() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("approvals.db");
        let inst = Instance::new(
            TenantId::new("acme"),
            "PO-STD",
            3,
            DocumentRef {
                document_type: "purchase_order".to_string(),
                document_id: "PO-9".to_string(),
                document_no: Some("PO-9".to_string()),
                title: None,
                amount: Some(12.5),
            },
            UserId::new("req"),
            Utc::now(),
        );
        SqliteStore::open(&path).unwrap().insert_instance(&inst).unwrap();

        let store = SqliteStore::open(&path).unwrap();
        let loaded = store
            .find_instance(&inst.tenant, "purchase_order", "PO-9")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.id, inst.id);
        assert_eq!(loaded.template_revision, 3);
        assert_eq!(loaded.document.amount, Some(12.5));
    }
}
