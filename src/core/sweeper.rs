//! Timeout sweeper - expires overdue steps
//!
//! Each instance is handled in its own transition, so one failing instance
//! never aborts the pass. Re-running a sweep is a no-op for anything already
//! resolved.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::error::ApprovalError;
use crate::core::identity::{EntityId, TenantId};
use crate::core::service::ApprovalService;

/// An instance the sweep could not process
#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    /// None when the overdue listing itself failed
    pub instance_id: Option<EntityId>,
    pub error: String,
}

/// What one sweep pass did
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Instances found with overdue steps
    pub examined: usize,
    pub timed_out: usize,
    pub auto_approved: usize,
    /// Instances that lost a race; retried by the next pass
    pub conflicts: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn changed(&self) -> usize {
        self.timed_out + self.auto_approved
    }
}

pub struct TimeoutSweeper<'a> {
    service: &'a ApprovalService,
}

impl<'a> TimeoutSweeper<'a> {
    pub fn new(service: &'a ApprovalService) -> Self {
        Self { service }
    }

    pub fn sweep(&self, tenant: &TenantId, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let overdue = match self.service.store().overdue_instances(tenant, now) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "sweep could not list overdue instances");
                report.failures.push(SweepFailure {
                    instance_id: None,
                    error: e.to_string(),
                });
                return report;
            }
        };

        for id in overdue {
            report.examined += 1;
            let result = self.service.transition(tenant, &id, |engine, inst, _| {
                let pass = engine.timeout_overdue(inst, now)?;
                Ok(((pass.timed_out, pass.auto_approved), pass.notifications))
            });
            match result {
                Ok((_, (timed_out, auto_approved))) => {
                    debug!(instance = %id, timed_out, auto_approved, "instance swept");
                    report.timed_out += timed_out;
                    report.auto_approved += auto_approved;
                }
                Err(ApprovalError::ConcurrentModification { .. }) => {
                    warn!(instance = %id, "sweep lost a concurrent update; next pass retries");
                    report.conflicts += 1;
                }
                Err(e) => {
                    warn!(instance = %id, error = %e, "sweep failed for instance");
                    report.failures.push(SweepFailure {
                        instance_id: Some(id),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            tenant = %tenant,
            examined = report.examined,
            timed_out = report.timed_out,
            auto_approved = report.auto_approved,
            conflicts = report.conflicts,
            failures = report.failures.len(),
            "sweep finished"
        );
        report
    }
}
