//! Delegation registry - time-windowed approval authority overrides

use chrono::NaiveDate;

use crate::core::identity::UserId;
use crate::entities::delegation::{Delegation, DelegationType};

/// Whether a delegation is in force on a date (window is inclusive on both ends)
pub fn is_effective(d: &Delegation, date: NaiveDate) -> bool {
    d.is_active && d.start_date <= date && date <= d.end_date
}

/// Whether a delegation covers a document type
pub fn covers(d: &Delegation, document_type: &str) -> bool {
    match d.delegation_type {
        DelegationType::Full => true,
        DelegationType::Partial => d.document_types.iter().any(|t| t == document_type),
    }
}

/// Tenant-scoped set of delegations
#[derive(Debug, Clone, Default)]
pub struct DelegationRegistry {
    delegations: Vec<Delegation>,
}

impl DelegationRegistry {
    pub fn new(delegations: Vec<Delegation>) -> Self {
        Self { delegations }
    }

    /// Delegations currently in force from one delegator
    pub fn effective_for<'a, 'b>(
        &'a self,
        delegator: &'b UserId,
        date: NaiveDate,
    ) -> impl Iterator<Item = &'a Delegation> + 'b
    where
        'a: 'b,
    {
        self.delegations
            .iter()
            .filter(move |d| &d.delegator_id == delegator && is_effective(d, date))
    }

    /// The delegation that decides who acts for `delegator`.
    ///
    /// Overlaps resolve to the latest start_date, then the most recently
    /// created. Self-delegations are ignored.
    pub fn find_active_delegate(
        &self,
        delegator: &UserId,
        document_type: &str,
        date: NaiveDate,
    ) -> Option<&Delegation> {
        self.effective_for(delegator, date)
            .filter(|d| covers(d, document_type))
            .filter(|d| d.delegate_id != d.delegator_id)
            .max_by(|a, b| {
                a.start_date
                    .cmp(&b.start_date)
                    .then_with(|| a.created.cmp(&b.created))
            })
    }
}
