//! Delegation entity - temporary transfer of approval authority

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::{EntityId, EntityPrefix, TenantId, UserId};

/// Scope of a delegation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum DelegationType {
    /// Every document type
    #[default]
    Full,
    /// Only the listed document types
    Partial,
}

impl std::fmt::Display for DelegationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DelegationType::Full => write!(f, "full"),
            DelegationType::Partial => write!(f, "partial"),
        }
    }
}

impl std::str::FromStr for DelegationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(DelegationType::Full),
            "partial" => Ok(DelegationType::Partial),
            _ => Err(format!("Unknown delegation type: {}", s)),
        }
    }
}

/// A delegation from one user to another over an inclusive date window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delegation {
    pub id: EntityId,

    pub tenant: TenantId,

    pub delegator_id: UserId,

    pub delegate_id: UserId,

    #[serde(default, rename = "type")]
    pub delegation_type: DelegationType,

    /// Covered document types for PARTIAL delegations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_types: Vec<String>,

    pub start_date: NaiveDate,

    pub end_date: NaiveDate,

    #[serde(default = "default_true")]
    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub created: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Delegation {
    pub fn new(
        tenant: TenantId,
        delegator_id: UserId,
        delegate_id: UserId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Dlg),
            tenant,
            delegator_id,
            delegate_id,
            delegation_type: DelegationType::Full,
            document_types: Vec::new(),
            start_date,
            end_date,
            is_active: true,
            reason: None,
            created: Utc::now(),
        }
    }

    /// Restrict to the given document types
    pub fn partial(mut self, document_types: Vec<String>) -> Self {
        self.delegation_type = DelegationType::Partial;
        self.document_types = document_types;
        self
    }
}
