//! Approval line entity - legacy routing rule pointing at a template
//!
//! Lines predate per-template routing. Each carries an optional JSON
//! `conditions` object; only the amount bounds are interpreted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::identity::{EntityId, EntityPrefix, TenantId};

/// A routing line from document type (and department) to a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalLine {
    #[serde(default = "new_line_id")]
    pub id: EntityId,

    pub tenant: TenantId,

    pub code: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    pub document_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Template this line routes to
    pub template_code: String,

    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default)]
    pub is_default: bool,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Legacy JSON conditions, e.g. `{"min_amount": 0, "max_amount": 5000}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<serde_json::Value>,

    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
}

fn new_line_id() -> EntityId {
    EntityId::new(EntityPrefix::Line)
}

fn default_priority() -> i32 {
    100
}

fn default_true() -> bool {
    true
}

impl ApprovalLine {
    pub fn new(
        tenant: TenantId,
        code: impl Into<String>,
        document_type: impl Into<String>,
        template_code: impl Into<String>,
    ) -> Self {
        Self {
            id: new_line_id(),
            tenant,
            code: code.into(),
            name: String::new(),
            document_type: document_type.into(),
            department: None,
            template_code: template_code.into(),
            priority: default_priority(),
            is_default: false,
            is_active: true,
            conditions: None,
            created: Utc::now(),
        }
    }

    pub fn with_conditions(mut self, conditions: serde_json::Value) -> Self {
        self.conditions = Some(conditions);
        self
    }

    fn bound(&self, key: &str) -> Option<f64> {
        self.conditions
            .as_ref()
            .and_then(|c| c.get(key))
            .and_then(|v| v.as_f64())
    }

    /// Lower amount bound from the conditions, inclusive
    pub fn min_amount(&self) -> Option<f64> {
        self.bound("min_amount")
    }

    /// Upper amount bound from the conditions, inclusive
    pub fn max_amount(&self) -> Option<f64> {
        self.bound("max_amount")
    }

    /// Whether an amount lies inside the configured `[min,max]`.
    /// A missing amount or bound never excludes the line.
    pub fn accepts_amount(&self, amount: Option<f64>) -> bool {
        let Some(amount) = amount else {
            return true;
        };
        if let Some(min) = self.min_amount() {
            if amount < min {
                return false;
            }
        }
        if let Some(max) = self.max_amount() {
            if amount > max {
                return false;
            }
        }
        true
    }
}
