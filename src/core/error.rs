//! Approval engine errors

use thiserror::Error;

use crate::core::identity::{EntityId, TenantId};

/// Errors that can occur during approval operations
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("No active approval template matches document type '{document_type}' for tenant {tenant}")]
    TemplateNotFound {
        tenant: TenantId,
        document_type: String,
    },

    #[error("Template '{code}' is invalid: {reason}")]
    InvalidTemplate { code: String, reason: String },

    #[error("An approval instance already exists for {document_type} {document_id} ({existing})")]
    DuplicateInstance {
        document_type: String,
        document_id: String,
        existing: EntityId,
    },

    #[error("Cannot resolve approver for step {step_order}: {approver_type} '{identifier}'")]
    ApproverResolution {
        step_order: u32,
        approver_type: String,
        identifier: String,
    },

    #[error("Cannot {action} {target} in state {current}: {detail}")]
    InvalidTransition {
        action: &'static str,
        target: String,
        current: String,
        detail: String,
    },

    #[error("Instance {id} is not active (status: {status})")]
    InstanceNotActive { id: EntityId, status: String },

    #[error("Instance {id} was modified concurrently; retry the operation")]
    ConcurrentModification { id: EntityId },

    #[error("Approval instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Instance {id} has no step {step_order}")]
    StepNotFound { id: EntityId, step_order: u32 },

    #[error("Delegation not found: {0}")]
    DelegationNotFound(String),

    #[error("Invalid delegation: {0}")]
    InvalidDelegation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ApprovalError {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApprovalError::ConcurrentModification { .. })
    }
}

impl From<rusqlite::Error> for ApprovalError {
    fn from(e: rusqlite::Error) -> Self {
        ApprovalError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ApprovalError {
    fn from(e: serde_json::Error) -> Self {
        ApprovalError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ApprovalError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityPrefix;

    #[test]
    fn test_only_concurrent_modification_is_retryable() {
        let id = EntityId::new(EntityPrefix::Inst);
        assert!(ApprovalError::ConcurrentModification { id }.is_retryable());
        assert!(!ApprovalError::InstanceNotActive {
            id,
            status: "cancelled".to_string()
        }
        .is_retryable());
        assert!(!ApprovalError::TemplateNotFound {
            tenant: TenantId::new("acme"),
            document_type: "PO".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_invalid_transition_message_includes_state() {
        let err = ApprovalError::InvalidTransition {
            action: "approve",
            target: "step 2".to_string(),
            current: "pending".to_string(),
            detail: "step is not in progress".to_string(),
        };
        assert!(err.to_string().contains("state pending"));
    }
}
