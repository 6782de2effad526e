//! Filter enums for list commands

use clap::ValueEnum;

use crate::entities::InstanceStatus;

/// Instance status filter
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum StatusFilter {
    Pending,
    InProgress,
    Approved,
    Rejected,
    Cancelled,
    /// Pending or in progress - default
    #[default]
    Open,
    /// Approved, rejected or cancelled
    Closed,
    All,
}

impl StatusFilter {
    pub fn matches(&self, status: InstanceStatus) -> bool {
        match self {
            StatusFilter::Pending => status == InstanceStatus::Pending,
            StatusFilter::InProgress => status == InstanceStatus::InProgress,
            StatusFilter::Approved => status == InstanceStatus::Approved,
            StatusFilter::Rejected => status == InstanceStatus::Rejected,
            StatusFilter::Cancelled => status == InstanceStatus::Cancelled,
            StatusFilter::Open => !status.is_terminal(),
            StatusFilter::Closed => status.is_terminal(),
            StatusFilter::All => true,
        }
    }
}

impl std::fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusFilter::Pending => write!(f, "pending"),
            StatusFilter::InProgress => write!(f, "in-progress"),
            StatusFilter::Approved => write!(f, "approved"),
            StatusFilter::Rejected => write!(f, "rejected"),
            StatusFilter::Cancelled => write!(f, "cancelled"),
            StatusFilter::Open => write!(f, "open"),
            StatusFilter::Closed => write!(f, "closed"),
            StatusFilter::All => write!(f, "all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_closed_partition() {
        for status in [
            InstanceStatus::Pending,
            InstanceStatus::InProgress,
            InstanceStatus::Approved,
            InstanceStatus::Rejected,
            InstanceStatus::Cancelled,
        ] {
            assert_ne!(StatusFilter::Open.matches(status), StatusFilter::Closed.matches(status));
            assert!(StatusFilter::All.matches(status));
        }
    }

    #[test]
    fn test_specific_status() {
        assert!(StatusFilter::Rejected.matches(InstanceStatus::Rejected));
        assert!(!StatusFilter::Rejected.matches(InstanceStatus::Approved));
    }
}
