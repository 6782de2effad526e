//! Notification events emitted by transitions
//!
//! Delivery is someone else's job. The engine hands abstract events to a
//! [`Notifier`] after a transition has been committed.

use serde::Serialize;
use std::sync::Mutex;
use tera::{Context, Tera};
use tracing::{info, warn};

use crate::core::config::NotificationConfig;
use crate::core::identity::{EntityId, TenantId, UserId};
use crate::entities::instance::Instance;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A step was assigned to the recipient
    Assigned,
    Approved,
    Rejected,
    Cancelled,
    TimedOut,
    /// Instance finished; sent to the requester
    Completed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Assigned => "assigned",
            NotificationKind::Approved => "approved",
            NotificationKind::Rejected => "rejected",
            NotificationKind::Cancelled => "cancelled",
            NotificationKind::TimedOut => "timed_out",
            NotificationKind::Completed => "completed",
        }
    }
}

/// A `notify(approver, instance, step)` event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub tenant: TenantId,
    pub recipient: UserId,
    pub instance_id: EntityId,
    pub document_type: String,
    pub document_id: String,
    pub document_no: Option<String>,
    pub step_order: Option<u32>,
    pub status: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, recipient: &UserId, instance: &Instance, step_order: Option<u32>) -> Self {
        Self {
            kind,
            tenant: instance.tenant.clone(),
            recipient: recipient.clone(),
            instance_id: instance.id,
            document_type: instance.document.document_type.clone(),
            document_id: instance.document.document_id.clone(),
            document_no: instance.document.document_no.clone(),
            step_order,
            status: instance.status.to_string(),
        }
    }
}

/// Receives notification events
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipient.as_str() == recipient)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
    }
}

/// Renders each event with its configured tera template and logs it
pub struct LogNotifier {
    tera: Tera,
    enabled: bool,
}

impl LogNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        for (kind, body) in config.templates.entries() {
            tera.add_raw_template(kind, body)?;
        }
        Ok(Self {
            tera,
            enabled: config.enabled,
        })
    }

    pub fn render(&self, notification: &Notification) -> Result<String, tera::Error> {
        let context = Context::from_serialize(notification)?;
        self.tera.render(notification.kind.as_str(), &context)
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        if !self.enabled {
            return;
        }
        match self.render(notification) {
            Ok(message) => info!(
                kind = notification.kind.as_str(),
                tenant = %notification.tenant,
                recipient = %notification.recipient,
                instance = %notification.instance_id,
                step = ?notification.step_order,
                "{}",
                message
            ),
            Err(e) => warn!(
                kind = notification.kind.as_str(),
                error = %e,
                "failed to render notification"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::instance::DocumentRef;
    use chrono::Utc;

    fn instance() -> Instance {
        let mut doc = DocumentRef {
            document_type: "purchase_order".to_string(),
            document_id: "42".to_string(),
            document_no: None,
            title: None,
            amount: None,
        };
        doc.document_no = Some("PO-0042".to_string());
        Instance::new(
            TenantId::new("acme"),
            "PO-STD",
            1,
            doc,
            UserId::new("req"),
            Utc::now(),
        )
    }

    #[test]
    fn test_log_notifier_renders_default_templates() {
        let notifier = LogNotifier::new(&NotificationConfig::default()).unwrap();
        let n = Notification::new(
            NotificationKind::Assigned,
            &UserId::new("qa1"),
            &instance(),
            Some(2),
        );
        let message = notifier.render(&n).unwrap();
        assert!(message.contains("qa1"));
        assert!(message.contains("PO-0042"));
    }

    #[test]
    fn test_recording_notifier_filters_by_recipient() {
        let notifier = RecordingNotifier::new();
        let inst = instance();
        notifier.notify(&Notification::new(NotificationKind::Assigned, &UserId::new("a"), &inst, Some(1)));
        notifier.notify(&Notification::new(NotificationKind::Completed, &UserId::new("req"), &inst, None));
        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(notifier.sent_to("req")[0].kind, NotificationKind::Completed);
    }
}
