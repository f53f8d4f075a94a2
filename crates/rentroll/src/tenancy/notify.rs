use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outbound message kinds emitted by the lifecycle services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    ApplicationSubmitted,
    ApplicationReviewed,
    HomeownerInvitation,
    HomeownerPropertyAssigned,
    TenantInvitation,
    LeaseIssued,
}

impl NotificationTemplate {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationTemplate::ApplicationSubmitted => "application_submitted",
            NotificationTemplate::ApplicationReviewed => "application_reviewed",
            NotificationTemplate::HomeownerInvitation => "homeowner_invitation",
            NotificationTemplate::HomeownerPropertyAssigned => "homeowner_property_assigned",
            NotificationTemplate::TenantInvitation => "tenant_invitation",
            NotificationTemplate::LeaseIssued => "lease_issued",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: String,
    pub template: NotificationTemplate,
    pub details: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(recipient: impl Into<String>, template: NotificationTemplate) -> Self {
        Self {
            recipient: recipient.into(),
            template,
            details: BTreeMap::new(),
        }
    }

    pub fn detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound email/SMS hook.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Deliver a notification; a failure is logged and never reaches the caller.
pub(crate) fn dispatch<N: Notifier + ?Sized>(notifier: &N, notification: Notification) {
    let template = notification.template.label();
    let recipient = notification.recipient.clone();
    if let Err(error) = notifier.notify(notification) {
        warn!(template, %recipient, %error, "notification dropped");
    }
}

/// Notifier that only writes to the log. Used when no transport is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            template = notification.template.label(),
            recipient = %notification.recipient,
            details = ?notification.details,
            "notification sent"
        );
        Ok(())
    }
}

/// Notifier capturing every delivery, optionally failing them all.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn sent_with(&self, template: NotificationTemplate) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|notification| notification.template == template)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("smtp relay offline".to_string()));
        }
        self.sent
            .lock()
            .map_err(|_| NotificationError::Transport("recorder poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}
