use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::signup::ContactPerson;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Confirmation,
    ConfirmationToWaitingList,
    Cancellation,
    TransferredAsParticipant,
    PaymentRequired,
}

/// A notification the core asks its surrounding application to deliver.
/// Templating, localization and the actual transport stay outside; the
/// domain operations only emit these events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub registration_id: Uuid,
    pub signup_id: Uuid,
    pub contact: ContactPerson,
    /// Set for `PaymentRequired`, so the dispatcher can render the link.
    pub payment_id: Option<Uuid>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        registration_id: Uuid,
        signup_id: Uuid,
        contact: ContactPerson,
    ) -> Self {
        Self {
            kind,
            registration_id,
            signup_id,
            contact,
            payment_id: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Delivery seam. Failures are non-fatal to the operation that emitted
/// the notification; callers log and move on.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Sink that only logs, for local runs and as a stand-in until a real
/// dispatcher is wired up.
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            kind = ?notification.kind,
            registration_id = %notification.registration_id,
            signup_id = %notification.signup_id,
            email = %notification.contact.email,
            "notification emitted"
        );
        Ok(())
    }
}
