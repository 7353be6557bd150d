use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::price::PriceGroupSnapshot;
use crate::signup::ContactPerson;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Created,
    Paid,
    Cancelled,
    Expired,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "CREATED",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Expired => "EXPIRED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CREATED" => Some(PaymentStatus::Created),
            "PAID" => Some(PaymentStatus::Paid),
            "CANCELLED" => Some(PaymentStatus::Cancelled),
            "EXPIRED" => Some(PaymentStatus::Expired),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

/// State of one payment session opened for a payment-gated promotion.
/// The provider integration lives behind [`PaymentProvider`]; this row
/// only tracks the status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// The handle the webhook reports back with.
    pub id: Uuid,
    pub signup_id: Uuid,
    pub registration_id: Uuid,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    /// Provider-side session reference, recorded once the session opens.
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Payment {
    /// An open payment keeps its candidate's offered seat held.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Created && now <= self.expires_at
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentProviderError {
    #[error("payment provider rejected the session: {0}")]
    Rejected(String),

    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
}

/// External payment collaborator. Opens a checkout session for a priced
/// promotion; the outcome arrives later through the payment webhook.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn open_session(
        &self,
        payment: &Payment,
        contact: &ContactPerson,
        price: &PriceGroupSnapshot,
    ) -> Result<String, PaymentProviderError>;
}
