use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::price::PriceGroupSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendeeStatus {
    Attending,
    WaitingList,
}

impl AttendeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendeeStatus::Attending => "ATTENDING",
            AttendeeStatus::WaitingList => "WAITING_LIST",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ATTENDING" => Some(AttendeeStatus::Attending),
            "WAITING_LIST" => Some(AttendeeStatus::WaitingList),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactPerson {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl ContactPerson {
    /// A promotion notification can only go out to a contact with a name
    /// and an email address.
    pub fn is_notifiable(&self) -> bool {
        !self.first_name.trim().is_empty() && !self.email.trim().is_empty()
    }
}

/// One admitted (or waitlisted) person. Soft-deleted rows stay around as
/// tombstones because payment records may still reference them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signup {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub group_id: Option<Uuid>,
    pub status: AttendeeStatus,
    pub contact: ContactPerson,
    pub price: Option<PriceGroupSnapshot>,
    /// First member of a group batch; group-level notifications go to them.
    pub responsible_for_group: bool,
    pub deleted: bool,
    /// FIFO promotion key, ties broken by id.
    pub created_at: DateTime<Utc>,
}

impl Signup {
    pub fn counts_as(&self, status: AttendeeStatus) -> bool {
        !self.deleted && self.status == status
    }
}

/// A batch of signups created against one reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupGroup {
    pub id: Uuid,
    pub registration_id: Uuid,
    pub extra_info: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// One requested admission within a `CreateSignups` batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub contact: ContactPerson,
    /// Reference into the registration's configured price groups.
    pub price_group: Option<Uuid>,
    pub extra_info: Option<String>,
}
