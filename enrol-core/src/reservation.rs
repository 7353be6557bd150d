use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A provisional, exclusive hold on N seats against one registration.
/// Consumed when signups are created against it; inert once expired.
/// Expiry is checked lazily on read, there is no reaper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatReservation {
    pub id: Uuid,
    pub registration_id: Uuid,
    /// Opaque token handed to the client.
    pub code: Uuid,
    pub seats: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SeatReservation {
    /// Only live reservations count toward capacity consumption.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}
