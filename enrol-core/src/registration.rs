use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::price::PriceGroup;

/// Capacity configuration for one event registration. Counters derived
/// from it (attendee count, remaining capacity) are recomputed from the
/// signup and reservation rows, never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    /// Unbounded when absent.
    pub maximum_attendee_capacity: Option<u32>,
    pub waiting_list_capacity: Option<u32>,
    pub maximum_group_size: Option<u32>,
    pub enrolment_start: Option<DateTime<Utc>>,
    pub enrolment_end: Option<DateTime<Utc>>,
    /// Configured price options. When non-empty, every signup must pick one.
    pub price_groups: Vec<PriceGroup>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrolmentStatus {
    NotYetOpen,
    Open,
    Closed,
}

impl Registration {
    pub fn has_price_groups(&self) -> bool {
        !self.price_groups.is_empty()
    }

    pub fn price_group(&self, id: Uuid) -> Option<&PriceGroup> {
        self.price_groups.iter().find(|group| group.id == id)
    }

    pub fn enrolment_status(&self, now: DateTime<Utc>) -> EnrolmentStatus {
        if let Some(start) = self.enrolment_start {
            if now < start {
                return EnrolmentStatus::NotYetOpen;
            }
        }
        if let Some(end) = self.enrolment_end {
            if now > end {
                return EnrolmentStatus::Closed;
            }
        }
        EnrolmentStatus::Open
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn registration(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Registration {
        Registration {
            id: Uuid::new_v4(),
            maximum_attendee_capacity: None,
            waiting_list_capacity: None,
            maximum_group_size: None,
            enrolment_start: start,
            enrolment_end: end,
            price_groups: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn enrolment_window() {
        let now = Utc::now();

        let open = registration(Some(now - Duration::hours(1)), Some(now + Duration::hours(1)));
        assert_eq!(open.enrolment_status(now), EnrolmentStatus::Open);

        let early = registration(Some(now + Duration::hours(1)), None);
        assert_eq!(early.enrolment_status(now), EnrolmentStatus::NotYetOpen);

        let late = registration(None, Some(now - Duration::hours(1)));
        assert_eq!(late.enrolment_status(now), EnrolmentStatus::Closed);

        let unbounded = registration(None, None);
        assert_eq!(unbounded.enrolment_status(now), EnrolmentStatus::Open);
    }
}
