use chrono::{DateTime, Utc};
use enrol_core::repository::RegistrationSnapshot;
use enrol_core::signup::AttendeeStatus;
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CapacityError {
    #[error("attendee count {count} exceeds configured capacity {capacity}")]
    AttendeeCountExceedsCapacity { count: u32, capacity: u32 },

    #[error("waiting list count {count} exceeds configured capacity {capacity}")]
    WaitingListCountExceedsCapacity { count: u32, capacity: u32 },
}

/// Point-in-time capacity state for one registration, computed from its
/// rows. `None` means unbounded. Remaining values are clamped at zero;
/// counts that already exceed the configured capacity are an invariant
/// violation and surface as an error instead of being clamped away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityView {
    pub attending: u32,
    pub waiting: u32,
    /// Seats held by live, not-yet-materialized reservations.
    pub reserved_seats: u32,
    /// Waitlisted signups holding an offered seat through an open payment.
    pub pending_payment_seats: u32,
    pub remaining_attendee: Option<u32>,
    pub remaining_waiting: Option<u32>,
    /// True when the attendee pool is bounded and already full on
    /// materialized signups alone, ignoring reservations.
    pub attendee_pool_full: bool,
}

impl CapacityView {
    pub fn has_attendee_seat(&self) -> bool {
        self.remaining_attendee.map_or(true, |left| left > 0)
    }

    pub fn has_waiting_seat(&self) -> bool {
        self.remaining_waiting.map_or(true, |left| left > 0)
    }

    /// Combined attendee + waiting-list room, `None` when either side is
    /// unbounded. This is what a new reservation is admitted against.
    pub fn total_remaining(&self) -> Option<u32> {
        match (self.remaining_attendee, self.remaining_waiting) {
            (Some(attendee), Some(waiting)) => Some(attendee + waiting),
            _ => None,
        }
    }
}

/// Pure capacity arithmetic over data passed to it. Transactions are the
/// caller's responsibility so the computation can be combined with writes.
pub struct CapacityAccountant;

impl CapacityAccountant {
    /// Compute the capacity view at `now`. `exclude_reservation` leaves one
    /// reservation out of the reserved-seat sum, used when validating the
    /// reservation that is about to be consumed or resized.
    pub fn view(
        snapshot: &RegistrationSnapshot,
        now: DateTime<Utc>,
        exclude_reservation: Option<Uuid>,
    ) -> Result<CapacityView, CapacityError> {
        let registration = &snapshot.registration;

        let attending = snapshot
            .signups
            .iter()
            .filter(|signup| signup.counts_as(AttendeeStatus::Attending))
            .count() as u32;
        let waiting = snapshot
            .signups
            .iter()
            .filter(|signup| signup.counts_as(AttendeeStatus::WaitingList))
            .count() as u32;

        let reserved_seats: u32 = snapshot
            .reservations
            .iter()
            .filter(|reservation| reservation.is_live(now))
            .filter(|reservation| Some(reservation.id) != exclude_reservation)
            .map(|reservation| reservation.seats)
            .sum();

        let pending_payment_seats = snapshot
            .signups
            .iter()
            .filter(|signup| signup.counts_as(AttendeeStatus::WaitingList))
            .filter(|signup| {
                snapshot
                    .payments
                    .iter()
                    .any(|payment| payment.signup_id == signup.id && payment.is_open(now))
            })
            .count() as u32;

        // Reserved seats are potentially attendee seats until consumed, so
        // they pessimistically fill the attendee pool first; only the
        // overflow beyond the free attendee seats charges the waiting list.
        let (remaining_attendee, reserved_overflow, attendee_pool_full) =
            match registration.maximum_attendee_capacity {
                None => (None, 0, false),
                Some(capacity) => {
                    if attending > capacity {
                        return Err(CapacityError::AttendeeCountExceedsCapacity {
                            count: attending,
                            capacity,
                        });
                    }
                    let free = capacity - attending;
                    let free = free.saturating_sub(pending_payment_seats);
                    (
                        Some(free.saturating_sub(reserved_seats)),
                        reserved_seats.saturating_sub(free),
                        attending >= capacity,
                    )
                }
            };

        let remaining_waiting = match registration.waiting_list_capacity {
            None => None,
            Some(capacity) => {
                if waiting > capacity {
                    return Err(CapacityError::WaitingListCountExceedsCapacity {
                        count: waiting,
                        capacity,
                    });
                }
                Some((capacity - waiting).saturating_sub(reserved_overflow))
            }
        };

        Ok(CapacityView {
            attending,
            waiting,
            reserved_seats,
            pending_payment_seats,
            remaining_attendee,
            remaining_waiting,
            attendee_pool_full,
        })
    }
}
