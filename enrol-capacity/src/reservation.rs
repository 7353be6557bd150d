use chrono::{DateTime, Duration, Utc};
use enrol_core::registration::EnrolmentStatus;
use enrol_core::repository::RegistrationSnapshot;
use enrol_core::reservation::SeatReservation;
use uuid::Uuid;

use crate::accountant::{CapacityAccountant, CapacityError};

#[derive(Debug, Clone)]
pub struct ReservationConfig {
    /// Base hold duration; each reserved seat adds one more minute, so the
    /// worst-case staleness of a large hold stays proportional to its size.
    pub base_minutes: i64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self { base_minutes: 15 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("a seat reservation must hold at least one seat")]
    ZeroSeats,

    #[error("amount of seats is greater than maximum group size: {0}")]
    ExceedsGroupSize(u32),

    #[error("enrolment is not yet open")]
    EnrolmentNotOpen,

    #[error("enrolment is already closed")]
    EnrolmentClosed,

    #[error("not enough seats available, capacity left: {0}")]
    CapacityExceeded(u32),

    #[error("reservation code doesn't exist")]
    CodeNotFound,

    #[error("reservation code has expired")]
    Expired,

    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

/// Issues and validates time-bounded seat holds. Pure over the snapshot;
/// persisting or consuming the returned rows is the caller's transaction.
pub struct SeatReservationManager {
    config: ReservationConfig,
}

impl SeatReservationManager {
    pub fn new(config: ReservationConfig) -> Self {
        Self { config }
    }

    pub fn validity(&self, seats: u32) -> Duration {
        Duration::minutes(self.config.base_minutes + i64::from(seats))
    }

    /// Create a hold on `seats` seats, checked against the combined
    /// attendee + waiting-list room left after other live holds.
    pub fn reserve(
        &self,
        snapshot: &RegistrationSnapshot,
        seats: u32,
        now: DateTime<Utc>,
    ) -> Result<SeatReservation, ReservationError> {
        self.check_request(snapshot, seats, now, None)?;

        Ok(SeatReservation {
            id: Uuid::new_v4(),
            registration_id: snapshot.registration.id,
            code: Uuid::new_v4(),
            seats,
            created_at: now,
            expires_at: now + self.validity(seats),
        })
    }

    /// Resize a live hold in place. The code and creation time are kept;
    /// the expiry is recomputed because validity depends on the seat count.
    pub fn renew(
        &self,
        snapshot: &RegistrationSnapshot,
        code: Uuid,
        seats: u32,
        now: DateTime<Utc>,
    ) -> Result<SeatReservation, ReservationError> {
        let existing = self.validate(snapshot, code, now)?;
        self.check_request(snapshot, seats, now, Some(existing.id))?;

        let mut renewed = existing;
        renewed.seats = seats;
        renewed.expires_at = renewed.created_at + self.validity(seats);
        Ok(renewed)
    }

    /// Look a hold up by code. Validating a live hold twice is idempotent:
    /// this never mutates anything.
    pub fn validate(
        &self,
        snapshot: &RegistrationSnapshot,
        code: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SeatReservation, ReservationError> {
        let reservation = snapshot
            .reservation_by_code(code)
            .ok_or(ReservationError::CodeNotFound)?;

        if !reservation.is_live(now) {
            return Err(ReservationError::Expired);
        }

        Ok(reservation.clone())
    }

    fn check_request(
        &self,
        snapshot: &RegistrationSnapshot,
        seats: u32,
        now: DateTime<Utc>,
        exclude_reservation: Option<Uuid>,
    ) -> Result<(), ReservationError> {
        if seats == 0 {
            return Err(ReservationError::ZeroSeats);
        }

        match snapshot.registration.enrolment_status(now) {
            EnrolmentStatus::NotYetOpen => return Err(ReservationError::EnrolmentNotOpen),
            EnrolmentStatus::Closed => return Err(ReservationError::EnrolmentClosed),
            EnrolmentStatus::Open => {}
        }

        if let Some(max_group_size) = snapshot.registration.maximum_group_size {
            if seats > max_group_size {
                return Err(ReservationError::ExceedsGroupSize(max_group_size));
            }
        }

        let view = CapacityAccountant::view(snapshot, now, exclude_reservation)?;
        if let Some(left) = view.total_remaining() {
            if seats > left {
                return Err(ReservationError::CapacityExceeded(left));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use enrol_core::registration::Registration;
    use enrol_core::signup::{AttendeeStatus, ContactPerson, Signup};

    use super::*;

    fn snapshot(attendee: Option<u32>, waiting: Option<u32>) -> RegistrationSnapshot {
        RegistrationSnapshot {
            registration: Registration {
                id: Uuid::new_v4(),
                maximum_attendee_capacity: attendee,
                waiting_list_capacity: waiting,
                maximum_group_size: Some(5),
                enrolment_start: None,
                enrolment_end: None,
                price_groups: vec![],
                created_at: Utc::now(),
            },
            signups: vec![],
            reservations: vec![],
            payments: vec![],
        }
    }

    fn manager() -> SeatReservationManager {
        SeatReservationManager::new(ReservationConfig::default())
    }

    #[test]
    fn validity_grows_with_seats() {
        let manager = manager();
        assert_eq!(manager.validity(1), Duration::minutes(16));
        assert_eq!(manager.validity(5), Duration::minutes(20));
    }

    #[test]
    fn reserve_issues_a_live_hold() {
        let now = Utc::now();
        let snap = snapshot(Some(10), Some(5));

        let reservation = manager().reserve(&snap, 3, now).unwrap();
        assert_eq!(reservation.seats, 3);
        assert_eq!(reservation.expires_at, now + Duration::minutes(18));
        assert!(reservation.is_live(now));
    }

    #[test]
    fn reserve_rejects_zero_seats_and_oversized_groups() {
        let now = Utc::now();
        let snap = snapshot(Some(10), Some(5));
        let manager = manager();

        assert!(matches!(
            manager.reserve(&snap, 0, now),
            Err(ReservationError::ZeroSeats)
        ));
        assert!(matches!(
            manager.reserve(&snap, 6, now),
            Err(ReservationError::ExceedsGroupSize(5))
        ));
    }

    #[test]
    fn reserve_respects_enrolment_window() {
        let now = Utc::now();
        let manager = manager();

        let mut early = snapshot(None, None);
        early.registration.enrolment_start = Some(now + Duration::hours(1));
        assert!(matches!(
            manager.reserve(&early, 1, now),
            Err(ReservationError::EnrolmentNotOpen)
        ));

        let mut late = snapshot(None, None);
        late.registration.enrolment_end = Some(now - Duration::hours(1));
        assert!(matches!(
            manager.reserve(&late, 1, now),
            Err(ReservationError::EnrolmentClosed)
        ));
    }

    #[test]
    fn reserve_rejects_when_other_holds_take_the_room() {
        let now = Utc::now();
        let mut snap = snapshot(Some(2), Some(1));
        let other = manager().reserve(&snap, 2, now).unwrap();
        snap.reservations.push(other);

        match manager().reserve(&snap, 2, now) {
            Err(ReservationError::CapacityExceeded(left)) => assert_eq!(left, 1),
            other => panic!("expected CapacityExceeded, got {other:?}"),
        }
    }

    #[test]
    fn attending_signups_shrink_the_room() {
        let now = Utc::now();
        let mut snap = snapshot(Some(1), Some(0));
        let registration_id = snap.registration.id;
        snap.signups.push(Signup {
            id: Uuid::new_v4(),
            registration_id,
            group_id: None,
            status: AttendeeStatus::Attending,
            contact: ContactPerson {
                first_name: "A".to_string(),
                last_name: "B".to_string(),
                email: "a@example.org".to_string(),
            },
            price: None,
            responsible_for_group: false,
            deleted: false,
            created_at: now,
        });

        assert!(matches!(
            manager().reserve(&snap, 1, now),
            Err(ReservationError::CapacityExceeded(0))
        ));
    }

    #[test]
    fn validate_is_idempotent_for_live_holds() {
        let now = Utc::now();
        let mut snap = snapshot(Some(10), None);
        let reservation = manager().reserve(&snap, 2, now).unwrap();
        let code = reservation.code;
        snap.reservations.push(reservation);

        let first = manager().validate(&snap, code, now).unwrap();
        let second = manager().validate(&snap, code, now).unwrap();
        assert_eq!(first.seats, second.seats);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn validate_rejects_unknown_and_expired_codes() {
        let now = Utc::now();
        let mut snap = snapshot(Some(10), None);
        let manager = manager();

        assert!(matches!(
            manager.validate(&snap, Uuid::new_v4(), now),
            Err(ReservationError::CodeNotFound)
        ));

        let reservation = manager.reserve(&snap, 1, now).unwrap();
        let code = reservation.code;
        snap.reservations.push(reservation);
        let later = now + Duration::minutes(17);
        assert!(matches!(
            manager.validate(&snap, code, later),
            Err(ReservationError::Expired)
        ));
    }

    #[test]
    fn renew_keeps_the_code_and_recomputes_expiry() {
        let now = Utc::now();
        let mut snap = snapshot(Some(10), None);
        let reservation = manager().reserve(&snap, 1, now).unwrap();
        let code = reservation.code;
        snap.reservations.push(reservation);

        let renewed = manager().renew(&snap, code, 4, now).unwrap();
        assert_eq!(renewed.code, code);
        assert_eq!(renewed.seats, 4);
        assert_eq!(renewed.expires_at, now + Duration::minutes(19));
    }

    #[test]
    fn renew_excludes_its_own_seats_from_the_check() {
        let now = Utc::now();
        let mut snap = snapshot(Some(2), Some(0));
        let reservation = manager().reserve(&snap, 2, now).unwrap();
        let code = reservation.code;
        snap.reservations.push(reservation);

        // All room is held by this very reservation; resizing it must not
        // count its own seats against itself.
        assert!(manager().renew(&snap, code, 2, now).is_ok());
    }
}
