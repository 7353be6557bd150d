use chrono::{DateTime, Utc};
use enrol_capacity::accountant::{CapacityAccountant, CapacityError};
use enrol_capacity::pricing::{PriceGroupError, PriceGroupResolver};
use enrol_core::notify::{Notification, NotificationKind};
use enrol_core::registration::EnrolmentStatus;
use enrol_core::repository::RegistrationSnapshot;
use enrol_core::reservation::SeatReservation;
use enrol_core::signup::{AttendeeStatus, Signup, SignupGroup, SignupRequest};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("at least one signup is required")]
    EmptyBatch,

    #[error("enrolment is not yet open")]
    EnrolmentNotOpen,

    #[error("enrolment is already closed")]
    EnrolmentClosed,

    #[error("number of signups exceeds the number of reserved seats")]
    ExceedsReservedSeats,

    #[error("amount of signups is greater than maximum group size: {0}")]
    ExceedsGroupSize(u32),

    #[error(transparent)]
    PriceGroup(#[from] PriceGroupError),

    #[error("the waiting list is already full")]
    WaitingListFull,

    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

/// Ask for the batch to be created as one signup group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupRequest {
    pub extra_info: Option<String>,
}

/// The decided batch: rows to persist plus the notifications to emit once
/// they are committed. Admission is all-or-nothing, so this only exists
/// when every request found a seat.
#[derive(Debug)]
pub struct AdmissionOutcome {
    pub group: Option<SignupGroup>,
    /// In request order, statuses decided.
    pub signups: Vec<Signup>,
    pub notifications: Vec<Notification>,
}

impl AdmissionOutcome {
    pub fn admitted(&self) -> impl Iterator<Item = &Signup> {
        self.signups
            .iter()
            .filter(|signup| signup.status == AttendeeStatus::Attending)
    }

    pub fn waitlisted(&self) -> impl Iterator<Item = &Signup> {
        self.signups
            .iter()
            .filter(|signup| signup.status == AttendeeStatus::WaitingList)
    }
}

/// Decides each signup's initial status against the capacity left after
/// live holds, in request order. Pure; the caller persists the outcome and
/// consumes the reservation in the same transaction.
pub struct AdmissionController;

impl AdmissionController {
    pub fn admit_batch(
        snapshot: &RegistrationSnapshot,
        reservation: &SeatReservation,
        requests: &[SignupRequest],
        group: Option<&GroupRequest>,
        now: DateTime<Utc>,
    ) -> Result<AdmissionOutcome, AdmissionError> {
        let registration = &snapshot.registration;

        if requests.is_empty() {
            return Err(AdmissionError::EmptyBatch);
        }

        match registration.enrolment_status(now) {
            EnrolmentStatus::NotYetOpen => return Err(AdmissionError::EnrolmentNotOpen),
            EnrolmentStatus::Closed => return Err(AdmissionError::EnrolmentClosed),
            EnrolmentStatus::Open => {}
        }

        if requests.len() as u32 > reservation.seats {
            return Err(AdmissionError::ExceedsReservedSeats);
        }

        if let Some(max_group_size) = registration.maximum_group_size {
            if requests.len() as u32 > max_group_size {
                return Err(AdmissionError::ExceedsGroupSize(max_group_size));
            }
        }

        let prices = requests
            .iter()
            .map(|request| PriceGroupResolver::resolve(registration, request.price_group))
            .collect::<Result<Vec<_>, _>>()?;

        // The reservation being consumed no longer competes for seats.
        let view = CapacityAccountant::view(snapshot, now, Some(reservation.id))?;
        let mut attendee_left = view.remaining_attendee;
        let mut waiting_left = view.remaining_waiting;

        let signup_group = group.map(|request| SignupGroup {
            id: Uuid::new_v4(),
            registration_id: registration.id,
            extra_info: request.extra_info.clone(),
            deleted: false,
            created_at: now,
        });

        let mut signups = Vec::with_capacity(requests.len());
        for (index, (request, price)) in requests.iter().zip(prices).enumerate() {
            let status = if take_seat(&mut attendee_left) {
                AttendeeStatus::Attending
            } else if take_seat(&mut waiting_left) {
                AttendeeStatus::WaitingList
            } else {
                // All-or-nothing: no partial admission of the batch.
                return Err(AdmissionError::WaitingListFull);
            };

            signups.push(Signup {
                id: Uuid::new_v4(),
                registration_id: registration.id,
                group_id: signup_group.as_ref().map(|g| g.id),
                status,
                contact: request.contact.clone(),
                price,
                responsible_for_group: signup_group.is_some() && index == 0,
                deleted: false,
                created_at: now,
            });
        }

        let notifications = signups
            .iter()
            .filter(|signup| signup.group_id.is_none() || signup.responsible_for_group)
            .map(|signup| {
                let kind = match signup.status {
                    AttendeeStatus::Attending => NotificationKind::Confirmation,
                    AttendeeStatus::WaitingList => NotificationKind::ConfirmationToWaitingList,
                };
                Notification::new(kind, registration.id, signup.id, signup.contact.clone())
            })
            .collect();

        Ok(AdmissionOutcome {
            group: signup_group,
            signups,
            notifications,
        })
    }
}

/// Decrement a working counter; `None` is unbounded and always has room.
fn take_seat(left: &mut Option<u32>) -> bool {
    match left {
        None => true,
        Some(0) => false,
        Some(n) => {
            *n -= 1;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use enrol_core::price::PriceGroup;
    use enrol_core::registration::Registration;
    use enrol_core::signup::ContactPerson;

    use super::*;

    fn registration(attendee: Option<u32>, waiting: Option<u32>) -> Registration {
        Registration {
            id: Uuid::new_v4(),
            maximum_attendee_capacity: attendee,
            waiting_list_capacity: waiting,
            maximum_group_size: None,
            enrolment_start: None,
            enrolment_end: None,
            price_groups: vec![],
            created_at: Utc::now(),
        }
    }

    fn snapshot(registration: Registration) -> RegistrationSnapshot {
        RegistrationSnapshot {
            registration,
            signups: vec![],
            reservations: vec![],
            payments: vec![],
        }
    }

    fn reservation(snapshot: &RegistrationSnapshot, seats: u32, now: DateTime<Utc>) -> SeatReservation {
        SeatReservation {
            id: Uuid::new_v4(),
            registration_id: snapshot.registration.id,
            code: Uuid::new_v4(),
            seats,
            created_at: now,
            expires_at: now + Duration::minutes(20),
        }
    }

    fn request(name: &str) -> SignupRequest {
        SignupRequest {
            contact: ContactPerson {
                first_name: name.to_string(),
                last_name: "Tester".to_string(),
                email: format!("{}@example.org", name.to_lowercase()),
            },
            price_group: None,
            extra_info: None,
        }
    }

    #[test]
    fn fills_attendee_seats_in_request_order_then_waitlists() {
        let now = Utc::now();
        let snap = snapshot(registration(Some(2), Some(2)));
        let reservation = reservation(&snap, 4, now);
        let requests = vec![request("A"), request("B"), request("C"), request("D")];

        let outcome =
            AdmissionController::admit_batch(&snap, &reservation, &requests, None, now).unwrap();

        let statuses: Vec<_> = outcome.signups.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                AttendeeStatus::Attending,
                AttendeeStatus::Attending,
                AttendeeStatus::WaitingList,
                AttendeeStatus::WaitingList,
            ]
        );
        assert_eq!(outcome.signups[0].contact.first_name, "A");
        assert_eq!(outcome.notifications.len(), 4);
    }

    #[test]
    fn rejects_the_whole_batch_when_the_list_would_overflow() {
        let now = Utc::now();
        let snap = snapshot(registration(Some(1), Some(1)));
        let reservation = reservation(&snap, 3, now);
        let requests = vec![request("A"), request("B"), request("C")];

        assert!(matches!(
            AdmissionController::admit_batch(&snap, &reservation, &requests, None, now),
            Err(AdmissionError::WaitingListFull)
        ));
    }

    #[test]
    fn zero_attendee_capacity_goes_straight_to_the_waiting_list() {
        let now = Utc::now();
        let snap = snapshot(registration(Some(0), Some(1)));
        let reservation = reservation(&snap, 1, now);

        let outcome =
            AdmissionController::admit_batch(&snap, &reservation, &[request("A")], None, now)
                .unwrap();
        assert_eq!(outcome.signups[0].status, AttendeeStatus::WaitingList);
        assert_eq!(
            outcome.notifications[0].kind,
            NotificationKind::ConfirmationToWaitingList
        );
    }

    #[test]
    fn unbounded_capacity_admits_everyone() {
        let now = Utc::now();
        let snap = snapshot(registration(None, Some(0)));
        let reservation = reservation(&snap, 10, now);
        let requests: Vec<_> = (0..10).map(|i| request(&format!("P{i}"))).collect();

        let outcome =
            AdmissionController::admit_batch(&snap, &reservation, &requests, None, now).unwrap();
        assert_eq!(outcome.admitted().count(), 10);
        assert_eq!(outcome.waitlisted().count(), 0);
    }

    #[test]
    fn batch_must_fit_the_reservation_and_group_size() {
        let now = Utc::now();
        let mut reg = registration(None, None);
        reg.maximum_group_size = Some(2);
        let snap = snapshot(reg);
        let small = reservation(&snap, 1, now);
        let big = reservation(&snap, 5, now);

        assert!(matches!(
            AdmissionController::admit_batch(
                &snap,
                &small,
                &[request("A"), request("B")],
                None,
                now
            ),
            Err(AdmissionError::ExceedsReservedSeats)
        ));
        assert!(matches!(
            AdmissionController::admit_batch(
                &snap,
                &big,
                &[request("A"), request("B"), request("C")],
                None,
                now
            ),
            Err(AdmissionError::ExceedsGroupSize(2))
        ));
        assert!(matches!(
            AdmissionController::admit_batch(&snap, &big, &[], None, now),
            Err(AdmissionError::EmptyBatch)
        ));
    }

    #[test]
    fn priced_registration_demands_a_valid_price_group() {
        let now = Utc::now();
        let mut reg = registration(None, None);
        let group = PriceGroup {
            id: Uuid::new_v4(),
            label: "Adult".to_string(),
            price_cents: 1000,
            vat_rate: 24.0,
        };
        let group_id = group.id;
        reg.price_groups.push(group);
        let snap = snapshot(reg);
        let reservation = reservation(&snap, 2, now);

        assert!(matches!(
            AdmissionController::admit_batch(&snap, &reservation, &[request("A")], None, now),
            Err(AdmissionError::PriceGroup(PriceGroupError::Required))
        ));

        let mut priced = request("A");
        priced.price_group = Some(group_id);
        let outcome =
            AdmissionController::admit_batch(&snap, &reservation, &[priced], None, now).unwrap();
        let snapshot_price = outcome.signups[0].price.as_ref().unwrap();
        assert_eq!(snapshot_price.price_cents, 1000);
    }

    #[test]
    fn group_batch_notifies_only_the_responsible_member() {
        let now = Utc::now();
        let snap = snapshot(registration(Some(1), Some(1)));
        let reservation = reservation(&snap, 2, now);
        let group = GroupRequest::default();

        let outcome = AdmissionController::admit_batch(
            &snap,
            &reservation,
            &[request("A"), request("B")],
            Some(&group),
            now,
        )
        .unwrap();

        let group_id = outcome.group.as_ref().unwrap().id;
        assert!(outcome.signups.iter().all(|s| s.group_id == Some(group_id)));
        assert!(outcome.signups[0].responsible_for_group);
        assert!(!outcome.signups[1].responsible_for_group);
        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].kind, NotificationKind::Confirmation);
    }
}
