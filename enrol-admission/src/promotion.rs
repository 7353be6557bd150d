use chrono::{DateTime, Duration, Utc};
use enrol_capacity::accountant::{CapacityAccountant, CapacityError};
use enrol_core::payment::{Payment, PaymentStatus};
use enrol_core::price::PriceGroupSnapshot;
use enrol_core::repository::RegistrationSnapshot;
use enrol_core::signup::{AttendeeStatus, ContactPerson, Signup};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

#[derive(Debug, Clone)]
pub struct PromotionConfig {
    /// How long a promoted candidate has to complete their payment before
    /// the offered seat goes back to the pool.
    pub payment_expiry_minutes: i64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            payment_expiry_minutes: 60,
        }
    }
}

/// A candidate promoted outright in this pass.
#[derive(Debug)]
pub struct PromotedCandidate {
    pub signup_id: Uuid,
    pub contact: ContactPerson,
}

/// A candidate whose promotion waits on a payment session. Their status
/// stays `WAITING_LIST`; the payment row holds the offered seat.
#[derive(Debug)]
pub struct PendingPayment {
    pub payment: Payment,
    pub contact: ContactPerson,
    pub price: PriceGroupSnapshot,
}

#[derive(Debug, Default)]
pub struct PromotionPass {
    pub promoted: Vec<PromotedCandidate>,
    pub payment_pending: Vec<PendingPayment>,
    /// Candidates skipped for missing contact details; flagged for
    /// operator attention, their place in the queue is kept.
    pub skipped: Vec<Uuid>,
}

impl PromotionPass {
    pub fn is_empty(&self) -> bool {
        self.promoted.is_empty() && self.payment_pending.is_empty()
    }
}

/// Selects waiting-list replacements in FIFO order whenever attendee
/// capacity frees up. One pass runs per triggering event, under the
/// registration lock, and re-checks remaining capacity after every
/// promotion because a group cancellation can free several seats at once.
pub struct WaitlistPromotionEngine {
    config: PromotionConfig,
}

impl WaitlistPromotionEngine {
    pub fn new(config: PromotionConfig) -> Self {
        Self { config }
    }

    /// `skip_candidate` leaves one signup out of this pass. Used when a
    /// payment just failed: the seat goes to the next candidate instead of
    /// being offered straight back to the one who did not pay.
    pub fn promote(
        &self,
        snapshot: &RegistrationSnapshot,
        now: DateTime<Utc>,
        skip_candidate: Option<Uuid>,
    ) -> Result<PromotionPass, PromotionError> {
        let view = CapacityAccountant::view(snapshot, now, None)?;
        // Live reservations and open payments both hold their seats, so a
        // freed seat is never promised to the queue and a hold at once.
        let mut seats_free = view.remaining_attendee;

        let mut candidates: Vec<&Signup> = snapshot
            .signups
            .iter()
            .filter(|signup| signup.counts_as(AttendeeStatus::WaitingList))
            .filter(|signup| Some(signup.id) != skip_candidate)
            .filter(|signup| {
                !snapshot
                    .payments
                    .iter()
                    .any(|payment| payment.signup_id == signup.id && payment.is_open(now))
            })
            .collect();
        candidates.sort_by_key(|signup| (signup.created_at, signup.id));

        let mut pass = PromotionPass::default();

        for candidate in candidates {
            if !has_seat(&seats_free) {
                break;
            }

            if !candidate.contact.is_notifiable() {
                tracing::warn!(
                    signup_id = %candidate.id,
                    registration_id = %candidate.registration_id,
                    "waiting-list candidate has no usable contact details, skipping"
                );
                pass.skipped.push(candidate.id);
                continue;
            }

            match candidate.price.as_ref().filter(|price| !price.is_free()) {
                None => {
                    pass.promoted.push(PromotedCandidate {
                        signup_id: candidate.id,
                        contact: candidate.contact.clone(),
                    });
                }
                Some(price) => {
                    pass.payment_pending.push(PendingPayment {
                        payment: Payment {
                            id: Uuid::new_v4(),
                            signup_id: candidate.id,
                            registration_id: candidate.registration_id,
                            amount_cents: price.price_cents,
                            status: PaymentStatus::Created,
                            provider_reference: None,
                            created_at: now,
                            expires_at: now
                                + Duration::minutes(self.config.payment_expiry_minutes),
                        },
                        contact: candidate.contact.clone(),
                        price: price.clone(),
                    });
                }
            }

            take_seat(&mut seats_free);
        }

        Ok(pass)
    }
}

fn has_seat(left: &Option<u32>) -> bool {
    left.map_or(true, |n| n > 0)
}

fn take_seat(left: &mut Option<u32>) {
    if let Some(n) = left {
        *n = n.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use enrol_core::registration::Registration;

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

    fn waiting(snap: &RegistrationSnapshot, name: &str, created_at: DateTime<Utc>) -> Signup {
        Signup {
            id: Uuid::new_v4(),
            registration_id: snap.registration.id,
            group_id: None,
            status: AttendeeStatus::WaitingList,
            contact: ContactPerson {
                first_name: name.to_string(),
                last_name: "Tester".to_string(),
                email: format!("{}@example.org", name.to_lowercase()),
            },
            price: None,
            responsible_for_group: false,
            deleted: false,
            created_at,
        }
    }

    fn engine() -> WaitlistPromotionEngine {
        WaitlistPromotionEngine::new(PromotionConfig::default())
    }

    #[test]
    fn promotes_the_oldest_candidate_first() {
        let now = Utc::now();
        let mut snap = snapshot(registration(Some(1), Some(3)));
        let oldest = waiting(&snap, "First", now - Duration::minutes(30));
        let oldest_id = oldest.id;
        snap.signups.push(waiting(&snap, "Third", now - Duration::minutes(10)));
        snap.signups.push(oldest);
        snap.signups.push(waiting(&snap, "Second", now - Duration::minutes(20)));

        let pass = engine().promote(&snap, now, None).unwrap();
        assert_eq!(pass.promoted.len(), 1);
        assert_eq!(pass.promoted[0].signup_id, oldest_id);
    }

    #[test]
    fn one_pass_fills_every_freed_seat() {
        let now = Utc::now();
        let mut snap = snapshot(registration(Some(3), Some(3)));
        for i in 0..3 {
            let s = waiting(&snap, &format!("P{i}"), now - Duration::minutes(30 - i));
            snap.signups.push(s);
        }

        let pass = engine().promote(&snap, now, None).unwrap();
        assert_eq!(pass.promoted.len(), 3);
    }

    #[test]
    fn skips_candidates_without_contact_details() {
        let now = Utc::now();
        let mut snap = snapshot(registration(Some(1), Some(2)));
        let mut broken = waiting(&snap, "Broken", now - Duration::minutes(30));
        broken.contact.email = String::new();
        let broken_id = broken.id;
        let next = waiting(&snap, "Next", now - Duration::minutes(20));
        let next_id = next.id;
        snap.signups.push(broken);
        snap.signups.push(next);

        let pass = engine().promote(&snap, now, None).unwrap();
        // The invalid candidate does not consume the slot.
        assert_eq!(pass.skipped, vec![broken_id]);
        assert_eq!(pass.promoted.len(), 1);
        assert_eq!(pass.promoted[0].signup_id, next_id);
    }

    #[test]
    fn priced_candidates_wait_on_a_payment_session() {
        let now = Utc::now();
        let mut snap = snapshot(registration(Some(1), Some(1)));
        let mut priced = waiting(&snap, "Priced", now - Duration::minutes(30));
        priced.price = Some(enrol_core::price::PriceGroup {
            id: Uuid::new_v4(),
            label: "Adult".to_string(),
            price_cents: 1000,
            vat_rate: 24.0,
        }
        .snapshot());
        let priced_id = priced.id;
        snap.signups.push(priced);

        let pass = engine().promote(&snap, now, None).unwrap();
        assert!(pass.promoted.is_empty());
        assert_eq!(pass.payment_pending.len(), 1);
        let pending = &pass.payment_pending[0];
        assert_eq!(pending.payment.signup_id, priced_id);
        assert_eq!(pending.payment.amount_cents, 1000);
        assert_eq!(pending.payment.status, PaymentStatus::Created);
        assert_eq!(pending.payment.expires_at, now + Duration::minutes(60));
    }

    #[test]
    fn zero_priced_snapshot_promotes_without_payment() {
        let now = Utc::now();
        let mut snap = snapshot(registration(Some(1), Some(1)));
        let mut free = waiting(&snap, "Free", now - Duration::minutes(30));
        free.price = Some(enrol_core::price::PriceGroup {
            id: Uuid::new_v4(),
            label: "Free".to_string(),
            price_cents: 0,
            vat_rate: 0.0,
        }
        .snapshot());
        snap.signups.push(free);

        let pass = engine().promote(&snap, now, None).unwrap();
        assert_eq!(pass.promoted.len(), 1);
        assert!(pass.payment_pending.is_empty());
    }

    #[test]
    fn open_payment_keeps_the_seat_held() {
        let now = Utc::now();
        let mut snap = snapshot(registration(Some(1), Some(2)));
        let pending = waiting(&snap, "Pending", now - Duration::minutes(30));
        snap.payments.push(Payment {
            id: Uuid::new_v4(),
            signup_id: pending.id,
            registration_id: snap.registration.id,
            amount_cents: 1000,
            status: PaymentStatus::Created,
            provider_reference: None,
            created_at: now,
            expires_at: now + Duration::hours(1),
        });
        snap.signups.push(pending);
        snap.signups.push(waiting(&snap, "Behind", now - Duration::minutes(20)));

        // The only seat is held by the pending payment; nobody else moves.
        let pass = engine().promote(&snap, now, None).unwrap();
        assert!(pass.is_empty());
    }

    #[test]
    fn skipped_candidate_yields_to_the_next_in_line() {
        let now = Utc::now();
        let mut snap = snapshot(registration(Some(1), Some(2)));
        let defaulted = waiting(&snap, "Defaulted", now - Duration::minutes(30));
        let defaulted_id = defaulted.id;
        let next = waiting(&snap, "Next", now - Duration::minutes(20));
        let next_id = next.id;
        snap.signups.push(defaulted);
        snap.signups.push(next);

        let pass = engine().promote(&snap, now, Some(defaulted_id)).unwrap();
        assert_eq!(pass.promoted.len(), 1);
        assert_eq!(pass.promoted[0].signup_id, next_id);
    }

    #[test]
    fn no_candidates_means_an_empty_pass() {
        let now = Utc::now();
        let snap = snapshot(registration(Some(5), Some(5)));
        let pass = engine().promote(&snap, now, None).unwrap();
        assert!(pass.is_empty());
        assert!(pass.skipped.is_empty());
    }
}
