use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enrol_capacity::accountant::{CapacityAccountant, CapacityError};
use enrol_capacity::reservation::{ReservationConfig, ReservationError, SeatReservationManager};
use enrol_core::clock::Clock;
use enrol_core::notify::{Notification, NotificationKind, NotificationSink};
use enrol_core::payment::{
    Payment, PaymentProvider, PaymentProviderError, PaymentStatus,
};
use enrol_core::price::PriceGroupSnapshot;
use enrol_core::repository::{
    RegistrationSnapshot, RegistrationStore, RegistrationTx, StoreError,
};
use enrol_core::signup::{AttendeeStatus, ContactPerson, Signup, SignupRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::admission::{AdmissionController, AdmissionError, GroupRequest};
use crate::promotion::{PromotionConfig, PromotionError, WaitlistPromotionEngine};

/// Error taxonomy of the core. The API layer maps these onto status
/// codes: Validation 400, Conflict 409, CapacityFull 403, NotFound 404,
/// Internal 500.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    /// A well-formed request the registration cannot satisfy.
    #[error("{0}")]
    CapacityFull(String),

    #[error("{0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RegistrationNotFound(_)
            | StoreError::SignupNotFound(_)
            | StoreError::SignupGroupNotFound(_)
            | StoreError::ReservationNotFound(_)
            | StoreError::PaymentNotFound(_) => ServiceError::NotFound(err.to_string()),
            StoreError::Backend(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<ReservationError> for ServiceError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::ZeroSeats
            | ReservationError::ExceedsGroupSize(_)
            | ReservationError::CodeNotFound
            | ReservationError::Expired => ServiceError::Validation(err.to_string()),
            ReservationError::EnrolmentNotOpen | ReservationError::EnrolmentClosed => {
                ServiceError::Conflict(err.to_string())
            }
            ReservationError::CapacityExceeded(_) => ServiceError::CapacityFull(err.to_string()),
            ReservationError::Capacity(inner) => inner.into(),
        }
    }
}

impl From<AdmissionError> for ServiceError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::EmptyBatch
            | AdmissionError::ExceedsReservedSeats
            | AdmissionError::ExceedsGroupSize(_)
            | AdmissionError::PriceGroup(_) => ServiceError::Validation(err.to_string()),
            AdmissionError::EnrolmentNotOpen | AdmissionError::EnrolmentClosed => {
                ServiceError::Conflict(err.to_string())
            }
            AdmissionError::WaitingListFull => ServiceError::CapacityFull(err.to_string()),
            AdmissionError::Capacity(inner) => inner.into(),
        }
    }
}

impl From<PromotionError> for ServiceError {
    fn from(err: PromotionError) -> Self {
        match err {
            PromotionError::Capacity(inner) => inner.into(),
        }
    }
}

impl From<CapacityError> for ServiceError {
    fn from(err: CapacityError) -> Self {
        // A count past its configured capacity means a lost or
        // double-counted seat somewhere; never clamp it away.
        ServiceError::Internal(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOutcome {
    Paid,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservationView {
    pub code: Uuid,
    pub seats: u32,
    pub expires_at: DateTime<Utc>,
    /// Whether seats converted right now would land on the waiting list.
    pub in_waitlist: bool,
}

#[derive(Debug, Serialize)]
pub struct AdmissionResult {
    pub group_id: Option<Uuid>,
    pub attending: Vec<Signup>,
    pub waitlisted: Vec<Signup>,
}

/// Public, clamped read of a registration's counters.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationCapacity {
    pub current_attendee_count: u32,
    pub current_waiting_list_count: u32,
    pub reserved_seats: u32,
    pub remaining_attendee_capacity: Option<u32>,
    pub remaining_waiting_list_capacity: Option<u32>,
}

/// Transactional front door for the admission core. Every
/// capacity-affecting operation locks the target registration, decides
/// against a snapshot taken under that lock, writes, commits, and only
/// then lets notifications out.
pub struct SignupService {
    store: Arc<dyn RegistrationStore>,
    notifier: Arc<dyn NotificationSink>,
    payments: Arc<dyn PaymentProvider>,
    clock: Arc<dyn Clock>,
    reservations: SeatReservationManager,
    promotions: WaitlistPromotionEngine,
}

impl SignupService {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        notifier: Arc<dyn NotificationSink>,
        payments: Arc<dyn PaymentProvider>,
        clock: Arc<dyn Clock>,
        reservation_config: ReservationConfig,
        promotion_config: PromotionConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            payments,
            clock,
            reservations: SeatReservationManager::new(reservation_config),
            promotions: WaitlistPromotionEngine::new(promotion_config),
        }
    }

    pub async fn create_reservation(
        &self,
        registration_id: Uuid,
        seats: u32,
    ) -> Result<ReservationView, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.store.lock_registration(registration_id).await?;
        let snapshot = tx.snapshot();

        let reservation = self.reservations.reserve(&snapshot, seats, now)?;
        tx.insert_reservation(&reservation).await?;
        tx.commit().await?;

        tracing::info!(
            registration_id = %registration_id,
            code = %reservation.code,
            seats,
            "seat reservation created"
        );

        let view = CapacityAccountant::view(&snapshot, now, None)?;
        Ok(ReservationView {
            code: reservation.code,
            seats: reservation.seats,
            expires_at: reservation.expires_at,
            in_waitlist: view.attendee_pool_full,
        })
    }

    pub async fn update_reservation(
        &self,
        registration_id: Uuid,
        code: Uuid,
        seats: u32,
    ) -> Result<ReservationView, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.store.lock_registration(registration_id).await?;
        let snapshot = tx.snapshot();

        let renewed = self
            .reservations
            .renew(&snapshot, code, seats, now)
            .map_err(|err| match err {
                ReservationError::Expired => {
                    ServiceError::Conflict("cannot update an expired seat reservation".to_string())
                }
                other => other.into(),
            })?;
        tx.update_reservation(&renewed).await?;
        tx.commit().await?;

        let view = CapacityAccountant::view(&snapshot, now, Some(renewed.id))?;
        Ok(ReservationView {
            code: renewed.code,
            seats: renewed.seats,
            expires_at: renewed.expires_at,
            in_waitlist: view.attendee_pool_full,
        })
    }

    /// Convert a live reservation into signups, consuming it in the same
    /// transaction so its seats are never counted twice.
    pub async fn create_signups(
        &self,
        registration_id: Uuid,
        reservation_code: Uuid,
        requests: Vec<SignupRequest>,
        group: Option<GroupRequest>,
    ) -> Result<AdmissionResult, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.store.lock_registration(registration_id).await?;
        let snapshot = tx.snapshot();

        let reservation = self.reservations.validate(&snapshot, reservation_code, now)?;
        let outcome = AdmissionController::admit_batch(
            &snapshot,
            &reservation,
            &requests,
            group.as_ref(),
            now,
        )?;

        if let Some(group_row) = &outcome.group {
            tx.insert_group(group_row).await?;
        }
        tx.insert_signups(&outcome.signups).await?;
        tx.delete_reservation(reservation.id).await?;
        tx.commit().await?;

        tracing::info!(
            registration_id = %registration_id,
            admitted = outcome.admitted().count(),
            waitlisted = outcome.waitlisted().count(),
            "signup batch committed"
        );

        self.dispatch(&outcome.notifications).await;

        Ok(AdmissionResult {
            group_id: outcome.group.as_ref().map(|g| g.id),
            attending: outcome.admitted().cloned().collect(),
            waitlisted: outcome.waitlisted().cloned().collect(),
        })
    }

    /// Soft-delete a signup. Removing an attending signup frees its seat
    /// and runs one promotion pass before the transaction commits.
    pub async fn delete_signup(&self, signup_id: Uuid) -> Result<(), ServiceError> {
        let registration_id = self
            .store
            .find_signup_registration(signup_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("signup not found: {signup_id}")))?;

        let now = self.clock.now();
        let mut tx = self.store.lock_registration(registration_id).await?;
        let mut snapshot = tx.snapshot();

        let removed = snapshot
            .signup(signup_id)
            .filter(|signup| !signup.deleted)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("signup not found: {signup_id}")))?;

        // A waitlisted signup with an open session holds an attendee seat
        // too; deleting it frees that seat just like deleting an attendee.
        let held_seat = removed.status == AttendeeStatus::Attending
            || snapshot
                .payments
                .iter()
                .any(|payment| payment.signup_id == removed.id && payment.is_open(now));

        self.remove_signup(&mut tx, &mut snapshot, &removed, now).await?;

        let mut notifications = vec![Notification::new(
            NotificationKind::Cancellation,
            registration_id,
            removed.id,
            removed.contact.clone(),
        )];

        if held_seat {
            notifications.extend(self.promotion_pass(&mut tx, &mut snapshot, now, None).await?);
        }

        tx.commit().await?;
        self.dispatch(&notifications).await;
        Ok(())
    }

    /// Soft-delete a whole group. All attending members free their seats
    /// first, then a single promotion pass fills them.
    pub async fn delete_signup_group(&self, group_id: Uuid) -> Result<(), ServiceError> {
        let registration_id = self
            .store
            .find_group_registration(group_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("signup group not found: {group_id}"))
            })?;

        let now = self.clock.now();
        let mut tx = self.store.lock_registration(registration_id).await?;
        let mut snapshot = tx.snapshot();

        let members: Vec<Signup> = snapshot
            .signups
            .iter()
            .filter(|signup| signup.group_id == Some(group_id) && !signup.deleted)
            .cloned()
            .collect();

        tx.mark_group_deleted(group_id).await?;
        let mut freed_seats = false;
        for member in &members {
            freed_seats |= member.status == AttendeeStatus::Attending
                || snapshot
                    .payments
                    .iter()
                    .any(|payment| payment.signup_id == member.id && payment.is_open(now));
            self.remove_signup(&mut tx, &mut snapshot, member, now).await?;
        }

        let mut notifications = Vec::new();
        if let Some(contact_member) = members
            .iter()
            .find(|member| member.responsible_for_group)
            .or_else(|| members.first())
        {
            notifications.push(Notification::new(
                NotificationKind::Cancellation,
                registration_id,
                contact_member.id,
                contact_member.contact.clone(),
            ));
        }

        if freed_seats {
            notifications.extend(self.promotion_pass(&mut tx, &mut snapshot, now, None).await?);
        }

        tx.commit().await?;
        self.dispatch(&notifications).await;
        Ok(())
    }

    /// Settle a payment session opened for a gated promotion.
    pub async fn handle_payment_webhook(
        &self,
        payment_id: Uuid,
        outcome: PaymentOutcome,
    ) -> Result<(), ServiceError> {
        let registration_id = self
            .store
            .find_payment_registration(payment_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("payment not found: {payment_id}")))?;

        let now = self.clock.now();
        let mut tx = self.store.lock_registration(registration_id).await?;
        let mut snapshot = tx.snapshot();

        let payment = snapshot
            .payment(payment_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("payment not found: {payment_id}")))?;
        if payment.status != PaymentStatus::Created {
            return Err(ServiceError::Conflict(format!(
                "payment {payment_id} is already settled"
            )));
        }

        let mut notifications = Vec::new();
        match outcome {
            PaymentOutcome::Paid => {
                // Expiry is lazy, like reservations: a session past its
                // deadline no longer holds the seat, which may already be
                // admitted to someone else. A late PAID must not flip the
                // original candidate on top of that.
                if now > payment.expires_at {
                    tx.update_payment_status(payment_id, PaymentStatus::Expired)
                        .await?;
                    if let Some(stored) = snapshot
                        .payments
                        .iter_mut()
                        .find(|candidate| candidate.id == payment_id)
                    {
                        stored.status = PaymentStatus::Expired;
                    }
                    let notifications = self
                        .promotion_pass(&mut tx, &mut snapshot, now, Some(payment.signup_id))
                        .await?;
                    tx.commit().await?;
                    self.dispatch(&notifications).await;
                    return Err(ServiceError::Conflict(format!(
                        "payment {payment_id} lapsed before settlement"
                    )));
                }

                tx.update_payment_status(payment_id, PaymentStatus::Paid).await?;

                match snapshot
                    .signup(payment.signup_id)
                    .filter(|signup| !signup.deleted)
                    .cloned()
                {
                    Some(signup) => {
                        tx.update_signup_status(signup.id, AttendeeStatus::Attending)
                            .await?;
                        notifications.push(Notification::new(
                            NotificationKind::TransferredAsParticipant,
                            registration_id,
                            signup.id,
                            signup.contact,
                        ));
                    }
                    None => {
                        // Paid for a seat that was cancelled meanwhile;
                        // refunding is an operator concern, not ours.
                        tracing::warn!(
                            payment_id = %payment_id,
                            signup_id = %payment.signup_id,
                            "payment settled for a deleted signup"
                        );
                    }
                }
            }
            PaymentOutcome::Cancelled | PaymentOutcome::Expired => {
                let status = match outcome {
                    PaymentOutcome::Cancelled => PaymentStatus::Cancelled,
                    _ => PaymentStatus::Expired,
                };
                tx.update_payment_status(payment_id, status).await?;
                if let Some(stored) = snapshot
                    .payments
                    .iter_mut()
                    .find(|candidate| candidate.id == payment_id)
                {
                    stored.status = status;
                }

                // The offered seat is free again; hand it to the next
                // candidate rather than straight back to the defaulter.
                notifications.extend(
                    self.promotion_pass(&mut tx, &mut snapshot, now, Some(payment.signup_id))
                        .await?,
                );
            }
        }

        tx.commit().await?;
        self.dispatch(&notifications).await;
        Ok(())
    }

    /// Clamped, read-only capacity view for the surrounding application.
    pub async fn capacity(
        &self,
        registration_id: Uuid,
    ) -> Result<RegistrationCapacity, ServiceError> {
        let now = self.clock.now();
        let snapshot = self.store.load(registration_id).await?;
        let view = CapacityAccountant::view(&snapshot, now, None)?;

        Ok(RegistrationCapacity {
            current_attendee_count: view.attending,
            current_waiting_list_count: view.waiting,
            reserved_seats: view.reserved_seats,
            remaining_attendee_capacity: view.remaining_attendee,
            remaining_waiting_list_capacity: view.remaining_waiting,
        })
    }

    async fn remove_signup(
        &self,
        tx: &mut Box<dyn RegistrationTx>,
        snapshot: &mut RegistrationSnapshot,
        signup: &Signup,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if let Some(open) = snapshot
            .payments
            .iter_mut()
            .find(|payment| payment.signup_id == signup.id && payment.is_open(now))
        {
            tx.update_payment_status(open.id, PaymentStatus::Cancelled).await?;
            open.status = PaymentStatus::Cancelled;
        }

        tx.mark_signup_deleted(signup.id).await?;
        if let Some(stored) = snapshot
            .signups
            .iter_mut()
            .find(|stored| stored.id == signup.id)
        {
            stored.deleted = true;
        }
        Ok(())
    }

    /// One promotion pass over the working snapshot, staging the writes on
    /// the open transaction and keeping the snapshot in step with them.
    async fn promotion_pass(
        &self,
        tx: &mut Box<dyn RegistrationTx>,
        snapshot: &mut RegistrationSnapshot,
        now: DateTime<Utc>,
        skip_candidate: Option<Uuid>,
    ) -> Result<Vec<Notification>, ServiceError> {
        let registration_id = snapshot.registration.id;
        let pass = self.promotions.promote(snapshot, now, skip_candidate)?;
        let mut notifications = Vec::new();

        for promoted in &pass.promoted {
            tx.update_signup_status(promoted.signup_id, AttendeeStatus::Attending)
                .await?;
            if let Some(stored) = snapshot
                .signups
                .iter_mut()
                .find(|signup| signup.id == promoted.signup_id)
            {
                stored.status = AttendeeStatus::Attending;
            }
            notifications.push(Notification::new(
                NotificationKind::TransferredAsParticipant,
                registration_id,
                promoted.signup_id,
                promoted.contact.clone(),
            ));
        }

        for pending in pass.payment_pending {
            let mut payment = pending.payment;
            match self
                .payments
                .open_session(&payment, &pending.contact, &pending.price)
                .await
            {
                Ok(reference) => {
                    payment.provider_reference = Some(reference);
                    tx.insert_payment(&payment).await?;

                    let mut notification = Notification::new(
                        NotificationKind::PaymentRequired,
                        registration_id,
                        payment.signup_id,
                        pending.contact,
                    );
                    notification.payment_id = Some(payment.id);
                    notifications.push(notification);

                    snapshot.payments.push(payment);
                }
                Err(err) => {
                    // The candidate stays on the list and the seat stays
                    // free; a later pass will offer it again.
                    tracing::error!(
                        signup_id = %payment.signup_id,
                        error = %err,
                        "could not open payment session for promotion"
                    );
                }
            }
        }

        Ok(notifications)
    }

    async fn dispatch(&self, notifications: &[Notification]) {
        for notification in notifications {
            if let Err(err) = self.notifier.notify(notification).await {
                tracing::warn!(
                    signup_id = %notification.signup_id,
                    kind = ?notification.kind,
                    error = %err,
                    "notification delivery failed"
                );
            }
        }
    }
}

/// Stand-in provider for local runs and tests: every session opens.
pub struct MockPaymentProvider;

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn open_session(
        &self,
        payment: &Payment,
        _contact: &ContactPerson,
        _price: &PriceGroupSnapshot,
    ) -> Result<String, PaymentProviderError> {
        Ok(format!("mock_session_{}", payment.id.simple()))
    }
}
