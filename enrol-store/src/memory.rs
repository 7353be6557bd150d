use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use enrol_core::payment::{Payment, PaymentStatus};
use enrol_core::registration::Registration;
use enrol_core::repository::{
    RegistrationSnapshot, RegistrationStore, RegistrationTx, StoreError,
};
use enrol_core::reservation::SeatReservation;
use enrol_core::signup::{AttendeeStatus, Signup, SignupGroup};

/// In-memory store for tests and local runs. One mutex guards the whole
/// state, which gives the same serialization the Postgres row lock does,
/// just coarser.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    registrations: Vec<Registration>,
    signups: Vec<Signup>,
    groups: Vec<SignupGroup>,
    reservations: Vec<SeatReservation>,
    payments: Vec<Payment>,
}

impl MemoryState {
    fn snapshot(&self, registration_id: Uuid) -> Result<RegistrationSnapshot, StoreError> {
        let registration = self
            .registrations
            .iter()
            .find(|registration| registration.id == registration_id)
            .cloned()
            .ok_or(StoreError::RegistrationNotFound(registration_id))?;
        Ok(RegistrationSnapshot {
            registration,
            signups: self
                .signups
                .iter()
                .filter(|signup| signup.registration_id == registration_id)
                .cloned()
                .collect(),
            reservations: self
                .reservations
                .iter()
                .filter(|reservation| reservation.registration_id == registration_id)
                .cloned()
                .collect(),
            payments: self
                .payments
                .iter()
                .filter(|payment| payment.registration_id == registration_id)
                .cloned()
                .collect(),
        })
    }

    fn apply(&mut self, write: StagedWrite) -> Result<(), StoreError> {
        match write {
            StagedWrite::InsertReservation(reservation) => self.reservations.push(reservation),
            StagedWrite::UpdateReservation(reservation) => {
                let stored = self
                    .reservations
                    .iter_mut()
                    .find(|stored| stored.id == reservation.id)
                    .ok_or(StoreError::ReservationNotFound(reservation.id))?;
                *stored = reservation;
            }
            StagedWrite::DeleteReservation(id) => {
                self.reservations.retain(|reservation| reservation.id != id);
            }
            StagedWrite::InsertGroup(group) => self.groups.push(group),
            StagedWrite::MarkGroupDeleted(id) => {
                let group = self
                    .groups
                    .iter_mut()
                    .find(|group| group.id == id)
                    .ok_or(StoreError::SignupGroupNotFound(id))?;
                group.deleted = true;
            }
            StagedWrite::InsertSignup(signup) => self.signups.push(signup),
            StagedWrite::UpdateSignupStatus(id, status) => {
                let signup = self
                    .signups
                    .iter_mut()
                    .find(|signup| signup.id == id)
                    .ok_or(StoreError::SignupNotFound(id))?;
                signup.status = status;
            }
            StagedWrite::MarkSignupDeleted(id) => {
                let signup = self
                    .signups
                    .iter_mut()
                    .find(|signup| signup.id == id)
                    .ok_or(StoreError::SignupNotFound(id))?;
                signup.deleted = true;
            }
            StagedWrite::InsertPayment(payment) => self.payments.push(payment),
            StagedWrite::UpdatePaymentStatus(id, status) => {
                let payment = self
                    .payments
                    .iter_mut()
                    .find(|payment| payment.id == id)
                    .ok_or(StoreError::PaymentNotFound(id))?;
                payment.status = status;
            }
        }
        Ok(())
    }
}

enum StagedWrite {
    InsertReservation(SeatReservation),
    UpdateReservation(SeatReservation),
    DeleteReservation(Uuid),
    InsertGroup(SignupGroup),
    MarkGroupDeleted(Uuid),
    InsertSignup(Signup),
    UpdateSignupStatus(Uuid, AttendeeStatus),
    MarkSignupDeleted(Uuid),
    InsertPayment(Payment),
    UpdatePaymentStatus(Uuid, PaymentStatus),
}

/// Writes are staged and only hit the shared state on commit; dropping
/// the transaction discards them.
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: RegistrationSnapshot,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl RegistrationTx for MemoryTx {
    fn snapshot(&self) -> RegistrationSnapshot {
        self.snapshot.clone()
    }

    async fn insert_reservation(
        &mut self,
        reservation: &SeatReservation,
    ) -> Result<(), StoreError> {
        self.staged
            .push(StagedWrite::InsertReservation(reservation.clone()));
        Ok(())
    }

    async fn update_reservation(
        &mut self,
        reservation: &SeatReservation,
    ) -> Result<(), StoreError> {
        self.staged
            .push(StagedWrite::UpdateReservation(reservation.clone()));
        Ok(())
    }

    async fn delete_reservation(&mut self, reservation_id: Uuid) -> Result<(), StoreError> {
        self.staged.push(StagedWrite::DeleteReservation(reservation_id));
        Ok(())
    }

    async fn insert_group(&mut self, group: &SignupGroup) -> Result<(), StoreError> {
        self.staged.push(StagedWrite::InsertGroup(group.clone()));
        Ok(())
    }

    async fn mark_group_deleted(&mut self, group_id: Uuid) -> Result<(), StoreError> {
        self.staged.push(StagedWrite::MarkGroupDeleted(group_id));
        Ok(())
    }

    async fn insert_signups(&mut self, signups: &[Signup]) -> Result<(), StoreError> {
        for signup in signups {
            self.staged.push(StagedWrite::InsertSignup(signup.clone()));
        }
        Ok(())
    }

    async fn update_signup_status(
        &mut self,
        signup_id: Uuid,
        status: AttendeeStatus,
    ) -> Result<(), StoreError> {
        self.staged
            .push(StagedWrite::UpdateSignupStatus(signup_id, status));
        Ok(())
    }

    async fn mark_signup_deleted(&mut self, signup_id: Uuid) -> Result<(), StoreError> {
        self.staged.push(StagedWrite::MarkSignupDeleted(signup_id));
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        self.staged.push(StagedWrite::InsertPayment(payment.clone()));
        Ok(())
    }

    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), StoreError> {
        self.staged
            .push(StagedWrite::UpdatePaymentStatus(payment_id, status));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = *self;
        for write in this.staged.drain(..) {
            this.guard.apply(write)?;
        }
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_registration(&self, registration: Registration) {
        self.state.lock().await.registrations.push(registration);
    }

    pub async fn insert_signup(&self, signup: Signup) {
        self.state.lock().await.signups.push(signup);
    }

    pub async fn get_signup(&self, signup_id: Uuid) -> Option<Signup> {
        self.state
            .lock()
            .await
            .signups
            .iter()
            .find(|signup| signup.id == signup_id)
            .cloned()
    }

    pub async fn list_signups(&self, registration_id: Uuid) -> Vec<Signup> {
        self.state
            .lock()
            .await
            .signups
            .iter()
            .filter(|signup| signup.registration_id == registration_id)
            .cloned()
            .collect()
    }

    pub async fn list_payments(&self, registration_id: Uuid) -> Vec<Payment> {
        self.state
            .lock()
            .await
            .payments
            .iter()
            .filter(|payment| payment.registration_id == registration_id)
            .cloned()
            .collect()
    }

    pub async fn list_reservations(&self, registration_id: Uuid) -> Vec<SeatReservation> {
        self.state
            .lock()
            .await
            .reservations
            .iter()
            .filter(|reservation| reservation.registration_id == registration_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn lock_registration(
        &self,
        registration_id: Uuid,
    ) -> Result<Box<dyn RegistrationTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.snapshot(registration_id)?;
        Ok(Box::new(MemoryTx {
            guard,
            snapshot,
            staged: Vec::new(),
        }))
    }

    async fn load(&self, registration_id: Uuid) -> Result<RegistrationSnapshot, StoreError> {
        self.state.lock().await.snapshot(registration_id)
    }

    async fn find_signup_registration(
        &self,
        signup_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .signups
            .iter()
            .find(|signup| signup.id == signup_id && !signup.deleted)
            .map(|signup| signup.registration_id))
    }

    async fn find_group_registration(
        &self,
        group_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .groups
            .iter()
            .find(|group| group.id == group_id && !group.deleted)
            .map(|group| group.registration_id))
    }

    async fn find_payment_registration(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .payments
            .iter()
            .find(|payment| payment.id == payment_id)
            .map(|payment| payment.registration_id))
    }
}
