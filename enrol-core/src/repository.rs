use async_trait::async_trait;
use uuid::Uuid;

use crate::payment::{Payment, PaymentStatus};
use crate::registration::Registration;
use crate::reservation::SeatReservation;
use crate::signup::{AttendeeStatus, Signup, SignupGroup};

/// Everything the domain logic needs to know about one registration,
/// read under the registration lock. Soft-deleted rows are included;
/// filtering them is the reader's job.
#[derive(Debug, Clone)]
pub struct RegistrationSnapshot {
    pub registration: Registration,
    pub signups: Vec<Signup>,
    pub reservations: Vec<SeatReservation>,
    pub payments: Vec<Payment>,
}

impl RegistrationSnapshot {
    pub fn signup(&self, id: Uuid) -> Option<&Signup> {
        self.signups.iter().find(|signup| signup.id == id)
    }

    pub fn reservation_by_code(&self, code: Uuid) -> Option<&SeatReservation> {
        self.reservations
            .iter()
            .find(|reservation| reservation.code == code)
    }

    pub fn payment(&self, id: Uuid) -> Option<&Payment> {
        self.payments.iter().find(|payment| payment.id == id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("registration not found: {0}")]
    RegistrationNotFound(Uuid),

    #[error("signup not found: {0}")]
    SignupNotFound(Uuid),

    #[error("signup group not found: {0}")]
    SignupGroupNotFound(Uuid),

    #[error("reservation not found: {0}")]
    ReservationNotFound(Uuid),

    #[error("payment not found: {0}")]
    PaymentNotFound(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A transaction holding the exclusive lock on one registration's rows.
/// Two concurrent requests must not both read "1 seat free", so every
/// capacity check plus its writes happens inside one of these. Dropping
/// the transaction without committing rolls every staged write back.
#[async_trait]
pub trait RegistrationTx: Send {
    /// State as of lock acquisition. Callers that mutate keep their own
    /// working copy in step with the writes they issue.
    fn snapshot(&self) -> RegistrationSnapshot;

    async fn insert_reservation(&mut self, reservation: &SeatReservation)
        -> Result<(), StoreError>;
    async fn update_reservation(&mut self, reservation: &SeatReservation)
        -> Result<(), StoreError>;
    async fn delete_reservation(&mut self, reservation_id: Uuid) -> Result<(), StoreError>;

    async fn insert_group(&mut self, group: &SignupGroup) -> Result<(), StoreError>;
    async fn mark_group_deleted(&mut self, group_id: Uuid) -> Result<(), StoreError>;

    async fn insert_signups(&mut self, signups: &[Signup]) -> Result<(), StoreError>;
    async fn update_signup_status(
        &mut self,
        signup_id: Uuid,
        status: AttendeeStatus,
    ) -> Result<(), StoreError>;
    async fn mark_signup_deleted(&mut self, signup_id: Uuid) -> Result<(), StoreError>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;
    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// The only persistence seam the core uses.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Lock the registration's counters for a capacity check plus writes.
    async fn lock_registration(
        &self,
        registration_id: Uuid,
    ) -> Result<Box<dyn RegistrationTx>, StoreError>;

    /// Read-only snapshot, no lock. Used by the public capacity view.
    async fn load(&self, registration_id: Uuid) -> Result<RegistrationSnapshot, StoreError>;

    /// Resolve a signup to its registration without taking the lock.
    async fn find_signup_registration(
        &self,
        signup_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError>;

    async fn find_group_registration(&self, group_id: Uuid)
        -> Result<Option<Uuid>, StoreError>;

    /// Resolve a payment handle to its registration.
    async fn find_payment_registration(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError>;
}
