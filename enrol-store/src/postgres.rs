use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use enrol_core::payment::{Payment, PaymentStatus};
use enrol_core::registration::Registration;
use enrol_core::repository::{
    RegistrationSnapshot, RegistrationStore, RegistrationTx, StoreError,
};
use enrol_core::reservation::SeatReservation;
use enrol_core::signup::{AttendeeStatus, ContactPerson, Signup, SignupGroup};

pub struct PgRegistrationStore {
    pool: PgPool,
}

impl PgRegistrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct RegistrationRow {
    id: Uuid,
    maximum_attendee_capacity: Option<i32>,
    waiting_list_capacity: Option<i32>,
    maximum_group_size: Option<i32>,
    enrolment_start: Option<DateTime<Utc>>,
    enrolment_end: Option<DateTime<Utc>>,
    price_groups: Value,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SignupRow {
    id: Uuid,
    registration_id: Uuid,
    group_id: Option<Uuid>,
    status: String,
    first_name: String,
    last_name: String,
    email: String,
    price: Option<Value>,
    responsible_for_group: bool,
    deleted: bool,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    registration_id: Uuid,
    code: Uuid,
    seats: i32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    signup_id: Uuid,
    registration_id: Uuid,
    amount_cents: i64,
    status: String,
    provider_reference: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn corrupt(what: &str, id: Uuid) -> StoreError {
    StoreError::Backend(format!("corrupt {what} row: {id}"))
}

impl RegistrationRow {
    fn into_registration(self) -> Result<Registration, StoreError> {
        let price_groups = serde_json::from_value(self.price_groups)
            .map_err(|_| corrupt("registration", self.id))?;
        Ok(Registration {
            id: self.id,
            maximum_attendee_capacity: self.maximum_attendee_capacity.map(|n| n as u32),
            waiting_list_capacity: self.waiting_list_capacity.map(|n| n as u32),
            maximum_group_size: self.maximum_group_size.map(|n| n as u32),
            enrolment_start: self.enrolment_start,
            enrolment_end: self.enrolment_end,
            price_groups,
            created_at: self.created_at,
        })
    }
}

impl SignupRow {
    fn into_signup(self) -> Result<Signup, StoreError> {
        let status =
            AttendeeStatus::parse(&self.status).ok_or_else(|| corrupt("signup", self.id))?;
        let price = match self.price {
            Some(value) => {
                Some(serde_json::from_value(value).map_err(|_| corrupt("signup", self.id))?)
            }
            None => None,
        };
        Ok(Signup {
            id: self.id,
            registration_id: self.registration_id,
            group_id: self.group_id,
            status,
            contact: ContactPerson {
                first_name: self.first_name,
                last_name: self.last_name,
                email: self.email,
            },
            price,
            responsible_for_group: self.responsible_for_group,
            deleted: self.deleted,
            created_at: self.created_at,
        })
    }
}

impl ReservationRow {
    fn into_reservation(self) -> SeatReservation {
        SeatReservation {
            id: self.id,
            registration_id: self.registration_id,
            code: self.code,
            seats: self.seats.max(0) as u32,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, StoreError> {
        let status =
            PaymentStatus::parse(&self.status).ok_or_else(|| corrupt("payment", self.id))?;
        Ok(Payment {
            id: self.id,
            signup_id: self.signup_id,
            registration_id: self.registration_id,
            amount_cents: self.amount_cents,
            status,
            provider_reference: self.provider_reference,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

/// Read one registration and its child rows on the given connection.
/// `lock` adds FOR UPDATE on the registration row, which is the lock
/// every writer takes, so concurrent capacity checks serialize on it.
async fn read_snapshot(
    conn: &mut PgConnection,
    registration_id: Uuid,
    lock: bool,
) -> Result<RegistrationSnapshot, StoreError> {
    let select = if lock {
        "SELECT id, maximum_attendee_capacity, waiting_list_capacity, maximum_group_size, \
         enrolment_start, enrolment_end, price_groups, created_at \
         FROM registrations WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, maximum_attendee_capacity, waiting_list_capacity, maximum_group_size, \
         enrolment_start, enrolment_end, price_groups, created_at \
         FROM registrations WHERE id = $1"
    };

    let registration_row = sqlx::query_as::<_, RegistrationRow>(select)
        .bind(registration_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?
        .ok_or(StoreError::RegistrationNotFound(registration_id))?;
    let registration = registration_row.into_registration()?;

    let signup_rows = sqlx::query_as::<_, SignupRow>(
        "SELECT id, registration_id, group_id, status, first_name, last_name, email, \
         price, responsible_for_group, deleted, created_at \
         FROM signups WHERE registration_id = $1 ORDER BY created_at, id",
    )
    .bind(registration_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)?;
    let signups = signup_rows
        .into_iter()
        .map(SignupRow::into_signup)
        .collect::<Result<Vec<_>, _>>()?;

    let reservation_rows = sqlx::query_as::<_, ReservationRow>(
        "SELECT id, registration_id, code, seats, created_at, expires_at \
         FROM seat_reservations WHERE registration_id = $1",
    )
    .bind(registration_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)?;
    let reservations = reservation_rows
        .into_iter()
        .map(ReservationRow::into_reservation)
        .collect();

    let payment_rows = sqlx::query_as::<_, PaymentRow>(
        "SELECT id, signup_id, registration_id, amount_cents, status, \
         provider_reference, created_at, expires_at \
         FROM payments WHERE registration_id = $1",
    )
    .bind(registration_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(backend)?;
    let payments = payment_rows
        .into_iter()
        .map(PaymentRow::into_payment)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RegistrationSnapshot {
        registration,
        signups,
        reservations,
        payments,
    })
}

pub struct PgRegistrationTx {
    tx: Transaction<'static, Postgres>,
    snapshot: RegistrationSnapshot,
}

#[async_trait]
impl RegistrationTx for PgRegistrationTx {
    fn snapshot(&self) -> RegistrationSnapshot {
        self.snapshot.clone()
    }

    async fn insert_reservation(
        &mut self,
        reservation: &SeatReservation,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO seat_reservations (id, registration_id, code, seats, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(reservation.id)
        .bind(reservation.registration_id)
        .bind(reservation.code)
        .bind(reservation.seats as i32)
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn update_reservation(
        &mut self,
        reservation: &SeatReservation,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE seat_reservations SET seats = $1, expires_at = $2 WHERE id = $3",
        )
        .bind(reservation.seats as i32)
        .bind(reservation.expires_at)
        .bind(reservation.id)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ReservationNotFound(reservation.id));
        }
        Ok(())
    }

    async fn delete_reservation(&mut self, reservation_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM seat_reservations WHERE id = $1")
            .bind(reservation_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn insert_group(&mut self, group: &SignupGroup) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO signup_groups (id, registration_id, extra_info, deleted, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(group.id)
        .bind(group.registration_id)
        .bind(&group.extra_info)
        .bind(group.deleted)
        .bind(group.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn mark_group_deleted(&mut self, group_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE signup_groups SET deleted = TRUE WHERE id = $1")
            .bind(group_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::SignupGroupNotFound(group_id));
        }
        Ok(())
    }

    async fn insert_signups(&mut self, signups: &[Signup]) -> Result<(), StoreError> {
        for signup in signups {
            let price = match &signup.price {
                Some(snapshot) => Some(
                    serde_json::to_value(snapshot)
                        .map_err(|err| StoreError::Backend(err.to_string()))?,
                ),
                None => None,
            };
            sqlx::query(
                "INSERT INTO signups (id, registration_id, group_id, status, first_name, \
                 last_name, email, price, responsible_for_group, deleted, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(signup.id)
            .bind(signup.registration_id)
            .bind(signup.group_id)
            .bind(signup.status.as_str())
            .bind(&signup.contact.first_name)
            .bind(&signup.contact.last_name)
            .bind(&signup.contact.email)
            .bind(price)
            .bind(signup.responsible_for_group)
            .bind(signup.deleted)
            .bind(signup.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        }
        Ok(())
    }

    async fn update_signup_status(
        &mut self,
        signup_id: Uuid,
        status: AttendeeStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE signups SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(signup_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::SignupNotFound(signup_id));
        }
        Ok(())
    }

    async fn mark_signup_deleted(&mut self, signup_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE signups SET deleted = TRUE WHERE id = $1")
            .bind(signup_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::SignupNotFound(signup_id));
        }
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payments (id, signup_id, registration_id, amount_cents, status, \
             provider_reference, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(payment.id)
        .bind(payment.signup_id)
        .bind(payment.registration_id)
        .bind(payment.amount_cents)
        .bind(payment.status.as_str())
        .bind(&payment.provider_reference)
        .bind(payment.created_at)
        .bind(payment.expires_at)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn update_payment_status(
        &mut self,
        payment_id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE payments SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(payment_id)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::PaymentNotFound(payment_id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(backend)
    }
}

#[async_trait]
impl RegistrationStore for PgRegistrationStore {
    async fn lock_registration(
        &self,
        registration_id: Uuid,
    ) -> Result<Box<dyn RegistrationTx>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let snapshot = read_snapshot(&mut tx, registration_id, true).await?;
        Ok(Box::new(PgRegistrationTx { tx, snapshot }))
    }

    async fn load(&self, registration_id: Uuid) -> Result<RegistrationSnapshot, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        read_snapshot(&mut conn, registration_id, false).await
    }

    async fn find_signup_registration(
        &self,
        signup_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT registration_id FROM signups WHERE id = $1 AND deleted = FALSE",
        )
        .bind(signup_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(|(id,)| id))
    }

    async fn find_group_registration(
        &self,
        group_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT registration_id FROM signup_groups WHERE id = $1 AND deleted = FALSE",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.map(|(id,)| id))
    }

    async fn find_payment_registration(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT registration_id FROM payments WHERE id = $1")
                .bind(payment_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(row.map(|(id,)| id))
    }
}
