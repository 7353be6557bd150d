use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use enrol_admission::{RegistrationCapacity, ReservationView};

#[derive(Debug, Deserialize)]
pub struct ReserveSeatsRequest {
    pub seats: u32,
}

/// POST /v1/registrations/{id}/reservation
/// Hold seats ahead of the signup form being filled in.
pub async fn create_reservation(
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
    Json(payload): Json<ReserveSeatsRequest>,
) -> Result<(StatusCode, Json<ReservationView>), AppError> {
    let view = state
        .service
        .create_reservation(registration_id, payload.seats)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// PUT /v1/registrations/{id}/reservation/{code}
/// Change the seat count on a live reservation; the expiry is recomputed
/// from the reservation's creation time for the new seat count.
pub async fn update_reservation(
    State(state): State<AppState>,
    Path((registration_id, code)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ReserveSeatsRequest>,
) -> Result<Json<ReservationView>, AppError> {
    let view = state
        .service
        .update_reservation(registration_id, code, payload.seats)
        .await?;
    Ok(Json(view))
}

/// GET /v1/registrations/{id}/capacity
pub async fn get_capacity(
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<RegistrationCapacity>, AppError> {
    let capacity = state.service.capacity(registration_id).await?;
    Ok(Json(capacity))
}
