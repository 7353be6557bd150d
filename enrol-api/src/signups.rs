use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use enrol_admission::GroupRequest;
use enrol_core::signup::{Signup, SignupRequest};

#[derive(Debug, Deserialize)]
pub struct CreateSignupsRequest {
    pub reservation_code: Uuid,
    pub signups: Vec<SignupRequest>,
    pub group: Option<GroupPayload>,
}

#[derive(Debug, Deserialize)]
pub struct GroupPayload {
    pub extra_info: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSignupsResponse {
    pub group_id: Option<Uuid>,
    pub attending: SignupBucket,
    pub waitlisted: SignupBucket,
}

#[derive(Debug, Serialize)]
pub struct SignupBucket {
    pub count: usize,
    pub people: Vec<Signup>,
}

impl SignupBucket {
    fn from(people: Vec<Signup>) -> Self {
        Self {
            count: people.len(),
            people,
        }
    }
}

/// POST /v1/registrations/{id}/signups
/// Convert a live seat reservation into signups, all of them or none.
pub async fn create_signups(
    State(state): State<AppState>,
    Path(registration_id): Path<Uuid>,
    Json(payload): Json<CreateSignupsRequest>,
) -> Result<(StatusCode, Json<CreateSignupsResponse>), AppError> {
    let group = payload.group.map(|group| GroupRequest {
        extra_info: group.extra_info,
    });

    let result = state
        .service
        .create_signups(
            registration_id,
            payload.reservation_code,
            payload.signups,
            group,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSignupsResponse {
            group_id: result.group_id,
            attending: SignupBucket::from(result.attending),
            waitlisted: SignupBucket::from(result.waitlisted),
        }),
    ))
}

/// DELETE /v1/signups/{id}
pub async fn delete_signup(
    State(state): State<AppState>,
    Path(signup_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.service.delete_signup(signup_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1/signup-groups/{id}
pub async fn delete_signup_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.service.delete_signup_group(group_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
