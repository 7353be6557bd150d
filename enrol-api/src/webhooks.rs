use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use enrol_admission::PaymentOutcome;

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub payment_id: Uuid,
    pub outcome: PaymentOutcome,
}

/// POST /v1/webhooks/payments
/// Receive payment settlement callbacks from the provider.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentWebhook>,
) -> Result<StatusCode, AppError> {
    tracing::info!(
        payment_id = %payload.payment_id,
        outcome = ?payload.outcome,
        "received payment webhook"
    );

    state
        .service
        .handle_payment_webhook(payload.payment_id, payload.outcome)
        .await?;

    Ok(StatusCode::OK)
}
