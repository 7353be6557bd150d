use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use enrol_admission::ServiceError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    ConflictError(String),
    CapacityError(String),
    NotFoundError(String),
    InternalServerError(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => AppError::ValidationError(msg),
            ServiceError::Conflict(msg) => AppError::ConflictError(msg),
            ServiceError::CapacityFull(msg) => AppError::CapacityError(msg),
            ServiceError::NotFound(msg) => AppError::NotFoundError(msg),
            ServiceError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::CapacityError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
