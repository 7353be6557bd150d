use axum::{
    http::Method,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod reservations;
pub mod signups;
pub mod state;
pub mod webhooks;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .route(
            "/v1/registrations/{id}/reservation",
            post(reservations::create_reservation),
        )
        .route(
            "/v1/registrations/{id}/reservation/{code}",
            put(reservations::update_reservation),
        )
        .route(
            "/v1/registrations/{id}/capacity",
            get(reservations::get_capacity),
        )
        .route(
            "/v1/registrations/{id}/signups",
            post(signups::create_signups),
        )
        .route("/v1/signups/{id}", delete(signups::delete_signup))
        .route(
            "/v1/signup-groups/{id}",
            delete(signups::delete_signup_group),
        )
        .route(
            "/v1/webhooks/payments",
            post(webhooks::handle_payment_webhook),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
