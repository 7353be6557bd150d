use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use enrol_admission::{MockPaymentProvider, PromotionConfig, SignupService};
use enrol_api::{app, state::AppState};
use enrol_capacity::reservation::ReservationConfig;
use enrol_core::clock::SystemClock;
use enrol_core::notify::LogNotificationSink;
use enrol_store::{DbClient, PgRegistrationStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "enrol_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = enrol_store::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Enrol API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let store = Arc::new(PgRegistrationStore::new(db.pool.clone()));
    let service = Arc::new(SignupService::new(
        store,
        Arc::new(LogNotificationSink),
        Arc::new(MockPaymentProvider),
        Arc::new(SystemClock),
        ReservationConfig {
            base_minutes: config.business_rules.reservation_base_minutes,
        },
        PromotionConfig {
            payment_expiry_minutes: config.business_rules.payment_expiry_minutes,
        },
    ));

    let app = app(AppState { service });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listener")?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
