use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use seatline_api::{app, AppState, AuthConfig};
use seatline_catalog::{seed, FarePolicy, ScheduleBook, ScheduleRepository};
use seatline_core::locks::SeatLockManager;
use seatline_core::repository::BookingLedger;
use seatline_order::{BookingConfig, BookingManager, MockPaymentGateway};
use seatline_store::app_config::{LockBackend, StorageBackend};
use seatline_store::{
    Config, DbClient, EventPublisher, LocalSeatLocks, MemoryLedger, MemorySchedule, PgBookingLedger,
    PgScheduleRepository, RedisSeatLocks,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seatline_api=debug,seatline_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("failed to load config")?;
    tracing::info!("Starting Seatline API on port {}", config.server.port);

    let (ledger, schedule): (Arc<dyn BookingLedger>, Arc<dyn ScheduleRepository>) = match config.storage.backend {
        StorageBackend::Memory => {
            let mut book = ScheduleBook::new();
            if config.business_rules.seed_demo {
                seed::demo_corridor(&mut book, Utc::now().date_naive()).context("failed to seed demo corridor")?;
                tracing::info!("Demo corridor seeded");
            }
            (Arc::new(MemoryLedger::new()), Arc::new(MemorySchedule::new(book)))
        }
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url)
                .await
                .context("failed to connect to Postgres")?;
            db.migrate().await.context("failed to run migrations")?;
            if config.business_rules.seed_demo {
                tracing::warn!("seed_demo is only honoured by the memory backend");
            }
            (
                Arc::new(PgBookingLedger::new(db.pool.clone())),
                Arc::new(PgScheduleRepository::new(db.pool)),
            )
        }
    };

    let locks: Arc<dyn SeatLockManager> = match config.locks.backend {
        LockBackend::Local => Arc::new(LocalSeatLocks::new()),
        LockBackend::Redis => Arc::new(
            RedisSeatLocks::new(&config.redis.url, config.locks.ttl_ms, config.locks.acquire_timeout_ms)
                .context("invalid Redis URL")?,
        ),
    };
    tracing::info!(storage = ?config.storage.backend, locks = ?config.locks.backend, "Backends selected");

    let rules = &config.business_rules;
    let booking_config = BookingConfig {
        fare: FarePolicy::new(rules.fare_paise, rules.currency.clone()),
        require_payment: rules.require_payment,
    };
    let gateway = Arc::new(MockPaymentGateway::new(
        config.payment.key_id.clone(),
        config.payment.key_secret.clone(),
    ));
    let events = EventPublisher::default();
    let manager = BookingManager::new(schedule.clone(), ledger, locks, gateway, events.clone(), booking_config);

    let state = AppState {
        manager: Arc::new(manager),
        schedule,
        events,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
