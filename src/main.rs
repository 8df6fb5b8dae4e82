// src/main.rs

use std::{net::SocketAddr, sync::Arc, time::Duration};

use dotenvy::dotenv;
use exam_engine::{
    config::{self, Config},
    repositories::{ExamStore, MemoryStore, PgStore},
    routes,
    services::{bank, live::LiveHub},
    state::AppState,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenv().ok();

    let file_appender = tracing_appender::rolling::daily("logs", "exam-engine.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(config::log_directive());
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // stdout plus a daily rolling file
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // After the subscriber, so malformed values are reported
    let config = Config::from_env();

    let (store, live): (Arc<dyn ExamStore>, LiveHub) = match &config.database_url {
        Some(database_url) => {
            let store = connect_postgres(database_url).await;
            let live = LiveHub::with_postgres(config.live_channel_capacity, store.pool().clone())
                .await
                .expect("Failed to listen for store notifications");
            (Arc::new(store), live)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store (data is not persisted)");
            (
                Arc::new(MemoryStore::new()),
                LiveHub::new(config.live_channel_capacity),
            )
        }
    };

    // Seed Question Bank
    if let Some(path) = &config.question_bank_path {
        if let Err(e) = bank::seed_from_file(store.as_ref(), path).await {
            tracing::error!("Failed to seed question bank from {:?}: {:?}", path, e);
        }
    }

    tracing::info!(
        "Cutoff policy: {:?}, question cap: {:?}",
        config.cutoff,
        config.question_cap
    );

    let port = config.port;
    let state = AppState::with_live(store, live, config);

    let app = routes::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Exam engine listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listening address");

    axum::serve(listener, app).await.expect("Server error");
}

/// Connects with retry and applies migrations.
async fn connect_postgres(database_url: &str) -> PgStore {
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Postgres unavailable (attempt {}), retrying in 2s", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected, applying migrations");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    PgStore::new(pool)
}
