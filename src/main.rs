//! Shelfmark Server - library lending REST API

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfmark::{
    api,
    config::{AppConfig, StoreBackend},
    repository::Repository,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("shelfmark={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Shelfmark Server v{}", env!("CARGO_PKG_VERSION"));

    let repository = match config.database.backend {
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations completed");

            Repository::new(pool)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store: data is lost on shutdown");
            Repository::in_memory()
        }
    };

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );
    let bootstrap = config.bootstrap.clone();

    let state = AppState::new(config, repository);
    state
        .services
        .users
        .ensure_admin(&bootstrap)
        .await
        .context("Failed to create bootstrap admin")?;

    let app = api::create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
