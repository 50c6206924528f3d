use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use ridepool_api::{app, AppState, AuthConfig};
use ridepool_store::{app_config::Config, DbClient, PgStore, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ridepool_api=debug,ridepool_bookings=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Ridepool API on port {}", config.server.port);

    // Database Connection
    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let store = Arc::new(PgStore::new(db.pool.clone()));

    let mut app_state = AppState::new(
        store,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        &config.relay,
        &config.search,
    );

    // Redis Connection (optional, rate limiting only)
    match config.redis.url.as_deref() {
        Some(url) => {
            let redis = RedisClient::new(url).context("Invalid Redis URL")?;
            app_state = app_state.with_rate_limit(redis, config.rate_limit.clone());
        }
        None => tracing::warn!("No Redis configured, rate limiting disabled"),
    }

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;

    Ok(())
}
