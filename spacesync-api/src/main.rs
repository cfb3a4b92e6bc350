use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spacesync_api::{app, worker, AppState, AuthConfig};
use spacesync_store::app_config::Config;
use spacesync_store::RedisClient;
use spacesync_timetable::{GeminiParser, PdfTextExtractor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spacesync_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting SpaceSync API on port {}", config.server.port);

    let store = spacesync_store::connect(&config.storage)
        .await
        .context("Failed to open storage")?;

    if config.timetable.gemini_api_key.is_none() {
        tracing::warn!("No Gemini API key configured; timetable uploads will fail");
    }
    let parser = GeminiParser::new(
        config.timetable.endpoint.clone(),
        config.timetable.model.clone(),
        config.timetable.gemini_api_key.clone(),
    );

    let mut state = AppState::new(
        store,
        Arc::new(PdfTextExtractor),
        Arc::new(parser),
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        &config.booking_rules,
    )?
    .with_cors_origins(config.server.cors_origins.clone())
    .with_max_upload_bytes(config.timetable.max_upload_bytes);

    // Rate limiting is optional and fails open
    if let Some(url) = config.redis.url.as_deref() {
        match RedisClient::new(url).await {
            Ok(client) => state = state.with_redis(Arc::new(client)),
            Err(e) => tracing::warn!("Redis unavailable, rate limiting disabled: {}", e),
        }
    }

    let shutdown = CancellationToken::new();
    let sweeper = worker::spawn_expiry_sweeper(
        state.sweeper.clone(),
        Duration::from_secs(config.booking_rules.sweep_interval_seconds.max(1)),
        state.metrics.clone(),
        shutdown.clone(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown.cancel();
    sweeper.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}
