/// yapdap server
///
/// Startup:
/// - Settings loaded and validated once
/// - Token store opened (migrations applied)
/// - App token and user refresh token resolved, browser flow if needed
/// - Broadcaster resolved, EventSub webhook receiver started
/// - Subscriptions registered once the receiver can answer the challenge
///
/// The user token is revoked on shutdown (Ctrl+C / SIGTERM) and when the
/// server stops with an error.

use std::sync::Arc;
use tokio::net::TcpListener;

use twitch_helix::{Authorizer, SystemBrowser, TokenVault};
use yapdap::config::Settings;
use yapdap::handlers::router;
use yapdap::server;
use yapdap::services::{events, TwitchConnection, WebhookTarget};
use yapdap::store::SqliteTokenStore;
use yapdap::utils::{logging::*, AppError};
use yapdap::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv_loaded = dotenvy::dotenv().is_ok();

    init_tracing();
    if dotenv_loaded {
        tracing::info!("✅ .env file loaded");
    } else {
        tracing::debug!("No .env file found, using process environment");
    }

    let settings = Settings::new()
        .map_err(|e| AppError::ConfigError(format!("Failed to load settings: {}", e)))?;
    settings.validate()?;
    log_config_loaded(&std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string()));

    // Local setup first; no token is minted until the port is held.
    let (events_tx, events_rx) = events::channel(settings.eventsub.channel_capacity);
    let app = router(Arc::new(AppState::new(&settings, events_tx)?));
    log_server_startup(settings.server.port);
    let listener = TcpListener::bind((settings.server.host.as_str(), settings.server.port)).await?;

    let store = SqliteTokenStore::connect(&settings.database.url)
        .await
        .map_err(AppError::from)?;
    let vault = Arc::new(TokenVault::new(Arc::new(store.clone())));
    let authorizer = Arc::new(Authorizer::new(settings.auth_config(), vault, Arc::new(SystemBrowser))?);

    let connection = TwitchConnection::connect(authorizer, settings.twitch.user_name.clone()).await?;
    let consumer = events::spawn_logger(events_rx);

    let target = WebhookTarget {
        callback_url: settings.eventsub.callback_url.clone(),
        secret: settings.eventsub.secret.clone(),
    };
    let requests = if settings.eventsub.subscribe_on_start {
        settings.eventsub.subscription_requests()
    } else {
        Vec::new()
    };

    let served = server::run(listener, app, &connection, &requests, &target, shutdown_signal()).await;

    // The router owned the last sender, so the consumer drains and stops.
    match consumer.await {
        Ok(handled) => log_info(&format!("📊 {} notifications handled", handled)),
        Err(e) => log_error(&format!("❌ Notification consumer failed: {}", e)),
    }
    store.close().await;
    served?;
    Ok(())
}

/// Signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log_error(&format!("failed to install Ctrl+C handler: {}", e));
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log_error(&format!("failed to install SIGTERM handler: {}", e));
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log_info("🛑 Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            log_info("🛑 Received SIGTERM, shutting down gracefully...");
        }
    }
}
