// Serving loop around the EventSub receiver
// Subscriptions are registered once the listener is accepting, and the user
// token is revoked on every way out once the connection exists.

use axum::Router;
use std::future::Future;
use std::io;
use tokio::net::TcpListener;
use twitch_helix::SubscriptionRequest;

use crate::services::{TwitchConnection, WebhookTarget};
use crate::utils::logging::{log_error, log_info, log_server_ready};

/// Serves `app` on `listener` until `shutdown` resolves.
///
/// Twitch posts the verification challenge right after the subscription
/// request, so the server is spawned before any subscription is created.
/// A failed subscription is logged and the server keeps running.
pub async fn run(
    listener: TcpListener,
    app: Router,
    connection: &TwitchConnection,
    requests: &[SubscriptionRequest],
    target: &WebhookTarget,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log_server_ready(&addr.to_string());
    }

    let server = tokio::spawn(async move {
        axum::serve(listener, app).with_graceful_shutdown(shutdown).await
    });

    for request in requests {
        if let Err(e) = connection.create_subscription(request, target).await {
            log_error(&format!("❌ Could not subscribe to {}: {}", request.kind, e));
        }
    }

    let served = match server.await {
        Ok(result) => result,
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    };
    match &served {
        Ok(()) => log_info("🛑 Server shut down gracefully"),
        Err(e) => log_error(&format!("❌ Server stopped: {}", e)),
    }

    if connection.revoke_user_token().await {
        log_info("🚪 User token revoked");
    }

    served
}
