use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use super::string_utils::truncate_with_suffix;

/// Installs the fmt subscriber. `RUST_LOG` wins; otherwise `info`.
///
/// Also captures records from the `log` facade used by `twitch_helix`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// First characters of a credential, safe to print.
pub fn redact(token: &str) -> String {
    truncate_with_suffix(token, 6, "…")
}

pub fn log_request_received(endpoint: &str, method: &str) {
    info!("Request received: {} {}", method, endpoint);
}

pub fn log_request_processed(endpoint: &str, status: u16, duration_ms: u64) {
    info!("Request processed: {} - Status: {} - Duration: {}ms",
          endpoint, status, duration_ms);
}

pub fn log_config_loaded(env: &str) {
    info!("Configuration loaded successfully for environment: {}", env);
}

pub fn log_server_startup(port: u16) {
    info!("🚀 yapdap EventSub receiver starting on port {}", port);
}

pub fn log_server_ready(addr: &str) {
    info!("✅ Server ready and listening on http://{}", addr);
}

pub fn log_health_check() {
    debug!("Health check requested");
}

pub fn log_token_ready(kind: &str, token: &str) {
    info!("🔑 {} token ready ({})", kind, redact(token));
}

pub fn log_signature_rejected(reason: &str) {
    warn!("❌ EventSub delivery rejected: {}", reason);
}

pub fn log_subscription_created(kind: &str, id: &str, status: &str) {
    info!("📬 EventSub subscription {} created: {} ({})", kind, id, status);
}

pub fn log_twitch_api_error(operation: &str, error: &str) {
    error!("Twitch API error: {} - Error: {}", operation, error);
}

pub fn log_info(message: &str) {
    info!("{}", message);
}

pub fn log_error(message: &str) {
    error!("{}", message);
}

pub fn log_warning(message: &str) {
    warn!("{}", message);
}
