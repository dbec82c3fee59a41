// yapdap library
// Exposes modules for the binaries and the integration tests

pub mod config;
pub mod handlers;
pub mod server;
pub mod services;
pub mod store;
pub mod utils;

use std::time::Duration;
use tokio::sync::mpsc;
use twitch_helix::eventsub::Notification;
use twitch_helix::WebhookVerifier;

/// Shared by every webhook request.
#[derive(Clone)]
pub struct AppState {
    pub verifier: WebhookVerifier,
    pub max_message_age: Option<Duration>,
    pub events: mpsc::Sender<Notification>,
}

impl AppState {
    pub fn new(
        settings: &config::Settings,
        events: mpsc::Sender<Notification>,
    ) -> utils::AppResult<Self> {
        Ok(Self {
            verifier: WebhookVerifier::new(&settings.eventsub.secret)?,
            max_message_age: settings.eventsub.max_message_age(),
            events,
        })
    }
}
