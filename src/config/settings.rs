use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use twitch_helix::config::env::{
    DEFAULT_API_BASE_URL, DEFAULT_AUTHORIZE_URL, DEFAULT_REVOKE_URL, DEFAULT_SCOPES, DEFAULT_TOKEN_URL,
};
use twitch_helix::{AuthConfig, SubscriptionRequest, CHANNEL_POINTS_REDEMPTION_ADD};

use crate::utils::{AppError, AppResult};

/// Twitch accepts webhook secrets between 10 and 100 ASCII characters.
const WEBHOOK_SECRET_LEN: std::ops::RangeInclusive<usize> = 10..=100;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub twitch: TwitchSettings,
    #[serde(default)]
    pub eventsub: EventSubSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite:yapdap.db".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TwitchSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Login of the broadcaster whose events we subscribe to.
    pub user_name: String,
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub api_base_url: String,
    pub callback_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for TwitchSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:3030/userauth".to_string(),
            user_name: String::new(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            revoke_url: DEFAULT_REVOKE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            callback_timeout_secs: 30,
            http_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EventSubSettings {
    /// HMAC key shared with Twitch when subscribing.
    pub secret: String,
    /// Public HTTPS URL Twitch delivers to, ending in `/eventsub`.
    pub callback_url: String,
    pub subscribe_on_start: bool,
    pub event_types: Vec<String>,
    /// Deliveries older than this are refused; 0 turns the check off.
    pub max_message_age_secs: u64,
    pub channel_capacity: usize,
}

impl Default for EventSubSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            callback_url: String::new(),
            subscribe_on_start: true,
            event_types: vec![CHANNEL_POINTS_REDEMPTION_ADD.to_string()],
            max_message_age_secs: 600,
            channel_capacity: 256,
        }
    }
}

impl EventSubSettings {
    pub fn max_message_age(&self) -> Option<Duration> {
        match self.max_message_age_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn subscription_requests(&self) -> Vec<SubscriptionRequest> {
        self.event_types
            .iter()
            .map(|kind| SubscriptionRequest::new(kind.clone(), "1"))
            .collect()
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            // Base configuration file
            .add_source(File::with_name("config/default").required(false))
            // Environment specific overrides
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(Environment::with_prefix("YAPDAP").separator("__"));

        // Plain variable names used by deployments and .env files
        let overrides = [
            ("TWITCH_CLIENT_ID", "twitch.client_id"),
            ("TWITCH_CLIENT_SECRET", "twitch.client_secret"),
            ("TWITCH_REDIRECT_URI", "twitch.redirect_uri"),
            ("TWITCH_USER_NAME", "twitch.user_name"),
            ("TWITCH_WEBHOOK_SECRET", "eventsub.secret"),
            ("EVENTSUB_CALLBACK_URL", "eventsub.callback_url"),
            ("DATABASE_URL", "database.url"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_override(key, value)?;
            }
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        builder.build()?.try_deserialize()
    }

    fn missing_fields(&self, with_eventsub: bool) -> Vec<&'static str> {
        let mut required = vec![
            ("twitch.client_id", &self.twitch.client_id),
            ("twitch.client_secret", &self.twitch.client_secret),
            ("twitch.redirect_uri", &self.twitch.redirect_uri),
            ("twitch.user_name", &self.twitch.user_name),
        ];
        if with_eventsub {
            required.push(("eventsub.secret", &self.eventsub.secret));
            if self.eventsub.subscribe_on_start {
                required.push(("eventsub.callback_url", &self.eventsub.callback_url));
            }
        }
        required
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }

    /// Settings needed by the OAuth flows alone (operator CLI).
    pub fn validate_twitch(&self) -> AppResult<()> {
        let missing = self.missing_fields(false);
        if !missing.is_empty() {
            return Err(AppError::ConfigError(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }
        self.auth_config().validate()?;
        Ok(())
    }

    /// Reports every missing required field in one error.
    pub fn validate(&self) -> AppResult<()> {
        let missing = self.missing_fields(true);
        if !missing.is_empty() {
            return Err(AppError::ConfigError(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let secret_len = self.eventsub.secret.len();
        if !WEBHOOK_SECRET_LEN.contains(&secret_len) || !self.eventsub.secret.is_ascii() {
            return Err(AppError::ConfigError(format!(
                "eventsub.secret must be 10 to 100 ASCII characters (got {})",
                secret_len
            )));
        }
        if self.eventsub.channel_capacity == 0 {
            return Err(AppError::ConfigError("eventsub.channel_capacity must be at least 1".to_string()));
        }

        self.auth_config().validate()?;
        Ok(())
    }

    /// OAuth client configuration for the `twitch_helix` crate.
    pub fn auth_config(&self) -> AuthConfig {
        let mut config = AuthConfig::new(
            self.twitch.client_id.clone(),
            self.twitch.client_secret.clone(),
            self.twitch.redirect_uri.clone(),
        );
        if !self.twitch.scopes.is_empty() {
            config.scopes = self.twitch.scopes.clone();
        }
        config.authorize_url = self.twitch.authorize_url.clone();
        config.token_url = self.twitch.token_url.clone();
        config.revoke_url = self.twitch.revoke_url.clone();
        config.api_base_url = self.twitch.api_base_url.clone();
        config.callback_timeout = Duration::from_secs(self.twitch.callback_timeout_secs);
        config.http_timeout = Duration::from_secs(self.twitch.http_timeout_secs);
        config
    }
}
