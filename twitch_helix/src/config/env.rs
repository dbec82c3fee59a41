use std::time::Duration;
use url::Url;

use crate::error::{AuthError, AuthResult};

pub const DEFAULT_AUTHORIZE_URL: &str = "https://id.twitch.tv/oauth2/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const DEFAULT_REVOKE_URL: &str = "https://id.twitch.tv/oauth2/revoke";
pub const DEFAULT_API_BASE_URL: &str = "https://api.twitch.tv/helix";

/// Scopes requested by the interactive user flow.
pub const DEFAULT_SCOPES: &[&str] = &[
    "user:read:chat",
    "user:write:chat",
    "channel:bot",
    "channel:read:redemptions",
    "channel:manage:redemptions",
];

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// OAuth2 client configuration for the Twitch identity endpoints.
///
/// Built once by the application from its validated settings; nothing in
/// this crate reads the process environment.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub revoke_url: String,
    pub api_base_url: String,
    pub callback_timeout: Duration,
    pub http_timeout: Duration,
}

impl AuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            revoke_url: DEFAULT_REVOKE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Points every endpoint at one base URL. Used against mock servers.
    pub fn with_endpoints(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.authorize_url = format!("{}/oauth2/authorize", base);
        self.token_url = format!("{}/oauth2/token", base);
        self.revoke_url = format!("{}/oauth2/revoke", base);
        self.api_base_url = format!("{}/helix", base);
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Checks every required field and reports all missing ones at once.
    pub fn validate(&self) -> AuthResult<()> {
        let mut missing = Vec::new();
        if self.client_id.trim().is_empty() {
            missing.push("client_id");
        }
        if self.client_secret.trim().is_empty() {
            missing.push("client_secret");
        }
        if self.redirect_uri.trim().is_empty() {
            missing.push("redirect_uri");
        }
        if !missing.is_empty() {
            return Err(AuthError::config_error(format!(
                "missing required OAuth settings: {}",
                missing.join(", ")
            )));
        }

        Url::parse(&self.redirect_uri)
            .map_err(|e| AuthError::config_error(format!("invalid redirect_uri: {}", e)))?;
        for endpoint in [&self.authorize_url, &self.token_url, &self.revoke_url, &self.api_base_url] {
            Url::parse(endpoint)
                .map_err(|e| AuthError::config_error(format!("invalid endpoint {}: {}", endpoint, e)))?;
        }
        Ok(())
    }

    /// Builds the outbound HTTP client with the configured deadline.
    pub fn http_client(&self) -> AuthResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .map_err(|e| AuthError::config_error(format!("failed to build HTTP client: {}", e)))
    }

    /// Authorization URL opened in the operator's browser.
    ///
    /// Scopes are joined with spaces, which form-encoding turns into `+`.
    pub fn authorization_url(&self) -> AuthResult<Url> {
        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| AuthError::config_error(format!("invalid authorize_url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "));
        Ok(url)
    }

    pub fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}
