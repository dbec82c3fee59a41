//! Token endpoint client
//!
//! Form-encoded grants against the Twitch identity service. Responses are
//! decoded by hand because Twitch returns `scope` as a JSON array.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};

/// Body of a successful token grant.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Grants against the Twitch token endpoint, sharing one HTTP client.
#[derive(Clone)]
pub struct OAuthClient {
    config: Arc<AuthConfig>,
    http: Client,
}

impl OAuthClient {
    pub fn new(config: Arc<AuthConfig>, http: Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Client-credentials grant for the application token.
    pub async fn client_credentials(&self) -> AuthResult<TokenResponse> {
        log::info!("🔐 [OAuth2] Requesting application token (client_credentials)");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "client_credentials"),
        ];
        self.grant("client_credentials", &params).await
    }

    /// Authorization-code grant. The code is moved in so it cannot be
    /// exchanged a second time by the caller.
    pub async fn exchange_code(&self, code: String) -> AuthResult<TokenResponse> {
        log::info!("🔄 [OAuth2] Exchanging authorization code for user tokens");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code.as_str()),
        ];
        let response = self.grant("authorization_code", &params).await?;
        if response.refresh_token.as_deref().map_or(true, str::is_empty) {
            return Err(AuthError::parse_error(
                "authorization_code grant returned no refresh_token",
            ));
        }
        Ok(response)
    }

    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        log::info!("🔄 [OAuth2] Refreshing user access token");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.grant("refresh_token", &params).await
    }

    pub async fn revoke(&self, token: &str) -> AuthResult<()> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("token", token),
        ];
        let response = self
            .http
            .post(&self.config.revoke_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::network("revoke", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Authentication {
                operation: "revoke",
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn grant(&self, operation: &'static str, params: &[(&str, &str)]) -> AuthResult<TokenResponse> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::network(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            log::error!("❌ [OAuth2] {} failed: {} - {}", operation, status, body);
            return Err(AuthError::Authentication {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::network(operation, e))?;
        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::parse_error(format!("{} response: {}", operation, e)))?;

        if token.access_token.is_empty() {
            return Err(AuthError::parse_error(format!("{} response has an empty access_token", operation)));
        }
        Ok(token)
    }
}
