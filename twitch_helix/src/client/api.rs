use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::auth::client::OAuthClient;
use crate::auth::oauth::{Authorizer, UserTokens};
use crate::auth::token::{PersistRefreshToken, RefreshedTokens, TokenKind, TokenRefreshObserver, TokenVault};
use crate::error::{AuthError, AuthResult};
use crate::eventsub::subscription::{Subscription, SubscriptionMetadata};

/// Which credential a handle carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleScope {
    App,
    User,
}

/// Entry of `GET /users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

/// Helix list responses wrap their items in `data`.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: Vec<T>,
}

struct Credentials {
    access_token: String,
    refresh_token: Option<String>,
}

/// Helix client bound to one currently valid token.
///
/// An app handle renews through the [`Authorizer`]; a user handle refreshes
/// with its refresh token and reports every rotation to the observer before
/// it starts using the new tokens. Either renews at most once per call, on a
/// 401.
pub struct HelixClient {
    scope: HandleScope,
    oauth: OAuthClient,
    credentials: RwLock<Credentials>,
    renewal: Mutex<()>,
    authorizer: Option<Arc<Authorizer>>,
    observer: Option<Arc<dyn TokenRefreshObserver>>,
    vault: Option<Arc<TokenVault>>,
}

impl HelixClient {
    /// App-scoped handle using the authorizer's current app token.
    pub async fn app(authorizer: Arc<Authorizer>) -> AuthResult<Self> {
        let access_token = authorizer.app_token().await?;
        Ok(Self {
            scope: HandleScope::App,
            oauth: authorizer.oauth_client().clone(),
            credentials: RwLock::new(Credentials {
                access_token,
                refresh_token: None,
            }),
            renewal: Mutex::new(()),
            authorizer: Some(authorizer),
            observer: None,
            vault: None,
        })
    }

    /// User-scoped handle. Without an access token in `tokens` (cache hit on
    /// the refresh token) the handle refreshes immediately.
    pub async fn user(
        oauth: OAuthClient,
        tokens: UserTokens,
        observer: Option<Arc<dyn TokenRefreshObserver>>,
    ) -> AuthResult<Self> {
        Self::build_user(oauth, tokens, observer, None).await
    }

    /// User-scoped handle whose refreshes run under the vault's
    /// `UserRefresh` lock and persist the rotated refresh token there.
    ///
    /// Handles sharing one vault (and the interactive flow) never refresh
    /// concurrently; a handle whose refresh token was rotated by another
    /// caller in this process adopts that caller's tokens instead of
    /// spending another grant.
    pub async fn user_in_vault(oauth: OAuthClient, tokens: UserTokens, vault: Arc<TokenVault>) -> AuthResult<Self> {
        let observer: Arc<dyn TokenRefreshObserver> = Arc::new(PersistRefreshToken::new(vault.clone()));
        Self::build_user(oauth, tokens, Some(observer), Some(vault)).await
    }

    async fn build_user(
        oauth: OAuthClient,
        tokens: UserTokens,
        observer: Option<Arc<dyn TokenRefreshObserver>>,
        vault: Option<Arc<TokenVault>>,
    ) -> AuthResult<Self> {
        let needs_refresh = tokens.access_token.is_none();
        let client = Self {
            scope: HandleScope::User,
            oauth,
            credentials: RwLock::new(Credentials {
                access_token: tokens.access_token.unwrap_or_default(),
                refresh_token: Some(tokens.refresh_token),
            }),
            renewal: Mutex::new(()),
            authorizer: None,
            observer,
            vault,
        };

        if needs_refresh {
            client.refresh_user_token().await?;
        }
        Ok(client)
    }

    pub fn scope(&self) -> HandleScope {
        self.scope
    }

    pub async fn access_token(&self) -> String {
        self.credentials.read().await.access_token.clone()
    }

    /// Runs a refresh grant with the current refresh token.
    pub async fn refresh_user_token(&self) -> AuthResult<String> {
        let _guard = self.renewal.lock().await;
        self.refresh_locked().await
    }

    /// Caller holds `renewal`. Lock order is `renewal` then the vault's kind lock.
    async fn refresh_locked(&self) -> AuthResult<String> {
        let _kind_guard = match &self.vault {
            Some(vault) => Some(vault.lock(TokenKind::UserRefresh).await),
            None => None,
        };

        let mut refresh_token = self
            .credentials
            .read()
            .await
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::config_error("app-scoped handles have no refresh token"))?;

        if let Some(vault) = &self.vault {
            if let Some(stored) = vault.load(TokenKind::UserRefresh).await? {
                if stored.value != refresh_token {
                    if let Some(minted) = vault.minted_user_tokens(&stored.value).await {
                        log::info!("🔁 [Helix] Adopting user tokens renewed by another caller");
                        return Ok(self.adopt(minted).await);
                    }
                    refresh_token = stored.value;
                }
            }
        }

        let response = self.oauth.refresh(&refresh_token).await?;
        let refreshed = RefreshedTokens {
            access_token: response.access_token,
            // Twitch rotates refresh tokens, but keep the old one if none came back.
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()).unwrap_or(refresh_token),
        };

        if let Some(observer) = &self.observer {
            observer.on_token_refreshed(&refreshed).await?;
        }
        if let Some(vault) = &self.vault {
            vault.remember_user_tokens(&refreshed).await;
        }

        log::info!("🔄 [Helix] User access token refreshed");
        Ok(self.adopt(refreshed).await)
    }

    async fn adopt(&self, tokens: RefreshedTokens) -> String {
        let mut credentials = self.credentials.write().await;
        credentials.access_token = tokens.access_token.clone();
        credentials.refresh_token = Some(tokens.refresh_token);
        tokens.access_token
    }

    /// Replaces `stale` after a 401, unless a concurrent call already did.
    async fn renew(&self, stale: &str) -> AuthResult<String> {
        let _guard = self.renewal.lock().await;

        let current = self.access_token().await;
        if current != stale {
            return Ok(current);
        }

        match (self.scope, &self.authorizer) {
            (HandleScope::App, Some(authorizer)) => {
                let renewed = authorizer.renew_app_token(stale).await?;
                self.credentials.write().await.access_token = renewed.clone();
                Ok(renewed)
            }
            (HandleScope::App, None) => Err(AuthError::config_error("app handle has no authorizer to renew with")),
            (HandleScope::User, _) => self.refresh_locked().await,
        }
    }

    async fn send_once<T, F>(&self, operation: &'static str, build: &F, token: &str) -> AuthResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = build(self.oauth.http())
            .header("Client-Id", &self.oauth.config().client_id)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::network(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::network(operation, e))?;

        if !status.is_success() {
            return Err(AuthError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| AuthError::parse_error(format!("{} response: {}", operation, e)))
    }

    /// Sends with the current token; on a 401 renews once and retries.
    async fn execute<T, F>(&self, operation: &'static str, build: F) -> AuthResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&Client) -> RequestBuilder,
    {
        let token = self.access_token().await;
        match self.send_once(operation, &build, &token).await {
            Err(AuthError::Api { status: 401, .. }) => {
                log::warn!("⚠️ [Helix] {} got 401, renewing {:?} token", operation, self.scope);
                let renewed = self.renew(&token).await?;
                self.send_once(operation, &build, &renewed).await
            }
            other => other,
        }
    }

    /// `GET /users?login=...`
    pub async fn get_users(&self, logins: &[&str]) -> AuthResult<Vec<HelixUser>> {
        let url = self.oauth.config().api_url("users");
        let query: Vec<(&str, &str)> = logins.iter().map(|login| ("login", *login)).collect();

        let envelope: DataEnvelope<HelixUser> = self
            .execute("get_users", |http| http.get(&url).query(&query))
            .await?;
        Ok(envelope.data)
    }

    /// `POST /eventsub/subscriptions`
    pub async fn create_eventsub_subscription(&self, subscription: &Subscription) -> AuthResult<SubscriptionMetadata> {
        let url = self.oauth.config().api_url("eventsub/subscriptions");

        let envelope: DataEnvelope<SubscriptionMetadata> = self
            .execute("create_subscription", |http| http.post(&url).json(subscription))
            .await?;
        envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::parse_error("create_subscription response has no data"))
    }

    /// Revokes this handle's access token at the identity service.
    pub async fn revoke(&self) -> AuthResult<()> {
        let token = self.access_token().await;
        self.oauth.revoke(&token).await?;
        log::info!("🚪 [Helix] {:?} access token revoked", self.scope);
        Ok(())
    }
}
