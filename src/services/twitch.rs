//! Twitch connection facade
//!
//! Pairs the app-scoped and user-scoped Helix handles and exposes the calls
//! that need a live token: broadcaster lookup, EventSub subscription and
//! user token revocation.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use twitch_helix::eventsub::SubscriptionMetadata;
use twitch_helix::{Authorizer, HelixClient, HelixUser, Subscription, SubscriptionRequest, UserTokens};

use crate::utils::logging::*;
use crate::utils::{AppError, AppResult};

/// Users resolved by login, owned by one connection.
#[derive(Debug, Default)]
pub struct BroadcasterCache {
    users: RwLock<HashMap<String, HelixUser>>,
}

impl BroadcasterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, login: &str) -> Option<HelixUser> {
        self.users.read().await.get(&login.to_lowercase()).cloned()
    }

    pub async fn insert(&self, user: HelixUser) {
        self.users.write().await.insert(user.login.to_lowercase(), user);
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

/// Where Twitch should deliver notifications.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    pub callback_url: String,
    pub secret: String,
}

pub struct TwitchConnection {
    app: HelixClient,
    user: HelixClient,
    broadcaster_login: String,
    broadcasters: BroadcasterCache,
}

impl TwitchConnection {
    /// Resolves both credentials and binds a handle to each.
    ///
    /// A cached refresh token the platform no longer accepts sends the
    /// operator through the browser flow once more.
    pub async fn connect(authorizer: Arc<Authorizer>, broadcaster_login: impl Into<String>) -> AppResult<Self> {
        let app = HelixClient::app(authorizer.clone()).await?;
        log_token_ready("app", &app.access_token().await);

        let tokens = authorizer.user_tokens().await?;
        let user = match Self::bind_user(&authorizer, tokens).await {
            Ok(user) => user,
            Err(e) if e.is_rejection() => {
                log_warning(&format!("⚠️ Stored refresh token rejected ({}), re-authorizing", e));
                let tokens = authorizer.authorize_user_interactive().await?;
                Self::bind_user(&authorizer, tokens).await?
            }
            Err(e) => return Err(e.into()),
        };
        log_token_ready("user", &user.access_token().await);

        let connection = Self::from_handles(app, user, broadcaster_login);
        connection.broadcaster().await?;
        Ok(connection)
    }

    async fn bind_user(authorizer: &Authorizer, tokens: UserTokens) -> twitch_helix::AuthResult<HelixClient> {
        HelixClient::user_in_vault(authorizer.oauth_client().clone(), tokens, authorizer.vault()).await
    }

    pub fn from_handles(app: HelixClient, user: HelixClient, broadcaster_login: impl Into<String>) -> Self {
        Self {
            app,
            user,
            broadcaster_login: broadcaster_login.into(),
            broadcasters: BroadcasterCache::new(),
        }
    }

    pub fn app_handle(&self) -> &HelixClient {
        &self.app
    }

    pub fn user_handle(&self) -> &HelixClient {
        &self.user
    }

    pub fn broadcasters(&self) -> &BroadcasterCache {
        &self.broadcasters
    }

    /// `GET /users?login=`, served from the cache after the first hit.
    pub async fn lookup_user(&self, login: &str) -> AppResult<HelixUser> {
        if let Some(user) = self.broadcasters.get(login).await {
            return Ok(user);
        }

        let user = self
            .app
            .get_users(&[login])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("Twitch user '{}'", login)))?;

        log_info(&format!("👤 Resolved {} to user id {}", user.login, user.id));
        self.broadcasters.insert(user.clone()).await;
        Ok(user)
    }

    /// The configured broadcaster.
    pub async fn broadcaster(&self) -> AppResult<HelixUser> {
        self.lookup_user(&self.broadcaster_login).await
    }

    /// Registers a webhook subscription for the broadcaster with the app token.
    pub async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
        target: &WebhookTarget,
    ) -> AppResult<SubscriptionMetadata> {
        let broadcaster = self.broadcaster().await?;
        let subscription = Subscription::webhook(
            request.kind.clone(),
            request.version.clone(),
            &broadcaster.id,
            target.callback_url.clone(),
            target.secret.clone(),
        );

        match self.app.create_eventsub_subscription(&subscription).await {
            Ok(created) => {
                log_subscription_created(&created.kind, &created.id, &created.status);
                Ok(created)
            }
            Err(e) => {
                log_twitch_api_error("create_subscription", &e.to_string());
                Err(e.into())
            }
        }
    }

    /// Revokes the user access token. Failure is logged, never raised.
    pub async fn revoke_user_token(&self) -> bool {
        match self.user.revoke().await {
            Ok(()) => true,
            Err(e) => {
                log_error(&format!("❌ Failed to revoke user token: {}", e));
                false
            }
        }
    }
}
