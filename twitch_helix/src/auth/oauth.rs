use std::sync::Arc;

use crate::auth::callback::CallbackServer;
use crate::auth::client::{OAuthClient, TokenResponse};
use crate::auth::token::{RefreshedTokens, TokenKind, TokenVault};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};

/// Opens the authorization URL for the operator.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> AuthResult<()>;
}

/// Uses the host's default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        webbrowser::open(url).map_err(|e| AuthError::browser_error(e.to_string()))
    }
}

/// Result of the user-token flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTokens {
    /// Present only when the interactive flow ran in this call.
    pub access_token: Option<String>,
    pub refresh_token: String,
    pub scopes: Vec<String>,
}

/// Resolves the application token and the user refresh token, from the
/// vault when possible and from the token endpoint otherwise.
pub struct Authorizer {
    oauth: OAuthClient,
    vault: Arc<TokenVault>,
    browser: Arc<dyn BrowserLauncher>,
}

impl Authorizer {
    pub fn new(config: AuthConfig, vault: Arc<TokenVault>, browser: Arc<dyn BrowserLauncher>) -> AuthResult<Self> {
        config.validate()?;
        let http = config.http_client()?;
        Ok(Self {
            oauth: OAuthClient::new(Arc::new(config), http),
            vault,
            browser,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        self.oauth.config()
    }

    pub fn oauth_client(&self) -> &OAuthClient {
        &self.oauth
    }

    pub fn vault(&self) -> Arc<TokenVault> {
        self.vault.clone()
    }

    /// Application token: cached value if any, else a client-credentials grant.
    pub async fn app_token(&self) -> AuthResult<String> {
        let _guard = self.vault.lock(TokenKind::App).await;

        if let Some(token) = self.vault.load(TokenKind::App).await? {
            log::info!("🔑 [Authorizer] Using cached app token");
            return Ok(token.value);
        }

        log::info!("🆕 [Authorizer] No cached app token, requesting a new one");
        self.exchange_app_token().await
    }

    /// Replaces an app token the API just rejected.
    ///
    /// If the stored value already differs from `stale`, another caller
    /// renewed it while we waited on the lock and that value is returned.
    pub async fn renew_app_token(&self, stale: &str) -> AuthResult<String> {
        let _guard = self.vault.lock(TokenKind::App).await;

        if let Some(token) = self.vault.load(TokenKind::App).await? {
            if token.value != stale {
                return Ok(token.value);
            }
        }

        log::warn!("♻️ [Authorizer] App token rejected, renewing");
        self.exchange_app_token().await
    }

    /// User tokens: cached refresh token if any, else the interactive flow.
    pub async fn user_tokens(&self) -> AuthResult<UserTokens> {
        let _guard = self.vault.lock(TokenKind::UserRefresh).await;

        if let Some(token) = self.vault.load(TokenKind::UserRefresh).await? {
            log::info!("🔑 [Authorizer] Using cached refresh token");
            return Ok(UserTokens {
                access_token: None,
                refresh_token: token.value,
                scopes: Vec::new(),
            });
        }

        log::info!("🆕 [Authorizer] No cached refresh token, starting interactive authorization");
        self.interactive_flow().await
    }

    /// Runs the browser handshake regardless of what is cached.
    pub async fn authorize_user_interactive(&self) -> AuthResult<UserTokens> {
        let _guard = self.vault.lock(TokenKind::UserRefresh).await;
        self.interactive_flow().await
    }

    async fn exchange_app_token(&self) -> AuthResult<String> {
        let response = self.oauth.client_credentials().await?;
        self.vault.save(TokenKind::App, &response.access_token).await?;
        log::info!("✅ [Authorizer] App authorization renewed");
        Ok(response.access_token)
    }

    /// Caller holds the UserRefresh lock.
    async fn interactive_flow(&self) -> AuthResult<UserTokens> {
        let config = self.oauth.config();
        let auth_url = config.authorization_url()?;

        // Bind before opening the browser so the redirect cannot beat the listener.
        let pending = CallbackServer::from_redirect_uri(&config.redirect_uri, config.callback_timeout)?.listen()?;

        log::info!("🌐 [Authorizer] Opening browser to authorize user at {}", auth_url);
        if let Err(e) = self.browser.open(auth_url.as_str()) {
            // Release the listener before giving up.
            drop(pending);
            return Err(e);
        }

        log::info!("⏳ [Authorizer] Waiting up to {:?} for the redirect", config.callback_timeout);
        let code = pending.wait().await?.into_code()?;
        log::info!("✅ [Authorizer] Authorization code received");

        let TokenResponse {
            access_token,
            refresh_token,
            scope,
            ..
        } = self.oauth.exchange_code(code).await?;
        let refresh_token = refresh_token.unwrap_or_default();

        self.vault.save(TokenKind::UserRefresh, &refresh_token).await?;
        self.vault
            .remember_user_tokens(&RefreshedTokens {
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
            })
            .await;
        log::info!("✅ [Authorizer] User authorization renewed ({} scopes)", scope.len());

        Ok(UserTokens {
            access_token: Some(access_token),
            refresh_token,
            scopes: scope,
        })
    }
}
