use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::error::{AuthError, AuthResult};

/// The two credential records this crate persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    App,
    UserRefresh,
}

impl TokenKind {
    /// Fixed key of the record in the token table.
    pub fn key(self) -> &'static str {
        match self {
            TokenKind::App => "app",
            TokenKind::UserRefresh => "refresh",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "app" => Some(TokenKind::App),
            "refresh" => Some(TokenKind::UserRefresh),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A persisted credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub obtained_at: DateTime<Utc>,
}

impl Token {
    pub fn new(kind: TokenKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            obtained_at: Utc::now(),
        }
    }

    /// Empty values are treated the same as a missing record.
    pub fn is_usable(&self) -> bool {
        !self.value.trim().is_empty()
    }
}

/// Durable key-value persistence for the `app` and `refresh` records.
///
/// `set` is an upsert and must be atomic: a concurrent `get` observes either
/// the old or the new value, never a partial one.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, kind: TokenKind) -> AuthResult<Option<Token>>;

    async fn set(&self, kind: TokenKind, value: &str) -> AuthResult<Token>;
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<TokenKind, Token>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, kind: TokenKind) -> AuthResult<Option<Token>> {
        Ok(self.records.read().await.get(&kind).cloned())
    }

    async fn set(&self, kind: TokenKind, value: &str) -> AuthResult<Token> {
        let token = Token::new(kind, value);
        self.records.write().await.insert(kind, token.clone());
        Ok(token)
    }
}

/// Owns the token store together with one lock per token kind.
///
/// Every lookup-then-write sequence on a kind runs while holding that kind's
/// lock, so two flows for the same kind never race two exchanges.
pub struct TokenVault {
    store: Arc<dyn TokenStore>,
    app: Mutex<()>,
    user: Mutex<()>,
    /// Last user pair minted by this process. Access tokens are never persisted.
    minted_user: RwLock<Option<RefreshedTokens>>,
}

impl TokenVault {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            app: Mutex::new(()),
            user: Mutex::new(()),
            minted_user: RwLock::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenStore::new()))
    }

    pub async fn lock(&self, kind: TokenKind) -> MutexGuard<'_, ()> {
        match kind {
            TokenKind::App => self.app.lock().await,
            TokenKind::UserRefresh => self.user.lock().await,
        }
    }

    /// Reads a record; the caller is expected to hold `lock(kind)` when the
    /// read decides a subsequent write.
    pub async fn load(&self, kind: TokenKind) -> AuthResult<Option<Token>> {
        Ok(self.store.get(kind).await?.filter(Token::is_usable))
    }

    pub async fn save(&self, kind: TokenKind, value: &str) -> AuthResult<Token> {
        if value.trim().is_empty() {
            return Err(AuthError::persistence(kind, "write", "refusing to store an empty token"));
        }
        self.store.set(kind, value).await
    }

    /// Locked single write, for callers that do not read first.
    pub async fn store(&self, kind: TokenKind, value: &str) -> AuthResult<Token> {
        let _guard = self.lock(kind).await;
        self.save(kind, value).await
    }

    /// Caller holds `lock(TokenKind::UserRefresh)` and has just persisted
    /// `tokens.refresh_token`.
    pub async fn remember_user_tokens(&self, tokens: &RefreshedTokens) {
        *self.minted_user.write().await = Some(tokens.clone());
    }

    /// The in-memory pair minted alongside `refresh_token`, if this process
    /// minted it.
    pub async fn minted_user_tokens(&self, refresh_token: &str) -> Option<RefreshedTokens> {
        self.minted_user
            .read()
            .await
            .as_ref()
            .filter(|tokens| tokens.refresh_token == refresh_token)
            .cloned()
    }
}

/// Tokens handed back by the platform after a refresh grant.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Notified whenever a user-scoped handle renews its access token.
///
/// Implementations must persist the new refresh token before returning; the
/// handle does not use the new tokens until the observer has succeeded.
#[async_trait]
pub trait TokenRefreshObserver: Send + Sync {
    async fn on_token_refreshed(&self, tokens: &RefreshedTokens) -> AuthResult<()>;
}

/// Writes refreshed refresh tokens back through the vault.
///
/// Does not take the kind lock itself: a handle built with
/// [`HelixClient::user_in_vault`](crate::HelixClient::user_in_vault) already
/// holds it across the whole refresh.
pub struct PersistRefreshToken {
    vault: Arc<TokenVault>,
}

impl PersistRefreshToken {
    pub fn new(vault: Arc<TokenVault>) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl TokenRefreshObserver for PersistRefreshToken {
    async fn on_token_refreshed(&self, tokens: &RefreshedTokens) -> AuthResult<()> {
        self.vault.save(TokenKind::UserRefresh, &tokens.refresh_token).await?;
        log::info!("💾 [TokenVault] Refreshed user token persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_keys() {
        assert_eq!(TokenKind::App.key(), "app");
        assert_eq!(TokenKind::UserRefresh.key(), "refresh");
        assert_eq!(TokenKind::from_key("refresh"), Some(TokenKind::UserRefresh));
        assert_eq!(TokenKind::from_key("user"), None);
    }

    #[tokio::test]
    async fn test_memory_store_round_trip_and_overwrite() {
        let store = MemoryTokenStore::new();
        assert!(store.get(TokenKind::App).await.unwrap().is_none());

        store.set(TokenKind::App, "a1").await.unwrap();
        store.set(TokenKind::UserRefresh, "r1").await.unwrap();
        store.set(TokenKind::App, "a2").await.unwrap();

        assert_eq!(store.get(TokenKind::App).await.unwrap().unwrap().value, "a2");
        assert_eq!(store.get(TokenKind::UserRefresh).await.unwrap().unwrap().value, "r1");
    }

    #[tokio::test]
    async fn test_memory_store_set_is_idempotent() {
        let store = MemoryTokenStore::new();
        store.set(TokenKind::UserRefresh, "same").await.unwrap();
        store.set(TokenKind::UserRefresh, "same").await.unwrap();
        assert_eq!(store.get(TokenKind::UserRefresh).await.unwrap().unwrap().value, "same");
    }

    #[tokio::test]
    async fn test_vault_treats_empty_values_as_missing() {
        let store = Arc::new(MemoryTokenStore::new());
        store.set(TokenKind::App, "").await.unwrap();
        let vault = TokenVault::new(store);

        assert!(vault.load(TokenKind::App).await.unwrap().is_none());
        assert!(matches!(
            vault.save(TokenKind::App, "  ").await,
            Err(AuthError::Persistence { kind: TokenKind::App, .. })
        ));
    }

    #[tokio::test]
    async fn test_persist_observer_writes_refresh_token() {
        let vault = Arc::new(TokenVault::in_memory());
        let observer = PersistRefreshToken::new(vault.clone());

        observer
            .on_token_refreshed(&RefreshedTokens {
                access_token: "access".to_string(),
                refresh_token: "rotated".to_string(),
            })
            .await
            .unwrap();

        let stored = vault.load(TokenKind::UserRefresh).await.unwrap().unwrap();
        assert_eq!(stored.value, "rotated");
    }

    #[tokio::test]
    async fn test_persist_observer_does_not_wait_on_the_kind_lock() {
        let vault = Arc::new(TokenVault::in_memory());
        let observer = PersistRefreshToken::new(vault.clone());

        let _guard = vault.lock(TokenKind::UserRefresh).await;
        let tokens = RefreshedTokens {
            access_token: "access".to_string(),
            refresh_token: "under-lock".to_string(),
        };
        let write = observer.on_token_refreshed(&tokens);

        tokio::time::timeout(std::time::Duration::from_secs(1), write)
            .await
            .expect("observer blocked on a lock its caller holds")
            .unwrap();
        assert_eq!(vault.load(TokenKind::UserRefresh).await.unwrap().unwrap().value, "under-lock");
    }

    #[tokio::test]
    async fn test_minted_user_tokens_match_on_refresh_token() {
        let vault = TokenVault::in_memory();
        assert!(vault.minted_user_tokens("r2").await.is_none());

        vault
            .remember_user_tokens(&RefreshedTokens {
                access_token: "a2".to_string(),
                refresh_token: "r2".to_string(),
            })
            .await;

        assert_eq!(vault.minted_user_tokens("r2").await.map(|t| t.access_token).as_deref(), Some("a2"));
        assert!(vault.minted_user_tokens("r1").await.is_none());
    }
}
