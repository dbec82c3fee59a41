//! # twitch_helix
//!
//! Credential lifecycle for the Twitch identity service and the Helix API.
//!
//! ## Features
//!
//! - App token (client credentials) and user refresh token (authorization code)
//! - Local one-shot redirect listener for the browser handshake
//! - Token-bound Helix handles that renew once on a 401
//! - EventSub webhook signature verification and envelope classification
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use twitch_helix::{AuthConfig, Authorizer, SystemBrowser, TokenVault};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::new("client-id", "client-secret", "http://localhost:3030/userauth");
//!     let authorizer = Authorizer::new(config, Arc::new(TokenVault::in_memory()), Arc::new(SystemBrowser))?;
//!     let app_token = authorizer.app_token().await?;
//!     println!("App token acquired ({} chars)", app_token.len());
//!     Ok(())
//! }
//! ```

/// OAuth2 flows, token persistence and the redirect listener
pub mod auth;

/// Token-bound Helix handles
pub mod client;

pub mod config;

pub mod error;

/// EventSub webhook trust boundary
pub mod eventsub;

pub use auth::{
    Authorizer, BrowserLauncher, MemoryTokenStore, PersistRefreshToken, SystemBrowser, Token, TokenKind,
    TokenRefreshObserver, TokenStore, TokenVault, UserTokens,
};
pub use client::{HandleScope, HelixClient, HelixUser};
pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use eventsub::{
    SignatureCheck, Subscription, SubscriptionRequest, WebhookVerifier, CHANNEL_POINTS_REDEMPTION_ADD,
};
