pub mod callback;
pub mod client;
pub mod latch;
pub mod oauth;
pub mod token;

pub use callback::{CallbackParams, CallbackServer, PendingCallback};
pub use client::{OAuthClient, TokenResponse};
pub use latch::{LatchError, LatchWaiter, OneShotLatch};
pub use oauth::{Authorizer, BrowserLauncher, SystemBrowser, UserTokens};
pub use token::{
    MemoryTokenStore, PersistRefreshToken, RefreshedTokens, Token, TokenKind, TokenRefreshObserver,
    TokenStore, TokenVault,
};
