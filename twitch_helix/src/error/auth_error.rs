use std::time::Duration;
use thiserror::Error;

use crate::auth::token::TokenKind;

/// Errors raised by the credential lifecycle and the Helix handles.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error during {operation}: {source}")]
    Network {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} rejected by the token endpoint [{status}]: {body}")]
    Authentication {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("authorization denied on redirect: {0}")]
    AccessDenied(String),

    #[error("redirect did not carry an authorization code")]
    MissingCode,

    #[error("token store failed to {operation} the {kind} token: {message}")]
    Persistence {
        kind: TokenKind,
        operation: &'static str,
        message: String,
    },

    #[error("timed out after {0:?} waiting for the authorization redirect")]
    Timeout(Duration),

    #[error("failed to open the browser: {0}")]
    Browser(String),

    #[error("callback server error: {0}")]
    CallbackServer(String),

    #[error("Helix API error [{status}]: {body}")]
    Api { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl AuthError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn callback_error(msg: impl Into<String>) -> Self {
        Self::CallbackServer(msg.into())
    }

    pub fn browser_error(msg: impl Into<String>) -> Self {
        Self::Browser(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn network(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Network { operation, source }
    }

    pub fn persistence(kind: TokenKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self::Persistence {
            kind,
            operation,
            message: message.into(),
        }
    }

    /// True when the platform refused the credential itself (as opposed to
    /// the request never completing).
    pub fn is_rejection(&self) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::Api { status, .. } => *status == 400 || *status == 401 || *status == 403,
            _ => false,
        }
    }
}

/// Result type for every fallible call in this crate.
pub type AuthResult<T> = Result<T, AuthError>;
