//! EventSub webhook signature verification.
//!
//! The platform signs `message_id || timestamp || raw_body` with HMAC-SHA256
//! keyed by the subscription secret and sends `sha256=<hex digest>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AuthError, AuthResult};

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_MESSAGE_ID: &str = "Twitch-Eventsub-Message-Id";
pub const HEADER_MESSAGE_TIMESTAMP: &str = "Twitch-Eventsub-Message-Timestamp";
pub const HEADER_MESSAGE_SIGNATURE: &str = "Twitch-Eventsub-Message-Signature";
pub const HEADER_MESSAGE_TYPE: &str = "Twitch-Eventsub-Message-Type";

pub const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    MissingHeader(&'static str),
    MalformedSignature,
    Mismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Invalid(InvalidReason),
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, SignatureCheck::Valid)
    }
}

/// Verifies inbound notifications against one webhook secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    /// Keyed once; every message works on a fresh clone.
    keyed: HmacSha256,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> AuthResult<Self> {
        let keyed = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| AuthError::config_error(format!("unusable webhook secret: {}", e)))?;
        Ok(Self { keyed })
    }

    fn mac(&self, message_id: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(message_id.as_bytes());
        mac.update(timestamp.as_bytes());
        mac.update(body);
        mac
    }

    /// Signature header value the platform would send for this message.
    pub fn sign(&self, message_id: &str, timestamp: &str, body: &[u8]) -> String {
        let digest = self.mac(message_id, timestamp, body).finalize().into_bytes();
        format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest))
    }

    /// Constant-time check of `signature` against the expected digest.
    pub fn verify(&self, message_id: &str, timestamp: &str, body: &[u8], signature: &str) -> SignatureCheck {
        let Some(hex_digest) = signature.strip_prefix(SIGNATURE_PREFIX) else {
            return SignatureCheck::Invalid(InvalidReason::MalformedSignature);
        };
        let Ok(provided) = hex::decode(hex_digest) else {
            return SignatureCheck::Invalid(InvalidReason::MalformedSignature);
        };

        match self.mac(message_id, timestamp, body).verify_slice(&provided) {
            Ok(()) => SignatureCheck::Valid,
            Err(_) => SignatureCheck::Invalid(InvalidReason::Mismatch),
        }
    }

    /// Reads the three signing headers through `header` and verifies.
    ///
    /// Works with any header map; a missing header is `Invalid`.
    pub fn verify_headers<'a, F>(&self, header: F, body: &[u8]) -> SignatureCheck
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let required = |name: &'static str| header(name).ok_or(InvalidReason::MissingHeader(name));
        let (message_id, timestamp, signature) = match (
            required(HEADER_MESSAGE_ID),
            required(HEADER_MESSAGE_TIMESTAMP),
            required(HEADER_MESSAGE_SIGNATURE),
        ) {
            (Ok(id), Ok(ts), Ok(sig)) => (id, ts, sig),
            (Err(reason), _, _) | (_, Err(reason), _) | (_, _, Err(reason)) => {
                return SignatureCheck::Invalid(reason)
            }
        };
        self.verify(message_id, timestamp, body, signature)
    }
}
