//! Parsing and classification of verified webhook deliveries.
//!
//! Nothing here checks signatures. Callers must only hand over bodies the
//! verifier has already accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::eventsub::subscription::{SubscriptionMetadata, CHANNEL_POINTS_REDEMPTION_ADD};

pub const MESSAGE_TYPE_VERIFICATION: &str = "webhook_callback_verification";
pub const MESSAGE_TYPE_NOTIFICATION: &str = "notification";
pub const MESSAGE_TYPE_REVOCATION: &str = "revocation";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed webhook body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("webhook body has no subscription metadata")]
    MissingSubscription,

    #[error("notification has no event payload")]
    MissingEvent,
}

/// Raw delivery body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub subscription: Option<SubscriptionMetadata>,
    #[serde(default)]
    pub event: Option<Value>,
    #[serde(default)]
    pub challenge: Option<String>,
}

/// Classified delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum EventSubMessage {
    /// Echo the value back to confirm callback ownership.
    Challenge(String),
    Notification(Notification),
    Revocation(SubscriptionMetadata),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message_id: String,
    pub subscription: SubscriptionMetadata,
    pub event: EventPayload,
}

impl WebhookEnvelope {
    pub fn parse(body: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// A non-empty `challenge` wins over the message type header; a
    /// `revocation` type is a revocation; anything else is a notification.
    pub fn classify(self, message_id: &str, message_type: Option<&str>) -> Result<EventSubMessage, EnvelopeError> {
        if let Some(challenge) = self.challenge.filter(|c| !c.is_empty()) {
            return Ok(EventSubMessage::Challenge(challenge));
        }

        let subscription = self.subscription.ok_or(EnvelopeError::MissingSubscription)?;
        if message_type == Some(MESSAGE_TYPE_REVOCATION) {
            return Ok(EventSubMessage::Revocation(subscription));
        }

        let raw = self.event.ok_or(EnvelopeError::MissingEvent)?;
        let event = EventPayload::decode(&subscription.kind, raw)?;
        Ok(EventSubMessage::Notification(Notification {
            message_id: message_id.to_string(),
            subscription,
            event,
        }))
    }
}

/// Event body, typed where the kind is known.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    RewardRedemption(RewardRedemption),
    Other { kind: String, event: Value },
}

impl EventPayload {
    pub fn decode(kind: &str, event: Value) -> Result<Self, serde_json::Error> {
        match kind {
            CHANNEL_POINTS_REDEMPTION_ADD => Ok(EventPayload::RewardRedemption(serde_json::from_value(event)?)),
            _ => Ok(EventPayload::Other {
                kind: kind.to_string(),
                event,
            }),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            EventPayload::RewardRedemption(_) => CHANNEL_POINTS_REDEMPTION_ADD,
            EventPayload::Other { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub cost: u64,
    #[serde(default)]
    pub prompt: String,
}

/// `channel.channel_points_custom_reward_redemption.add` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRedemption {
    pub id: String,
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub broadcaster_user_name: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub user_input: String,
    pub status: String,
    pub reward: Reward,
    pub redeemed_at: String,
}
