use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CHANNEL_POINTS_REDEMPTION_ADD: &str = "channel.channel_points_custom_reward_redemption.add";

pub const WEBHOOK_TRANSPORT: &str = "webhook";

/// Which events the subscription covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcaster_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionTransport {
    pub method: String,
    pub callback: String,
    /// Only sent on creation; the platform never echoes it back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Request body of `POST /eventsub/subscriptions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub condition: SubscriptionCondition,
    pub transport: SubscriptionTransport,
}

impl Subscription {
    /// Webhook subscription scoped to one broadcaster, who is also the
    /// authorizing user.
    pub fn webhook(
        kind: impl Into<String>,
        version: impl Into<String>,
        broadcaster_id: &str,
        callback: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            version: version.into(),
            condition: SubscriptionCondition {
                broadcaster_user_id: Some(broadcaster_id.to_string()),
                user_id: Some(broadcaster_id.to_string()),
            },
            transport: SubscriptionTransport {
                method: WEBHOOK_TRANSPORT.to_string(),
                callback: callback.into(),
                secret: Some(secret.into()),
            },
        }
    }
}

/// Event type and version to subscribe to; the facade fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1".to_string()
}

impl SubscriptionRequest {
    pub fn new(kind: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            version: version.into(),
        }
    }

    pub fn reward_redemptions() -> Self {
        Self::new(CHANNEL_POINTS_REDEMPTION_ADD, "1")
    }
}

/// Subscription as the platform reports it, both in creation responses and
/// in the `subscription` field of every webhook delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionMetadata {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub cost: u64,
    #[serde(default)]
    pub condition: Value,
    #[serde(default)]
    pub created_at: Option<String>,
}
