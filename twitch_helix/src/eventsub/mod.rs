pub mod envelope;
pub mod signature;
pub mod subscription;

pub use envelope::{
    EnvelopeError, EventPayload, EventSubMessage, Notification, Reward, RewardRedemption, WebhookEnvelope,
    MESSAGE_TYPE_NOTIFICATION, MESSAGE_TYPE_REVOCATION, MESSAGE_TYPE_VERIFICATION,
};
pub use signature::{
    InvalidReason, SignatureCheck, WebhookVerifier, HEADER_MESSAGE_ID, HEADER_MESSAGE_SIGNATURE,
    HEADER_MESSAGE_TIMESTAMP, HEADER_MESSAGE_TYPE,
};
pub use subscription::{
    Subscription, SubscriptionCondition, SubscriptionMetadata, SubscriptionRequest, SubscriptionTransport,
    CHANNEL_POINTS_REDEMPTION_ADD,
};
