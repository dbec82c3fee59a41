//! Downstream consumer of verified notifications.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use twitch_helix::eventsub::{EventPayload, Notification};

use crate::utils::logging::log_info;

/// Bounded hand-off between the webhook handler and the consumer.
pub fn channel(capacity: usize) -> (mpsc::Sender<Notification>, mpsc::Receiver<Notification>) {
    mpsc::channel(capacity)
}

/// One-line summary of a notification.
pub fn describe(notification: &Notification) -> String {
    match &notification.event {
        EventPayload::RewardRedemption(r) => format!(
            "🎁 {} redeemed '{}' for {} points{}",
            r.user_name,
            r.reward.title,
            r.reward.cost,
            if r.user_input.is_empty() {
                String::new()
            } else {
                format!(": {}", r.user_input)
            }
        ),
        EventPayload::Other { kind, .. } => format!("📨 {} event ({})", kind, notification.message_id),
    }
}

/// Logs every notification until all senders are dropped.
pub fn spawn_logger(mut events: mpsc::Receiver<Notification>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut seen = 0;
        while let Some(notification) = events.recv().await {
            seen += 1;
            log_info(&describe(&notification));
        }
        seen
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use twitch_helix::eventsub::{SubscriptionMetadata, CHANNEL_POINTS_REDEMPTION_ADD};

    fn notification(kind: &str, event: serde_json::Value) -> Notification {
        Notification {
            message_id: "m1".to_string(),
            subscription: SubscriptionMetadata {
                id: "s1".to_string(),
                kind: kind.to_string(),
                version: "1".to_string(),
                status: "enabled".to_string(),
                cost: 0,
                condition: json!({}),
                created_at: None,
            },
            event: EventPayload::decode(kind, event).unwrap(),
        }
    }

    #[test]
    fn test_describe_redemption() {
        let n = notification(
            CHANNEL_POINTS_REDEMPTION_ADD,
            json!({
                "id": "r1",
                "broadcaster_user_id": "1337",
                "broadcaster_user_login": "cool_user",
                "broadcaster_user_name": "Cool_User",
                "user_id": "9001",
                "user_login": "cooler_user",
                "user_name": "Cooler_User",
                "user_input": "",
                "status": "unfulfilled",
                "reward": {"id": "92af127c", "title": "Hydrate", "cost": 100},
                "redeemed_at": "2020-07-15T17:16:03.17106713Z"
            }),
        );
        assert_eq!(describe(&n), "🎁 Cooler_User redeemed 'Hydrate' for 100 points");
    }

    #[tokio::test]
    async fn test_logger_drains_until_senders_close() {
        let (tx, rx) = channel(4);
        let consumer = spawn_logger(rx);

        tx.send(notification("channel.follow", json!({"user_id": "1"}))).await.unwrap();
        tx.send(notification("channel.follow", json!({"user_id": "2"}))).await.unwrap();
        drop(tx);

        assert_eq!(consumer.await.unwrap(), 2);
    }
}
