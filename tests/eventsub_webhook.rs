use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;
use twitch_helix::eventsub::{EventPayload, Notification};

use yapdap::config::Settings;
use yapdap::handlers::router;
use yapdap::AppState;

const SECRET: &str = "this-is-a-webhook-secret";

fn app(capacity: usize) -> (Router, mpsc::Receiver<Notification>) {
    let mut settings = Settings::default();
    settings.eventsub.secret = SECRET.to_string();
    let (tx, rx) = mpsc::channel(capacity);
    (router(Arc::new(AppState::new(&settings, tx).unwrap())), rx)
}

fn signature(id: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn delivery(message_type: &str, body: &[u8], signature: &str, timestamp: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/eventsub")
        .header("content-type", "application/json")
        .header("Twitch-Eventsub-Message-Id", "msg-1")
        .header("Twitch-Eventsub-Message-Timestamp", timestamp)
        .header("Twitch-Eventsub-Message-Signature", signature)
        .header("Twitch-Eventsub-Message-Type", message_type)
        .body(Body::from(body.to_vec()))
        .unwrap()
}

fn signed(message_type: &str, body: &[u8]) -> Request<Body> {
    let timestamp = Utc::now().to_rfc3339();
    let sig = signature("msg-1", &timestamp, body);
    delivery(message_type, body, &sig, &timestamp)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn redemption_body() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "subscription": {
            "id": "f1c2a387-161a-49f9-a165-0f21d7a4e1c4",
            "type": "channel.channel_points_custom_reward_redemption.add",
            "version": "1",
            "status": "enabled",
            "cost": 0,
            "condition": {"broadcaster_user_id": "1337"},
            "created_at": "2019-11-16T10:11:12.634234626Z"
        },
        "event": {
            "id": "17fa2df1-ad76-4804-bfa5-a40ef63efe63",
            "broadcaster_user_id": "1337",
            "broadcaster_user_login": "cool_user",
            "broadcaster_user_name": "Cool_User",
            "user_id": "9001",
            "user_login": "cooler_user",
            "user_name": "Cooler_User",
            "user_input": "pogchamp",
            "status": "unfulfilled",
            "reward": {"id": "92af127c", "title": "title", "cost": 100, "prompt": "reward prompt"},
            "redeemed_at": "2020-07-15T17:16:03.17106713Z"
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_challenge_is_echoed_as_plain_text() {
    let (app, _rx) = app(4);
    let body = br#"{"challenge":"ping-42","subscription":{"id":"s1","type":"channel.follow","version":"2","status":"webhook_callback_verification_pending"}}"#;

    let response = app.oneshot(signed("webhook_callback_verification", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(body_text(response).await, "ping-42");
}

#[tokio::test]
async fn test_tampered_body_is_rejected_before_parsing() {
    let (app, mut rx) = app(4);
    let original = redemption_body();
    let timestamp = Utc::now().to_rfc3339();
    let sig = signature("msg-1", &timestamp, &original);

    // Still valid JSON, but no longer the signed bytes.
    let tampered = String::from_utf8(original).unwrap().replace("pogchamp", "pogchamq");
    let response = app
        .oneshot(delivery("notification", tampered.as_bytes(), &sig, &timestamp))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_invalid_json_with_bad_signature_is_403_not_400() {
    let (app, _rx) = app(4);
    let timestamp = Utc::now().to_rfc3339();

    let response = app
        .oneshot(delivery("notification", b"{not json", "sha256=00", &timestamp))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_signature_headers_are_rejected() {
    let (app, _rx) = app(4);
    let request = Request::builder()
        .method("POST")
        .uri("/eventsub")
        .body(Body::from(r#"{"challenge":"ping-42"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let error: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(error["status"], 403);
}

#[tokio::test]
async fn test_notification_is_handed_to_consumer() {
    let (app, mut rx) = app(4);

    let response = app.oneshot(signed("notification", &redemption_body())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");

    let notification = rx.try_recv().unwrap();
    assert_eq!(notification.message_id, "msg-1");
    match notification.event {
        EventPayload::RewardRedemption(redemption) => {
            assert_eq!(redemption.user_input, "pogchamp");
            assert_eq!(redemption.reward.title, "title");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[tokio::test]
async fn test_revocation_is_acknowledged_without_dispatch() {
    let (app, mut rx) = app(4);
    let body = br#"{"subscription":{"id":"s1","type":"channel.follow","version":"2","status":"authorization_revoked"}}"#;

    let response = app.oneshot(signed("revocation", body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_stale_delivery_is_rejected() {
    let (app, mut rx) = app(4);
    let body = redemption_body();
    let timestamp = (Utc::now() - chrono::Duration::minutes(11)).to_rfc3339();
    let sig = signature("msg-1", &timestamp, &body);

    let response = app.oneshot(delivery("notification", &body, &sig, &timestamp)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_closed_consumer_is_a_server_error() {
    let (app, rx) = app(4);
    drop(rx);

    let response = app.oneshot(signed("notification", &redemption_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _rx) = app(1);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "yapdap");
}
