use httpmock::prelude::*;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use twitch_helix::{
    AuthError, AuthResult, Authorizer, BrowserLauncher, MemoryTokenStore, SubscriptionRequest, TokenKind, TokenStore,
    TokenVault,
};
use yapdap::config::Settings;
use yapdap::handlers::router;
use yapdap::server;
use yapdap::services::{TwitchConnection, WebhookTarget};
use yapdap::AppState;

struct NoBrowser;

impl BrowserLauncher for NoBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        Err(AuthError::browser_error(format!("unexpected browser launch for {}", url)))
    }
}

fn settings(server: &MockServer) -> Settings {
    let mut settings = Settings::default();
    settings.twitch.client_id = "cid".to_string();
    settings.twitch.client_secret = "csecret".to_string();
    settings.twitch.user_name = "cool_user".to_string();
    settings.twitch.token_url = server.url("/oauth2/token");
    settings.twitch.revoke_url = server.url("/oauth2/revoke");
    settings.twitch.authorize_url = server.url("/oauth2/authorize");
    settings.twitch.api_base_url = server.url("/helix");
    settings.eventsub.secret = "this-is-a-webhook-secret".to_string();
    settings
}

#[tokio::test]
async fn test_user_token_is_revoked_when_subscribing_fails_and_server_stops() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .body_contains("grant_type=client_credentials");
            then.status(200).json_body(json!({"access_token": "T1"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .body_contains("grant_type=refresh_token")
                .body_contains("refresh_token=r1");
            then.status(200).json_body(json!({"access_token": "U1", "refresh_token": "r2"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/helix/users").query_param("login", "cool_user");
            then.status(200)
                .json_body(json!({"data": [{"id": "1337", "login": "cool_user", "display_name": "Cool_User"}]}));
        })
        .await;
    let subscribe = server
        .mock_async(|when, then| {
            when.method(POST).path("/helix/eventsub/subscriptions");
            then.status(500)
                .json_body(json!({"error": "Internal Server Error", "status": 500, "message": ""}));
        })
        .await;
    let revoke = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth2/revoke")
                .body_contains("client_id=cid")
                .body_contains("token=U1");
            then.status(200);
        })
        .await;

    let settings = settings(&server);
    let store = MemoryTokenStore::new();
    store.set(TokenKind::UserRefresh, "r1").await.unwrap();
    let vault = Arc::new(TokenVault::new(Arc::new(store)));
    let authorizer = Arc::new(Authorizer::new(settings.auth_config(), vault, Arc::new(NoBrowser)).unwrap());
    let connection = TwitchConnection::connect(authorizer, "cool_user").await.unwrap();

    let (tx, _rx) = mpsc::channel(4);
    let app = router(Arc::new(AppState::new(&settings, tx).unwrap()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = WebhookTarget {
        callback_url: "https://example.com/eventsub".to_string(),
        secret: settings.eventsub.secret.clone(),
    };

    let served = server::run(
        listener,
        app,
        &connection,
        &[SubscriptionRequest::reward_redemptions()],
        &target,
        async {},
    )
    .await;

    assert!(served.is_ok());
    subscribe.assert_hits_async(1).await;
    revoke.assert_hits_async(1).await;
}
