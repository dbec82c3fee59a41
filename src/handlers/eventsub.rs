use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use twitch_helix::eventsub::{
    EventSubMessage, InvalidReason, SignatureCheck, WebhookEnvelope, HEADER_MESSAGE_ID, HEADER_MESSAGE_TIMESTAMP,
    HEADER_MESSAGE_TYPE,
};

use crate::services::events::describe;
use crate::utils::logging::*;
use crate::utils::{AppError, AppResult};
use crate::AppState;

fn reason_text(reason: InvalidReason) -> String {
    match reason {
        InvalidReason::MissingHeader(name) => format!("missing {} header", name),
        InvalidReason::MalformedSignature => "malformed signature header".to_string(),
        InvalidReason::Mismatch => "signature mismatch".to_string(),
    }
}

/// Refuses deliveries whose timestamp is further than `max_age` from `now`.
pub fn check_message_age(timestamp: &str, max_age: Duration, now: DateTime<Utc>) -> AppResult<()> {
    let sent = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| AppError::ValidationError(format!("unparseable message timestamp: {}", e)))?
        .with_timezone(&Utc);

    let skew_ms = (now - sent).num_milliseconds().unsigned_abs();
    if u128::from(skew_ms) > max_age.as_millis() {
        return Err(AppError::ValidationError(format!(
            "message timestamp {} is outside the {}s window",
            timestamp,
            max_age.as_secs()
        )));
    }
    Ok(())
}

/// POST /eventsub
///
/// The body stays raw bytes until the signature has been checked.
pub async fn handle_eventsub(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let start_time = Instant::now();
    log_request_received("/eventsub", "POST");

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let SignatureCheck::Invalid(reason) = state.verifier.verify_headers(&header_str, &body) {
        let reason = reason_text(reason);
        log_signature_rejected(&reason);
        return Err(AppError::SignatureError(reason));
    }

    if let (Some(max_age), Some(timestamp)) = (state.max_message_age, header_str(HEADER_MESSAGE_TIMESTAMP)) {
        check_message_age(timestamp, max_age, Utc::now())?;
    }

    let message_id = header_str(HEADER_MESSAGE_ID).unwrap_or_default();
    let message_type = header_str(HEADER_MESSAGE_TYPE);

    let envelope = WebhookEnvelope::parse(&body).map_err(|e| AppError::ValidationError(e.to_string()))?;
    let message = envelope
        .classify(message_id, message_type)
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    let response = match message {
        EventSubMessage::Challenge(challenge) => {
            log_info("🤝 Answering EventSub callback verification");
            (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain")], challenge).into_response()
        }
        EventSubMessage::Revocation(subscription) => {
            log_warning(&format!(
                "⚠️ EventSub subscription {} ({}) revoked: {}",
                subscription.id, subscription.kind, subscription.status
            ));
            (StatusCode::OK, "ok").into_response()
        }
        EventSubMessage::Notification(notification) => {
            tracing::debug!("{}", describe(&notification));
            state
                .events
                .send(notification)
                .await
                .map_err(|_| AppError::InternalError("event consumer is not running".to_string()))?;
            (StatusCode::OK, "ok").into_response()
        }
    };

    log_request_processed("/eventsub", response.status().as_u16(), start_time.elapsed().as_millis() as u64);
    Ok(response)
}
