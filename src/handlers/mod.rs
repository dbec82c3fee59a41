pub mod eventsub;
pub mod health;

pub use eventsub::handle_eventsub;
pub use health::health_check;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/eventsub", post(handle_eventsub))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
