//! Axum router configuration.
//!
//! # Routes
//!
//! - `POST /payment_webhook` - gateway IPN callbacks (signature verified,
//!   no other authentication)
//! - `GET /health` - liveness probe
//! - `GET /stats` - operator counters
//!
//! Requests are traced and given a hard timeout so a stalled handler cannot
//! pin a gateway delivery worker forever.

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payment_webhook", post(handlers::handle_payment_webhook))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}
