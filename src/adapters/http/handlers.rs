//! HTTP handlers connecting axum routes to the application services.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use tracing::warn;

use crate::application::{AdminService, SubscriptionService};
use crate::domain::subscription::LifecycleError;

use super::dto::{ErrorResponse, HealthResponse, StatsResponse, WebhookAck};

/// Header the gateway puts the HMAC-SHA512 hex digest in.
pub const SIGNATURE_HEADER: &str = "x-nowpayments-sig";

/// Shared application state, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SubscriptionService>,
    pub admin: Arc<AdminService>,
}

fn error_response(err: LifecycleError) -> Response {
    let (status, code) = match &err {
        LifecycleError::InvalidSignature => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
        LifecycleError::MalformedPayload(_) => (StatusCode::BAD_REQUEST, "MALFORMED_PAYLOAD"),
        LifecycleError::MalformedOrderId(_) => (StatusCode::BAD_REQUEST, "MALFORMED_ORDER_ID"),
        LifecycleError::InvalidPlan(_) => (StatusCode::BAD_REQUEST, "INVALID_PLAN"),
        LifecycleError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
        LifecycleError::Gateway(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
        LifecycleError::MembershipGrant(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "MEMBERSHIP_GRANT_FAILED")
        }
        LifecycleError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    };
    (status, Json(ErrorResponse::new(code, err.message()))).into_response()
}

/// POST /payment_webhook
///
/// The raw body bytes are handed to the lifecycle engine unmodified;
/// re-serializing JSON before verification would break the HMAC.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.service.process_webhook(&body, signature).await {
        // Duplicates ack with 200 so the gateway stops redelivering.
        Ok(outcome) => {
            tracing::debug!(?outcome, "webhook processed");
            (StatusCode::OK, Json(WebhookAck::success())).into_response()
        }
        Err(err) => {
            warn!(error = %err, "webhook rejected");
            error_response(err)
        }
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Response {
    match state.admin.stats().await {
        Ok(stats) => (StatusCode::OK, Json(StatsResponse::from(stats))).into_response(),
        Err(err) => error_response(err),
    }
}
