//! HTTP adapter - axum server exposing the webhook and operator endpoints.

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, HealthResponse, StatsResponse, WebhookAck};
pub use handlers::AppState;
pub use routes::router;
