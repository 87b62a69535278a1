//! Wire types for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::application::Stats;

/// Body returned for every accepted webhook delivery. The gateway stops
/// redelivering once it sees a 2xx with this shape.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAck {
    pub status: String,
}

impl WebhookAck {
    pub fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_users: u64,
    pub active_subscriptions: u64,
    pub expired_subscriptions: u64,
    pub total_payments: u64,
    pub successful_payments: u64,
    pub revenue_cents: i64,
}

impl From<Stats> for StatsResponse {
    fn from(stats: Stats) -> Self {
        Self {
            total_users: stats.total_users,
            active_subscriptions: stats.active_subscriptions,
            expired_subscriptions: stats.expired_subscriptions,
            total_payments: stats.total_payments,
            successful_payments: stats.successful_payments,
            revenue_cents: stats.revenue_cents,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
