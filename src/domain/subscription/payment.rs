//! Payment aggregate entity.
//!
//! One record per gateway-issued payment id. Terminal statuses are final:
//! duplicate webhook deliveries for a terminal payment must be no-ops.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PaymentId, PlatformUserId, Timestamp};

use super::Plan;

/// Gateway-reported payment status.
///
/// `Other` carries intermediate gateway statuses (`sending`,
/// `partially_paid`, ...) that are persisted for observability but do not
/// finish the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Waiting,
    Confirmed,
    Failed,
    Refunded,
    Expired,
    Other(String),
}

impl PaymentStatus {
    /// Maps a raw gateway status string onto the domain status.
    ///
    /// The gateway reports success as either `confirmed` or `finished`.
    pub fn from_gateway(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "waiting" => PaymentStatus::Waiting,
            "confirmed" | "finished" => PaymentStatus::Confirmed,
            "failed" => PaymentStatus::Failed,
            "refunded" => PaymentStatus::Refunded,
            "expired" => PaymentStatus::Expired,
            other => PaymentStatus::Other(other.to_string()),
        }
    }

    /// Terminal statuses never revert.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Confirmed
                | PaymentStatus::Failed
                | PaymentStatus::Refunded
                | PaymentStatus::Expired
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Waiting => "waiting",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Other(s) => s,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment aggregate - one gateway invoice and its status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Gateway-issued id (unique key, assigned once).
    pub payment_id: PaymentId,

    /// Owning user; many payments per user.
    pub user_id: PlatformUserId,

    /// Plan the payment was made for.
    pub plan: Plan,

    /// Amount in USD cents.
    pub amount_cents: i64,

    /// Current status.
    pub status: PaymentStatus,

    /// Hosted payment page returned by the gateway.
    pub invoice_url: String,

    /// Raw gateway callback payload, retained for audit.
    pub callback_payload: Option<serde_json::Value>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Payment {
    /// Creates a payment record when a plan is selected.
    pub fn new_waiting(
        payment_id: PaymentId,
        user_id: PlatformUserId,
        plan: Plan,
        amount_cents: i64,
        invoice_url: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            payment_id,
            user_id,
            plan,
            amount_cents,
            status: PaymentStatus::Waiting,
            invoice_url: invoice_url.into(),
            callback_payload: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a gateway-reported status.
    ///
    /// Returns false (and leaves the record untouched) when the payment is
    /// already in a terminal status: terminal states do not revert.
    pub fn apply_status(
        &mut self,
        status: PaymentStatus,
        payload: Option<serde_json::Value>,
        now: Timestamp,
    ) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        if payload.is_some() {
            self.callback_payload = payload;
        }
        self.updated_at = now;
        true
    }

    /// True once the gateway has confirmed the payment.
    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Confirmed
    }
}
