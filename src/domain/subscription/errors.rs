//! Subscription lifecycle error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | InvalidSignature | 400 |
//! | MalformedPayload | 400 |
//! | MalformedOrderId | 400 |
//! | InvalidPlan | 400 |
//! | UserNotFound | 404 |
//! | Gateway | 502 |
//! | MembershipGrant | 500 |
//! | Storage | 500 |

use crate::domain::foundation::PlatformUserId;

/// Errors raised by the subscription lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Webhook signature verification failed; no state change.
    InvalidSignature,

    /// Webhook body was not valid JSON or lacked required fields.
    MalformedPayload(String),

    /// Order id did not decode to a user id and known plan.
    MalformedOrderId(String),

    /// Unknown subscription plan.
    InvalidPlan(String),

    /// No subscriber record for this user.
    UserNotFound(PlatformUserId),

    /// Invoice creation at the payment gateway failed; retryable by the user.
    Gateway(String),

    /// Channel membership grant or revoke failed after retries.
    MembershipGrant(String),

    /// Storage operation failed; fatal for the current operation.
    Storage(String),
}

impl LifecycleError {
    pub fn invalid_signature() -> Self {
        LifecycleError::InvalidSignature
    }

    pub fn malformed_payload(reason: impl Into<String>) -> Self {
        LifecycleError::MalformedPayload(reason.into())
    }

    pub fn malformed_order_id(order_id: impl Into<String>) -> Self {
        LifecycleError::MalformedOrderId(order_id.into())
    }

    pub fn invalid_plan(plan: impl Into<String>) -> Self {
        LifecycleError::InvalidPlan(plan.into())
    }

    pub fn user_not_found(user_id: PlatformUserId) -> Self {
        LifecycleError::UserNotFound(user_id)
    }

    pub fn gateway(reason: impl Into<String>) -> Self {
        LifecycleError::Gateway(reason.into())
    }

    pub fn membership_grant(reason: impl Into<String>) -> Self {
        LifecycleError::MembershipGrant(reason.into())
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        LifecycleError::Storage(reason.into())
    }

    /// Returns a message suitable for operator-facing output.
    pub fn message(&self) -> String {
        match self {
            LifecycleError::InvalidSignature => "Invalid webhook signature".to_string(),
            LifecycleError::MalformedPayload(reason) => {
                format!("Malformed webhook payload: {}", reason)
            }
            LifecycleError::MalformedOrderId(order_id) => {
                format!("Malformed order id: {}", order_id)
            }
            LifecycleError::InvalidPlan(plan) => format!("Invalid plan: {}", plan),
            LifecycleError::UserNotFound(user_id) => format!("User {} not found", user_id),
            LifecycleError::Gateway(reason) => format!("Payment gateway error: {}", reason),
            LifecycleError::MembershipGrant(reason) => {
                format!("Channel membership operation failed: {}", reason)
            }
            LifecycleError::Storage(reason) => format!("Storage error: {}", reason),
        }
    }
}

impl std::fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for LifecycleError {}
