//! Port for the external payment gateway.
//!
//! The gateway hosts the payment page and reports status changes back
//! through signed IPN callbacks; this port only covers the outbound side.

use async_trait::async_trait;

use crate::domain::foundation::PaymentId;

/// Request to create a hosted invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInvoiceRequest {
    /// Amount in cents.
    pub amount_cents: i64,
    /// ISO currency code, e.g. "USD".
    pub currency: String,
    /// Correlation id echoed back in the callback.
    pub order_id: String,
    /// Human-readable purchase description.
    pub description: String,
    /// Where the gateway posts IPN callbacks.
    pub ipn_callback_url: String,
    /// Redirect after successful payment.
    pub success_url: String,
    /// Redirect after cancelled payment.
    pub cancel_url: String,
}

/// A created invoice: the gateway's payment id plus the hosted page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub payment_id: PaymentId,
    pub invoice_url: String,
}

/// Invoice creation failures, surfaced to the initiating user as retryable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(String),

    #[error("gateway rejected the invoice ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("gateway response could not be parsed: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn request(reason: impl Into<String>) -> Self {
        GatewayError::Request(reason.into())
    }

    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        GatewayError::Rejected {
            status,
            body: body.into(),
        }
    }

    pub fn invalid_response(reason: impl Into<String>) -> Self {
        GatewayError::InvalidResponse(reason.into())
    }
}

/// Outbound contract with the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates an externally-hosted invoice.
    ///
    /// Not retried internally; failures propagate to the caller.
    async fn create_invoice(&self, request: CreateInvoiceRequest) -> Result<Invoice, GatewayError>;
}
