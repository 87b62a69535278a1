//! NOWPayments payment gateway adapter.
//!
//! Implements the `PaymentGateway` port over the NOWPayments invoice API.
//! Only the outbound invoice call lives here; callbacks come back through the
//! HTTP adapter and are verified by the lifecycle engine.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::PaymentId;
use crate::ports::{CreateInvoiceRequest, GatewayError, Invoice, PaymentGateway};

const DEFAULT_API_BASE_URL: &str = "https://api.nowpayments.io";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// NOWPayments API configuration.
#[derive(Clone)]
pub struct NowPaymentsConfig {
    api_key: SecretString,
    api_base_url: String,
}

impl NowPaymentsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct InvoiceRequestBody<'a> {
    price_amount: f64,
    price_currency: &'a str,
    order_id: &'a str,
    order_description: &'a str,
    ipn_callback_url: &'a str,
    success_url: &'a str,
    cancel_url: &'a str,
}

/// Subset of the invoice response we need. The API reports `id` as a number
/// or string depending on endpoint version.
#[derive(Debug, Deserialize)]
struct InvoiceResponseBody {
    id: Value,
    invoice_url: String,
}

/// NOWPayments adapter for hosted invoice creation.
pub struct NowPaymentsGateway {
    config: NowPaymentsConfig,
    http_client: reqwest::Client,
}

impl NowPaymentsGateway {
    pub fn new(config: NowPaymentsConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::request(e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl PaymentGateway for NowPaymentsGateway {
    async fn create_invoice(&self, request: CreateInvoiceRequest) -> Result<Invoice, GatewayError> {
        let body = InvoiceRequestBody {
            price_amount: request.amount_cents as f64 / 100.0,
            price_currency: &request.currency,
            order_id: &request.order_id,
            order_description: &request.description,
            ipn_callback_url: &request.ipn_callback_url,
            success_url: &request.success_url,
            cancel_url: &request.cancel_url,
        };

        let response = self
            .http_client
            .post(format!("{}/v1/invoice", self.config.api_base_url))
            .header("x-api-key", self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %body, "invoice creation rejected");
            return Err(GatewayError::rejected(status.as_u16(), body));
        }

        let parsed: InvoiceResponseBody = response
            .json()
            .await
            .map_err(|e| GatewayError::invalid_response(e.to_string()))?;

        let payment_id = match &parsed.id {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(GatewayError::invalid_response(format!(
                    "invoice id is neither string nor number: {}",
                    other
                )))
            }
        };

        Ok(Invoice {
            payment_id: PaymentId::from(payment_id),
            invoice_url: parsed.invoice_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_request_serializes_dollars_not_cents() {
        let body = InvoiceRequestBody {
            price_amount: 2499 as f64 / 100.0,
            price_currency: "USD",
            order_id: "hack_academy_42_mid_171700000",
            order_description: "Mid to Pro",
            ipn_callback_url: "https://gate.example/payment_webhook",
            success_url: "https://gate.example/thanks",
            cancel_url: "https://gate.example/cancelled",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["price_amount"], serde_json::json!(24.99));
        assert_eq!(json["price_currency"], "USD");
    }

    #[test]
    fn invoice_response_accepts_numeric_and_string_ids() {
        let numeric: InvoiceResponseBody = serde_json::from_str(
            r#"{"id": 4522625843, "invoice_url": "https://nowpayments.io/payment/?iid=4522625843"}"#,
        )
        .unwrap();
        assert_eq!(numeric.id, serde_json::json!(4522625843_u64));

        let string: InvoiceResponseBody = serde_json::from_str(
            r#"{"id": "4522625843", "invoice_url": "https://nowpayments.io/payment/?iid=4522625843"}"#,
        )
        .unwrap();
        assert_eq!(string.id, serde_json::json!("4522625843"));
    }
}
