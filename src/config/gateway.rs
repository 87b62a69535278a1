//! Payment gateway configuration (NOWPayments)

use serde::Deserialize;

use super::error::ValidationError;

/// Payment gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// NOWPayments API key
    pub api_key: String,

    /// Shared secret the gateway signs IPN callbacks with
    pub ipn_secret: String,

    /// Public URL the gateway posts IPN callbacks to
    pub ipn_callback_url: String,

    /// Redirect after successful payment
    #[serde(default)]
    pub success_url: String,

    /// Redirect after cancelled payment
    #[serde(default)]
    pub cancel_url: String,

    /// Fiat currency invoices are priced in
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__API_KEY"));
        }
        if self.ipn_secret.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY__IPN_SECRET"));
        }
        if !self.ipn_callback_url.starts_with("http://")
            && !self.ipn_callback_url.starts_with("https://")
        {
            return Err(ValidationError::InvalidCallbackUrl);
        }
        Ok(())
    }
}

fn default_currency() -> String {
    "USD".to_string()
}
