//! Telegram Bot API adapters.

mod channel_gate;
mod notifier;

pub use channel_gate::TelegramChannelGate;
pub use notifier::TelegramNotifier;

use secrecy::SecretString;

const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Bot API configuration shared by the gate and notifier adapters.
#[derive(Clone)]
pub struct TelegramConfig {
    bot_token: SecretString,
    api_base_url: String,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: SecretString::new(bot_token.into()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}
