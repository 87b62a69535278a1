//! Telegram implementation of the Notifier port.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::domain::foundation::{PlatformUserId, Timestamp};
use crate::domain::subscription::Plan;
use crate::ports::Notifier;

use super::TelegramConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    http_client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, String> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            config,
            http_client,
        })
    }

    async fn send_message(&self, user_id: PlatformUserId, text: &str) -> Result<(), String> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_base_url,
            self.config.bot_token.expose_secret()
        );
        let response = self
            .http_client
            .post(url)
            .json(&serde_json::json!({
                "chat_id": user_id.as_i64(),
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let parsed: BotApiResponse = response
            .json()
            .await
            .map_err(|e| format!("unreadable response ({}): {}", status, e))?;

        if !parsed.ok {
            return Err(parsed
                .description
                .unwrap_or_else(|| format!("bot api returned {}", status)));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_welcome(
        &self,
        user_id: PlatformUserId,
        plan: Plan,
        valid_until: Timestamp,
    ) -> Result<(), String> {
        let text = format!(
            "Payment confirmed! Your {} subscription is active until {}. Welcome aboard.",
            plan.display_name(),
            valid_until.as_datetime().format("%Y-%m-%d")
        );
        self.send_message(user_id, &text).await
    }

    async fn send_renewal_prompt(&self, user_id: PlatformUserId) -> Result<(), String> {
        self.send_message(
            user_id,
            "Your subscription has expired and channel access was removed. \
             Renew any time to get back in.",
        )
        .await
    }
}
