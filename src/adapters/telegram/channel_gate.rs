//! Telegram implementation of the ChannelGate port.
//!
//! "Granting" access lifts the ban so the user can enter through the
//! channel's invite link; revoking bans them, which also kicks them out.
//! Both Bot API calls are idempotent, matching the port contract:
//! `unbanChatMember` with `only_if_banned` succeeds for users who were never
//! banned, and `banChatMember` succeeds for users already banned.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::domain::foundation::PlatformUserId;
use crate::ports::{ChannelGate, ChannelGateError, ChannelId};

use super::TelegramConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramChannelGate {
    config: TelegramConfig,
    http_client: reqwest::Client,
}

impl TelegramChannelGate {
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

    async fn call(
        &self,
        method: &str,
        channel_id: &ChannelId,
        user_id: PlatformUserId,
        body: serde_json::Value,
    ) -> Result<(), ChannelGateError> {
        let err = |reason: String| ChannelGateError::new(channel_id.clone(), user_id, reason);

        let url = format!(
            "{}/bot{}/{}",
            self.config.api_base_url,
            self.config.bot_token.expose_secret(),
            method
        );
        let response = self
            .http_client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| err(e.to_string()))?;

        let status = response.status();
        let parsed: BotApiResponse = response
            .json()
            .await
            .map_err(|e| err(format!("unreadable response ({}): {}", status, e)))?;

        if !parsed.ok {
            return Err(err(parsed
                .description
                .unwrap_or_else(|| format!("bot api returned {}", status))));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelGate for TelegramChannelGate {
    async fn grant(
        &self,
        channel_id: &ChannelId,
        user_id: PlatformUserId,
    ) -> Result<(), ChannelGateError> {
        self.call(
            "unbanChatMember",
            channel_id,
            user_id,
            serde_json::json!({
                "chat_id": channel_id.as_str(),
                "user_id": user_id.as_i64(),
                "only_if_banned": true,
            }),
        )
        .await
    }

    async fn revoke(
        &self,
        channel_id: &ChannelId,
        user_id: PlatformUserId,
    ) -> Result<(), ChannelGateError> {
        self.call(
            "banChatMember",
            channel_id,
            user_id,
            serde_json::json!({
                "chat_id": channel_id.as_str(),
                "user_id": user_id.as_i64(),
            }),
        )
        .await
    }
}
