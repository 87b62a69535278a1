//! Telegram bot and channel configuration

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::subscription::Plan;
use crate::ports::ChannelId;

use super::error::ValidationError;

/// Bot token plus the channel each plan unlocks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelsConfig {
    /// Telegram bot token
    pub bot_token: String,

    /// Channel id for the beginner plan (e.g. "-1001234567890")
    pub beginner_channel: String,

    /// Channel id for the mid plan
    pub mid_channel: String,

    /// Channel id for the complete plan
    pub complete_channel: String,
}

impl ChannelsConfig {
    /// Per-plan channel directory for the lifecycle engine.
    pub fn directory(&self) -> HashMap<Plan, ChannelId> {
        let mut map = HashMap::new();
        map.insert(Plan::Beginner, ChannelId::new(self.beginner_channel.clone()));
        map.insert(Plan::Mid, ChannelId::new(self.mid_channel.clone()));
        map.insert(Plan::Complete, ChannelId::new(self.complete_channel.clone()));
        map
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.bot_token.is_empty() {
            return Err(ValidationError::MissingRequired("CHANNELS__BOT_TOKEN"));
        }
        if self.beginner_channel.is_empty() {
            return Err(ValidationError::MissingRequired(
                "CHANNELS__BEGINNER_CHANNEL",
            ));
        }
        if self.mid_channel.is_empty() {
            return Err(ValidationError::MissingRequired("CHANNELS__MID_CHANNEL"));
        }
        if self.complete_channel.is_empty() {
            return Err(ValidationError::MissingRequired(
                "CHANNELS__COMPLETE_CHANNEL",
            ));
        }
        Ok(())
    }
}
