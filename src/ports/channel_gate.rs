//! Port for platform channel membership control.

use async_trait::async_trait;

use crate::domain::foundation::PlatformUserId;

/// Platform channel identifier (numeric for some platforms, `@name` for
/// others - kept opaque here).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Membership call failures.
///
/// A failed grant must never be dropped silently - the lifecycle engine
/// refuses to commit activation until the grant succeeds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("channel membership call failed for user {user_id} in {channel_id}: {reason}")]
pub struct ChannelGateError {
    pub channel_id: ChannelId,
    pub user_id: PlatformUserId,
    pub reason: String,
}

impl ChannelGateError {
    pub fn new(
        channel_id: ChannelId,
        user_id: PlatformUserId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            channel_id,
            user_id,
            reason: reason.into(),
        }
    }
}

/// Admission control for messaging channels.
///
/// Both operations are required to be idempotent: granting membership to a
/// user who already has it, or revoking from a user who is already absent,
/// are no-ops.
#[async_trait]
pub trait ChannelGate: Send + Sync {
    /// Admits the user to the channel.
    async fn grant(
        &self,
        channel_id: &ChannelId,
        user_id: PlatformUserId,
    ) -> Result<(), ChannelGateError>;

    /// Removes the user from the channel.
    async fn revoke(
        &self,
        channel_id: &ChannelId,
        user_id: PlatformUserId,
    ) -> Result<(), ChannelGateError>;
}
