//! Port for user-facing notifications.

use async_trait::async_trait;

use crate::domain::foundation::{PlatformUserId, Timestamp};
use crate::domain::subscription::Plan;

/// Sends messages to subscribers.
///
/// Notification failures are logged by callers but never fail the operation
/// that triggered them - losing a courtesy message is acceptable, losing a
/// state transition is not.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Welcome message after a confirmed payment, naming the plan and the
    /// date access runs until.
    async fn send_welcome(
        &self,
        user_id: PlatformUserId,
        plan: Plan,
        valid_until: Timestamp,
    ) -> Result<(), String>;

    /// Renewal prompt after expiry.
    async fn send_renewal_prompt(&self, user_id: PlatformUserId) -> Result<(), String>;
}
