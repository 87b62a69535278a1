//! Order id codec.
//!
//! The gateway's free-text `order_id` field carries our correlation data:
//! `hack_academy_<userId>_<plan>_<unix-ts>`. The callback echoes it back, so
//! parsing it recovers who paid and for what.

use crate::domain::foundation::{PlatformUserId, Timestamp};

use super::{LifecycleError, Plan};

/// Fixed prefix on every order id we issue.
pub const ORDER_PREFIX: &str = "hack_academy";

/// Decoded order correlation data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderId {
    pub user_id: PlatformUserId,
    pub plan: Plan,
}

impl OrderId {
    /// Encodes an order id for a new invoice.
    pub fn encode(user_id: PlatformUserId, plan: Plan, now: Timestamp) -> String {
        format!(
            "{}_{}_{}_{}",
            ORDER_PREFIX,
            user_id,
            plan.key(),
            now.as_unix_secs()
        )
    }

    /// Parses an order id from a gateway callback.
    ///
    /// Accepts at least four `_`-separated parts with the fixed prefix, a
    /// numeric user id and a known plan. Anything else is `MalformedOrderId`;
    /// the gateway cannot fix a bad id by retrying.
    pub fn parse(order_id: &str) -> Result<Self, LifecycleError> {
        let malformed = || LifecycleError::malformed_order_id(order_id);

        let parts: Vec<&str> = order_id.split('_').collect();
        if parts.len() < 4 || parts[0] != "hack" || parts[1] != "academy" {
            return Err(malformed());
        }

        let user_id: PlatformUserId = parts[2].parse().map_err(|_| malformed())?;
        let plan = Plan::parse(parts[3]).map_err(|_| malformed())?;

        Ok(OrderId { user_id, plan })
    }
}
