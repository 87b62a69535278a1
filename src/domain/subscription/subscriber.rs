//! Subscriber aggregate entity.
//!
//! One record per platform user, created on first contact and never
//! hard-deleted. Subscription state moves forward through
//! None -> Active -> {Expired, Revoked}, with Active reachable again through
//! renewal or a manual extension.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PlatformUserId, Timestamp};

use super::{Plan, SUBSCRIPTION_PERIOD_DAYS};

/// Where a subscriber currently stands in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    /// Registered but never subscribed.
    None,
    /// Paid up; `subscription_end` is set and in the future at transition time.
    Active,
    /// Subscription window passed.
    Expired,
    /// Access forcibly removed by an operator.
    Revoked,
}

impl SubscriberStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(SubscriberStatus::None),
            "active" => Some(SubscriberStatus::Active),
            "expired" => Some(SubscriberStatus::Expired),
            "revoked" => Some(SubscriberStatus::Revoked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriberStatus::None => "none",
            SubscriberStatus::Active => "active",
            SubscriberStatus::Expired => "expired",
            SubscriberStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for SubscriberStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscriber aggregate - a platform user and their subscription window.
///
/// # Invariants
///
/// - `user_id` is unique (one record per platform user)
/// - `status == Active` implies `subscription_end` is set
/// - Mutations take `now` explicitly so tests control the clock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Platform-assigned user id (unique key).
    pub user_id: PlatformUserId,

    /// Display handle at last contact.
    pub username: String,

    /// Plan from the most recent activation, kept after expiry for renewals.
    pub plan: Option<Plan>,

    /// Current lifecycle status.
    pub status: SubscriberStatus,

    /// Start of the current subscription window.
    pub subscription_start: Option<Timestamp>,

    /// End of the current subscription window.
    pub subscription_end: Option<Timestamp>,

    /// First contact with the bot.
    pub first_seen: Timestamp,

    /// Most recent interaction of any kind.
    pub last_interaction: Timestamp,

    /// When the subscription last expired.
    pub expired_at: Option<Timestamp>,

    /// When access was last revoked by an operator.
    pub revoked_at: Option<Timestamp>,
}

impl Subscriber {
    /// Creates a fresh record on first contact.
    pub fn register(user_id: PlatformUserId, username: impl Into<String>, now: Timestamp) -> Self {
        Self {
            user_id,
            username: username.into(),
            plan: None,
            status: SubscriberStatus::None,
            subscription_start: None,
            subscription_end: None,
            first_seen: now,
            last_interaction: now,
            expired_at: None,
            revoked_at: None,
        }
    }

    /// Refreshes the interaction timestamp (and handle, which can change).
    pub fn touch(&mut self, username: &str, now: Timestamp) {
        if !username.is_empty() {
            self.username = username.to_string();
        }
        self.last_interaction = now;
    }

    /// True while the subscription window covers `now`.
    pub fn has_access(&self, now: Timestamp) -> bool {
        self.status == SubscriberStatus::Active
            && self.subscription_end.map(|end| end.is_after(&now)).unwrap_or(false)
    }

    /// Activates a paid subscription window.
    ///
    /// Renewal policy: a payment landing while a previous window is still
    /// open stacks on top of it, extending from the later of `now` and the
    /// current end. Remaining paid time is never discarded.
    pub fn activate(&mut self, plan: Plan, now: Timestamp) {
        let base = match self.subscription_end {
            Some(end) if self.status == SubscriberStatus::Active && end.is_after(&now) => end,
            _ => now,
        };
        self.plan = Some(plan);
        self.status = SubscriberStatus::Active;
        self.subscription_start = Some(now);
        self.subscription_end = Some(base.add_days(SUBSCRIPTION_PERIOD_DAYS));
        self.last_interaction = now;
    }

    /// Marks the subscription expired.
    pub fn expire(&mut self, now: Timestamp) {
        self.status = SubscriberStatus::Expired;
        self.expired_at = Some(now);
    }

    /// Forcibly removes access, independent of the subscription window.
    pub fn revoke(&mut self, now: Timestamp) {
        self.status = SubscriberStatus::Revoked;
        self.revoked_at = Some(now);
    }

    /// Extends the window by `days`, from the current end or from `now` when
    /// no end is set, and re-activates the subscriber.
    pub fn extend(&mut self, days: i64, now: Timestamp) -> Timestamp {
        let base = match self.subscription_end {
            Some(end) if end.is_after(&now) => end,
            _ => now,
        };
        let new_end = base.add_days(days);
        self.status = SubscriberStatus::Active;
        self.subscription_end = Some(new_end);
        if self.subscription_start.is_none() {
            self.subscription_start = Some(now);
        }
        new_end
    }

    /// True when the scheduler should fire expiry for this record.
    pub fn is_due_for_expiry(&self, now: Timestamp) -> bool {
        self.status == SubscriberStatus::Active
            && self.subscription_end.map(|end| !end.is_after(&now)).unwrap_or(false)
    }

    /// Days left in the current window, zero once it has passed.
    pub fn days_remaining(&self, now: Timestamp) -> i64 {
        self.subscription_end
            .map(|end| end.days_until(&now))
            .unwrap_or(0)
    }
}
