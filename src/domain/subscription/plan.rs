//! Subscription plans.
//!
//! Each plan maps to one channel and a monthly price. Monetary values are
//! stored as i64 cents, never floats.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::LifecycleError;

/// A named subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Beginner,
    Mid,
    Complete,
}

impl Plan {
    /// All plans, in display order.
    pub const ALL: [Plan; 3] = [Plan::Beginner, Plan::Mid, Plan::Complete];

    /// Parses the wire form used in order ids and callbacks.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::InvalidPlan` for unknown plan names.
    pub fn parse(s: &str) -> Result<Self, LifecycleError> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(Plan::Beginner),
            "mid" => Ok(Plan::Mid),
            "complete" => Ok(Plan::Complete),
            _ => Err(LifecycleError::invalid_plan(s)),
        }
    }

    /// Wire name used in order ids, storage and callbacks.
    pub fn key(&self) -> &'static str {
        match self {
            Plan::Beginner => "beginner",
            Plan::Mid => "mid",
            Plan::Complete => "complete",
        }
    }

    /// Human-readable plan name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Beginner => "Beginner to Mid",
            Plan::Mid => "Mid to Pro",
            Plan::Complete => "Complete Pack",
        }
    }

    /// Default monthly price in USD cents.
    ///
    /// Deployments can override these via `PlansConfig`.
    pub fn default_price_cents(&self) -> i64 {
        match self {
            Plan::Beginner => 1799,
            Plan::Mid => 2499,
            Plan::Complete => 1999,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
