//! Plan pricing configuration

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::subscription::Plan;

use super::error::ValidationError;

/// Per-plan price overrides in cents. Unset plans keep their built-in price.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlansConfig {
    pub beginner_price_cents: Option<i64>,
    pub mid_price_cents: Option<i64>,
    pub complete_price_cents: Option<i64>,
}

impl PlansConfig {
    pub fn overrides(&self) -> HashMap<Plan, i64> {
        let mut map = HashMap::new();
        if let Some(cents) = self.beginner_price_cents {
            map.insert(Plan::Beginner, cents);
        }
        if let Some(cents) = self.mid_price_cents {
            map.insert(Plan::Mid, cents);
        }
        if let Some(cents) = self.complete_price_cents {
            map.insert(Plan::Complete, cents);
        }
        map
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (plan, cents) in self.overrides() {
            if cents <= 0 {
                return Err(ValidationError::InvalidPrice(plan.key().to_string()));
            }
        }
        Ok(())
    }
}
