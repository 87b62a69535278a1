//! Subscription domain - plans, subscribers, payments and webhook verification.

mod errors;
mod ipn;
mod order_id;
mod payment;
mod plan;
mod subscriber;

pub use errors::LifecycleError;
pub use ipn::{sign as sign_ipn, IpnVerifier};
pub use order_id::{OrderId, ORDER_PREFIX};
pub use payment::{Payment, PaymentStatus};
pub use plan::Plan;
pub use subscriber::{Subscriber, SubscriberStatus};

/// Fixed validity window granted per confirmed payment.
pub const SUBSCRIPTION_PERIOD_DAYS: i64 = 30;
