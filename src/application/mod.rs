//! Application services.
//!
//! Orchestrate the subscription lifecycle over the repository and gateway
//! ports. Adapters stay thin; every decision about ordering, idempotency and
//! access windows lives here.

pub mod admin;
pub mod lifecycle;
pub mod scheduler;

pub use admin::{AdminService, Stats};
pub use lifecycle::{LifecycleSettings, SubscriptionService, WebhookOutcome};
pub use scheduler::ExpiryScheduler;
