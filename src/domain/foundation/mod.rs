//! Foundation layer - shared value objects for the domain.

mod ids;
mod timestamp;

pub use ids::{PaymentId, PlatformUserId};
pub use timestamp::Timestamp;
