//! PostgreSQL adapters.

mod payment_repository;
mod subscriber_repository;

pub use payment_repository::PostgresPaymentRepository;
pub use subscriber_repository::PostgresSubscriberRepository;
