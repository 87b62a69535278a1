//! In-memory repository adapters.
//!
//! Back the full repository ports with a mutex-guarded map. Used by the test
//! suites and for running the service without a database.

mod payment_repository;
mod subscriber_repository;

pub use payment_repository::InMemoryPaymentRepository;
pub use subscriber_repository::InMemorySubscriberRepository;
