//! Ports - interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between the
//! domain and the outside world. Adapters implement these ports.
//!
//! - `SubscriberRepository` / `PaymentRepository` - persistence
//! - `PaymentGateway` - invoice creation at the crypto payment provider
//! - `ChannelGate` - channel membership grants/revokes on the platform
//! - `Notifier` - user-facing messages (welcome, renewal prompt)

mod channel_gate;
mod notifier;
mod payment_gateway;
mod payment_repository;
mod subscriber_repository;

pub use channel_gate::{ChannelGate, ChannelGateError, ChannelId};
pub use notifier::Notifier;
pub use payment_gateway::{CreateInvoiceRequest, GatewayError, Invoice, PaymentGateway};
pub use payment_repository::{PaymentRepository, StatusTransition};
pub use subscriber_repository::SubscriberRepository;

/// Storage-level failures surfaced by repositories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Insert violated a uniqueness constraint.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Anything else the backend reports.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn duplicate_key(key: impl Into<String>) -> Self {
        StorageError::DuplicateKey(key.into())
    }

    pub fn backend(reason: impl Into<String>) -> Self {
        StorageError::Backend(reason.into())
    }
}

impl From<StorageError> for crate::domain::subscription::LifecycleError {
    fn from(err: StorageError) -> Self {
        crate::domain::subscription::LifecycleError::storage(err.to_string())
    }
}
