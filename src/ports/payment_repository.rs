//! Port for payment persistence.

use async_trait::async_trait;

use crate::domain::foundation::{PaymentId, Timestamp};
use crate::domain::subscription::{Payment, PaymentStatus};

use super::StorageError;

/// Outcome of a conditional status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusTransition {
    /// The status was written; returns the updated record.
    Applied(Payment),
    /// The payment was already in a terminal status; nothing changed.
    /// Duplicate webhook deliveries land here.
    AlreadyTerminal(Payment),
    /// No record exists for this payment id.
    NotFound,
}

/// Persistence contract for payment records.
///
/// `payment_id` is the unique key, assigned once by the gateway.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Inserts a new payment record.
    ///
    /// # Errors
    ///
    /// `StorageError::DuplicateKey` when the payment id already exists -
    /// callers in registration paths treat that as already-recorded.
    async fn insert(&self, payment: &Payment) -> Result<(), StorageError>;

    /// Point lookup by unique key.
    async fn find(&self, payment_id: &PaymentId) -> Result<Option<Payment>, StorageError>;

    /// Atomically writes `status` (and the audit payload) unless the stored
    /// status is already terminal.
    ///
    /// This is the idempotency gate for webhook deliveries: it must be one
    /// conditional write, not a read-modify-write with a gap.
    async fn update_status_if_not_terminal(
        &self,
        payment_id: &PaymentId,
        status: PaymentStatus,
        payload: Option<serde_json::Value>,
        now: Timestamp,
    ) -> Result<StatusTransition, StorageError>;

    async fn count_all(&self) -> Result<u64, StorageError>;

    /// Payments the gateway confirmed.
    async fn count_successful(&self) -> Result<u64, StorageError>;

    /// Sum of confirmed payment amounts, in cents.
    async fn total_revenue_cents(&self) -> Result<i64, StorageError>;

    /// Full scan for backup snapshots.
    async fn all(&self) -> Result<Vec<Payment>, StorageError>;
}
