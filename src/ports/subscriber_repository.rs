//! Port for subscriber persistence.

use async_trait::async_trait;

use crate::domain::foundation::{PlatformUserId, Timestamp};
use crate::domain::subscription::{Subscriber, SubscriberStatus};

use super::StorageError;

/// Persistence contract for subscriber records.
///
/// `user_id` is the unique key; records are upserted on first contact and
/// never hard-deleted.
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// Idempotent registration: creates the record on first contact, and
    /// always refreshes the handle and last-interaction timestamp.
    async fn upsert_registration(
        &self,
        user_id: PlatformUserId,
        username: &str,
        now: Timestamp,
    ) -> Result<Subscriber, StorageError>;

    /// Point lookup by unique key.
    async fn find(&self, user_id: PlatformUserId) -> Result<Option<Subscriber>, StorageError>;

    /// Replaces the stored record for this subscriber.
    async fn update(&self, subscriber: &Subscriber) -> Result<(), StorageError>;

    /// Filtered scan, sorted by last interaction (most recent first).
    async fn list(
        &self,
        status: Option<SubscriberStatus>,
    ) -> Result<Vec<Subscriber>, StorageError>;

    /// Active subscribers whose window has closed; the scheduler's work set.
    async fn find_due_for_expiry(&self, now: Timestamp)
        -> Result<Vec<Subscriber>, StorageError>;

    /// Bulk conditional update: marks every active subscriber with a past
    /// end date as expired. Returns the number of records changed.
    async fn expire_all_due(&self, now: Timestamp) -> Result<u64, StorageError>;

    async fn count_all(&self) -> Result<u64, StorageError>;

    async fn count_by_status(&self, status: SubscriberStatus) -> Result<u64, StorageError>;

    /// Full scan for backup snapshots.
    async fn all(&self) -> Result<Vec<Subscriber>, StorageError>;
}
