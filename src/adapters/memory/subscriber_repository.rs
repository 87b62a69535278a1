//! In-memory implementation of SubscriberRepository.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::foundation::{PlatformUserId, Timestamp};
use crate::domain::subscription::{Subscriber, SubscriberStatus};
use crate::ports::{StorageError, SubscriberRepository};

/// Mutex-guarded map keyed by user id.
///
/// Every method takes the lock once, so conditional updates are atomic with
/// respect to other callers - the same guarantee the SQL adapter gets from
/// single-statement conditional writes.
#[derive(Default)]
pub struct InMemorySubscriberRepository {
    records: Mutex<HashMap<i64, Subscriber>>,
}

impl InMemorySubscriberRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record directly, for tests.
    pub fn with_subscriber(subscriber: Subscriber) -> Self {
        let repo = Self::new();
        repo.lock().insert(subscriber.user_id.as_i64(), subscriber);
        repo
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, Subscriber>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SubscriberRepository for InMemorySubscriberRepository {
    async fn upsert_registration(
        &self,
        user_id: PlatformUserId,
        username: &str,
        now: Timestamp,
    ) -> Result<Subscriber, StorageError> {
        let mut records = self.lock();
        let entry = records
            .entry(user_id.as_i64())
            .or_insert_with(|| Subscriber::register(user_id, username, now));
        entry.touch(username, now);
        Ok(entry.clone())
    }

    async fn find(&self, user_id: PlatformUserId) -> Result<Option<Subscriber>, StorageError> {
        Ok(self.lock().get(&user_id.as_i64()).cloned())
    }

    async fn update(&self, subscriber: &Subscriber) -> Result<(), StorageError> {
        self.lock()
            .insert(subscriber.user_id.as_i64(), subscriber.clone());
        Ok(())
    }

    async fn list(
        &self,
        status: Option<SubscriberStatus>,
    ) -> Result<Vec<Subscriber>, StorageError> {
        let mut subscribers: Vec<Subscriber> = self
            .lock()
            .values()
            .filter(|s| status.map(|st| s.status == st).unwrap_or(true))
            .cloned()
            .collect();
        subscribers.sort_by(|a, b| b.last_interaction.cmp(&a.last_interaction));
        Ok(subscribers)
    }

    async fn find_due_for_expiry(
        &self,
        now: Timestamp,
    ) -> Result<Vec<Subscriber>, StorageError> {
        Ok(self
            .lock()
            .values()
            .filter(|s| s.is_due_for_expiry(now))
            .cloned()
            .collect())
    }

    async fn expire_all_due(&self, now: Timestamp) -> Result<u64, StorageError> {
        let mut count = 0;
        for subscriber in self.lock().values_mut() {
            if subscriber.is_due_for_expiry(now) {
                subscriber.expire(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_all(&self) -> Result<u64, StorageError> {
        Ok(self.lock().len() as u64)
    }

    async fn count_by_status(&self, status: SubscriberStatus) -> Result<u64, StorageError> {
        Ok(self.lock().values().filter(|s| s.status == status).count() as u64)
    }

    async fn all(&self) -> Result<Vec<Subscriber>, StorageError> {
        Ok(self.lock().values().cloned().collect())
    }
}
