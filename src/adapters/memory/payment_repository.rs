//! In-memory implementation of PaymentRepository.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::foundation::{PaymentId, Timestamp};
use crate::domain::subscription::{Payment, PaymentStatus};
use crate::ports::{PaymentRepository, StatusTransition, StorageError};

#[derive(Default)]
pub struct InMemoryPaymentRepository {
    records: Mutex<HashMap<String, Payment>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Payment>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<(), StorageError> {
        let mut records = self.lock();
        let key = payment.payment_id.as_str().to_owned();
        if records.contains_key(&key) {
            return Err(StorageError::duplicate_key(&key));
        }
        records.insert(key, payment.clone());
        Ok(())
    }

    async fn find(&self, payment_id: &PaymentId) -> Result<Option<Payment>, StorageError> {
        Ok(self.lock().get(payment_id.as_str()).cloned())
    }

    async fn update_status_if_not_terminal(
        &self,
        payment_id: &PaymentId,
        status: PaymentStatus,
        payload: Option<Value>,
        now: Timestamp,
    ) -> Result<StatusTransition, StorageError> {
        let mut records = self.lock();
        match records.get_mut(payment_id.as_str()) {
            None => Ok(StatusTransition::NotFound),
            Some(payment) => {
                if payment.apply_status(status, payload, now) {
                    Ok(StatusTransition::Applied(payment.clone()))
                } else {
                    Ok(StatusTransition::AlreadyTerminal(payment.clone()))
                }
            }
        }
    }

    async fn count_all(&self) -> Result<u64, StorageError> {
        Ok(self.lock().len() as u64)
    }

    async fn count_successful(&self) -> Result<u64, StorageError> {
        Ok(self.lock().values().filter(|p| p.is_successful()).count() as u64)
    }

    async fn total_revenue_cents(&self) -> Result<i64, StorageError> {
        Ok(self
            .lock()
            .values()
            .filter(|p| p.is_successful())
            .map(|p| p.amount_cents)
            .sum())
    }

    async fn all(&self) -> Result<Vec<Payment>, StorageError> {
        Ok(self.lock().values().cloned().collect())
    }
}
