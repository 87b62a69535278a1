//! PostgreSQL implementation of PaymentRepository.
//!
//! The terminal-status guard is enforced by the database itself: the
//! conditional UPDATE matches only non-terminal rows, so two concurrent
//! deliveries cannot both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::domain::foundation::{PaymentId, PlatformUserId, Timestamp};
use crate::domain::subscription::{Payment, PaymentStatus, Plan};
use crate::ports::{PaymentRepository, StatusTransition, StorageError};

const TERMINAL_STATUSES: &str = "'confirmed', 'failed', 'refunded', 'expired'";

pub struct PostgresPaymentRepository {
    pool: PgPool,
}

impl PostgresPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a payment.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    payment_id: String,
    user_id: i64,
    plan: String,
    amount_cents: i64,
    status: String,
    invoice_url: String,
    callback_payload: Option<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StorageError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let plan = Plan::parse(&row.plan)
            .map_err(|_| StorageError::backend(format!("invalid plan value in row: {}", row.plan)))?;

        Ok(Payment {
            payment_id: PaymentId::from(row.payment_id),
            user_id: PlatformUserId::new(row.user_id),
            plan,
            amount_cents: row.amount_cents,
            status: PaymentStatus::from_gateway(&row.status),
            invoice_url: row.invoice_url,
            callback_payload: row.callback_payload,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::backend(e.to_string())
}

const SELECT_COLUMNS: &str = "payment_id, user_id, plan, amount_cents, status, invoice_url, \
                              callback_payload, created_at, updated_at";

#[async_trait]
impl PaymentRepository for PostgresPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, user_id, plan, amount_cents, status, invoice_url,
                callback_payload, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.payment_id.as_str())
        .bind(payment.user_id.as_i64())
        .bind(payment.plan.key())
        .bind(payment.amount_cents)
        .bind(payment.status.as_str())
        .bind(&payment.invoice_url)
        .bind(&payment.callback_payload)
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return StorageError::duplicate_key(payment.payment_id.as_str());
                }
            }
            db_err(e)
        })?;

        Ok(())
    }

    async fn find(&self, payment_id: &PaymentId) -> Result<Option<Payment>, StorageError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE payment_id = $1"
        ))
        .bind(payment_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update_status_if_not_terminal(
        &self,
        payment_id: &PaymentId,
        status: PaymentStatus,
        payload: Option<Value>,
        now: Timestamp,
    ) -> Result<StatusTransition, StorageError> {
        let updated: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            UPDATE payments
            SET status = $2,
                callback_payload = COALESCE($3, callback_payload),
                updated_at = $4
            WHERE payment_id = $1 AND status NOT IN ({TERMINAL_STATUSES})
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(payment_id.as_str())
        .bind(status.as_str())
        .bind(payload)
        .bind(now.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if let Some(row) = updated {
            return Ok(StatusTransition::Applied(row.try_into()?));
        }

        // No row matched: either the payment is unknown or already terminal.
        match self.find(payment_id).await? {
            Some(payment) => Ok(StatusTransition::AlreadyTerminal(payment)),
            None => Ok(StatusTransition::NotFound),
        }
    }

    async fn count_all(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn count_successful(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE status = 'confirmed'")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn total_revenue_cents(&self) -> Result<i64, StorageError> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(amount_cents) FROM payments WHERE status = 'confirmed'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(total.unwrap_or(0))
    }

    async fn all(&self) -> Result<Vec<Payment>, StorageError> {
        let rows: Vec<PaymentRow> =
            sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM payments"))
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
