//! PostgreSQL implementation of SubscriberRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{PlatformUserId, Timestamp};
use crate::domain::subscription::{Plan, Subscriber, SubscriberStatus};
use crate::ports::{StorageError, SubscriberRepository};

/// sqlx-backed subscriber store, keyed by the `user_id` column.
pub struct PostgresSubscriberRepository {
    pool: PgPool,
}

impl PostgresSubscriberRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscriber.
#[derive(Debug, sqlx::FromRow)]
struct SubscriberRow {
    user_id: i64,
    username: String,
    plan: Option<String>,
    status: String,
    subscription_start: Option<DateTime<Utc>>,
    subscription_end: Option<DateTime<Utc>>,
    first_seen: DateTime<Utc>,
    last_interaction: DateTime<Utc>,
    expired_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
}

impl TryFrom<SubscriberRow> for Subscriber {
    type Error = StorageError;

    fn try_from(row: SubscriberRow) -> Result<Self, Self::Error> {
        let plan = row
            .plan
            .as_deref()
            .map(|p| {
                Plan::parse(p).map_err(|_| {
                    StorageError::backend(format!("invalid plan value in row: {}", p))
                })
            })
            .transpose()?;
        let status = SubscriberStatus::parse(&row.status).ok_or_else(|| {
            StorageError::backend(format!("invalid status value in row: {}", row.status))
        })?;

        Ok(Subscriber {
            user_id: PlatformUserId::new(row.user_id),
            username: row.username,
            plan,
            status,
            subscription_start: row.subscription_start.map(Timestamp::from_datetime),
            subscription_end: row.subscription_end.map(Timestamp::from_datetime),
            first_seen: Timestamp::from_datetime(row.first_seen),
            last_interaction: Timestamp::from_datetime(row.last_interaction),
            expired_at: row.expired_at.map(Timestamp::from_datetime),
            revoked_at: row.revoked_at.map(Timestamp::from_datetime),
        })
    }
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::backend(e.to_string())
}

#[async_trait]
impl SubscriberRepository for PostgresSubscriberRepository {
    async fn upsert_registration(
        &self,
        user_id: PlatformUserId,
        username: &str,
        now: Timestamp,
    ) -> Result<Subscriber, StorageError> {
        // NULLIF keeps the stored handle when the caller has none.
        let row: SubscriberRow = sqlx::query_as(
            r#"
            INSERT INTO subscribers (user_id, username, status, first_seen, last_interaction)
            VALUES ($1, $2, 'none', $3, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                username = COALESCE(NULLIF(EXCLUDED.username, ''), subscribers.username),
                last_interaction = EXCLUDED.last_interaction
            RETURNING user_id, username, plan, status, subscription_start, subscription_end,
                      first_seen, last_interaction, expired_at, revoked_at
            "#,
        )
        .bind(user_id.as_i64())
        .bind(username)
        .bind(now.as_datetime())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.try_into()
    }

    async fn find(&self, user_id: PlatformUserId) -> Result<Option<Subscriber>, StorageError> {
        let row: Option<SubscriberRow> = sqlx::query_as(
            r#"
            SELECT user_id, username, plan, status, subscription_start, subscription_end,
                   first_seen, last_interaction, expired_at, revoked_at
            FROM subscribers
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, subscriber: &Subscriber) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO subscribers (
                user_id, username, plan, status, subscription_start, subscription_end,
                first_seen, last_interaction, expired_at, revoked_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_id) DO UPDATE SET
                username = EXCLUDED.username,
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                subscription_start = EXCLUDED.subscription_start,
                subscription_end = EXCLUDED.subscription_end,
                last_interaction = EXCLUDED.last_interaction,
                expired_at = EXCLUDED.expired_at,
                revoked_at = EXCLUDED.revoked_at
            "#,
        )
        .bind(subscriber.user_id.as_i64())
        .bind(&subscriber.username)
        .bind(subscriber.plan.map(|p| p.key()))
        .bind(subscriber.status.as_str())
        .bind(subscriber.subscription_start.map(|t| *t.as_datetime()))
        .bind(subscriber.subscription_end.map(|t| *t.as_datetime()))
        .bind(subscriber.first_seen.as_datetime())
        .bind(subscriber.last_interaction.as_datetime())
        .bind(subscriber.expired_at.map(|t| *t.as_datetime()))
        .bind(subscriber.revoked_at.map(|t| *t.as_datetime()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn list(
        &self,
        status: Option<SubscriberStatus>,
    ) -> Result<Vec<Subscriber>, StorageError> {
        let rows: Vec<SubscriberRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    r#"
                    SELECT user_id, username, plan, status, subscription_start, subscription_end,
                           first_seen, last_interaction, expired_at, revoked_at
                    FROM subscribers
                    WHERE status = $1
                    ORDER BY last_interaction DESC
                    "#,
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT user_id, username, plan, status, subscription_start, subscription_end,
                           first_seen, last_interaction, expired_at, revoked_at
                    FROM subscribers
                    ORDER BY last_interaction DESC
                    "#,
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_due_for_expiry(&self, now: Timestamp) -> Result<Vec<Subscriber>, StorageError> {
        let rows: Vec<SubscriberRow> = sqlx::query_as(
            r#"
            SELECT user_id, username, plan, status, subscription_start, subscription_end,
                   first_seen, last_interaction, expired_at, revoked_at
            FROM subscribers
            WHERE status = 'active' AND subscription_end <= $1
            "#,
        )
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn expire_all_due(&self, now: Timestamp) -> Result<u64, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET status = 'expired', expired_at = $1
            WHERE status = 'active' AND subscription_end <= $1
            "#,
        )
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected())
    }

    async fn count_all(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn count_by_status(&self, status: SubscriberStatus) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscribers WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn all(&self) -> Result<Vec<Subscriber>, StorageError> {
        let rows: Vec<SubscriberRow> = sqlx::query_as(
            r#"
            SELECT user_id, username, plan, status, subscription_start, subscription_end,
                   first_seen, last_interaction, expired_at, revoked_at
            FROM subscribers
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
