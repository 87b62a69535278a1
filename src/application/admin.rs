//! Operator-facing administration over the subscriber base.
//!
//! Everything here is also reachable from the `gate-admin` binary; the
//! service keeps the logic testable without a terminal attached.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::domain::foundation::{PlatformUserId, Timestamp};
use crate::domain::subscription::{LifecycleError, Payment, Subscriber, SubscriberStatus};
use crate::ports::{PaymentRepository, SubscriberRepository};

use super::SubscriptionService;

/// Aggregate counters for the operator dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_users: u64,
    pub active_subscriptions: u64,
    pub expired_subscriptions: u64,
    pub total_payments: u64,
    pub successful_payments: u64,
    /// Sum of successful payment amounts, in cents.
    pub revenue_cents: i64,
}

/// On-disk backup layout.
#[derive(Debug, Serialize)]
struct BackupFile {
    users: Vec<Subscriber>,
    payments: Vec<Payment>,
    backup_date: Timestamp,
}

/// Administration operations: stats, listing, manual window control and
/// backups.
///
/// Extension and revocation go through the lifecycle engine so channel
/// membership stays in step with the persisted window; the rest reads the
/// repositories directly.
pub struct AdminService {
    service: Arc<SubscriptionService>,
    subscribers: Arc<dyn SubscriberRepository>,
    payments: Arc<dyn PaymentRepository>,
}

impl AdminService {
    pub fn new(
        service: Arc<SubscriptionService>,
        subscribers: Arc<dyn SubscriberRepository>,
        payments: Arc<dyn PaymentRepository>,
    ) -> Self {
        Self {
            service,
            subscribers,
            payments,
        }
    }

    pub async fn stats(&self) -> Result<Stats, LifecycleError> {
        Ok(Stats {
            total_users: self.subscribers.count_all().await?,
            active_subscriptions: self
                .subscribers
                .count_by_status(SubscriberStatus::Active)
                .await?,
            expired_subscriptions: self
                .subscribers
                .count_by_status(SubscriberStatus::Expired)
                .await?,
            total_payments: self.payments.count_all().await?,
            successful_payments: self.payments.count_successful().await?,
            revenue_cents: self.payments.total_revenue_cents().await?,
        })
    }

    /// Subscribers, most recently active first, optionally filtered by
    /// status.
    pub async fn list_users(
        &self,
        status: Option<SubscriberStatus>,
    ) -> Result<Vec<Subscriber>, LifecycleError> {
        Ok(self.subscribers.list(status).await?)
    }

    pub async fn extend(
        &self,
        user_id: PlatformUserId,
        days: i64,
    ) -> Result<Timestamp, LifecycleError> {
        self.service.extend_subscription(user_id, days).await
    }

    pub async fn revoke(&self, user_id: PlatformUserId) -> Result<(), LifecycleError> {
        self.service.revoke_access(user_id).await
    }

    /// Bulk-marks every lapsed-but-still-Active record as expired, without
    /// channel calls or notifications. Repair tool for records the scheduler
    /// could not reach.
    pub async fn cleanup_expired(&self) -> Result<u64, LifecycleError> {
        let count = self.subscribers.expire_all_due(Timestamp::now()).await?;
        info!(count, "cleanup marked lapsed subscriptions expired");
        Ok(count)
    }

    /// Dumps every subscriber and payment record to a JSON file and returns
    /// the path written.
    pub async fn backup(&self, path: Option<&Path>) -> Result<PathBuf, LifecycleError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(format!(
                "backup_{}.json",
                Utc::now().format("%Y%m%d_%H%M%S")
            )),
        };

        let backup = BackupFile {
            users: self.subscribers.all().await?,
            payments: self.payments.all().await?,
            backup_date: Timestamp::now(),
        };
        let json = serde_json::to_string_pretty(&backup)
            .map_err(|e| LifecycleError::storage(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| LifecycleError::storage(e.to_string()))?;

        info!(path = %path.display(), "backup written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPaymentRepository, InMemorySubscriberRepository};
    use crate::application::LifecycleSettings;
    use crate::domain::foundation::PaymentId;
    use crate::domain::subscription::{IpnVerifier, Plan, PaymentStatus};
    use crate::ports::{
        ChannelGate, ChannelGateError, ChannelId, CreateInvoiceRequest, GatewayError, Invoice,
        Notifier, PaymentGateway,
    };
    use async_trait::async_trait;

    struct NoopGateway;

    #[async_trait]
    impl PaymentGateway for NoopGateway {
        async fn create_invoice(
            &self,
            _request: CreateInvoiceRequest,
        ) -> Result<Invoice, GatewayError> {
            Ok(Invoice {
                payment_id: PaymentId::from("p-0"),
                invoice_url: String::new(),
            })
        }
    }

    struct NoopGate;

    #[async_trait]
    impl ChannelGate for NoopGate {
        async fn grant(
            &self,
            _channel_id: &ChannelId,
            _user_id: PlatformUserId,
        ) -> Result<(), ChannelGateError> {
            Ok(())
        }

        async fn revoke(
            &self,
            _channel_id: &ChannelId,
            _user_id: PlatformUserId,
        ) -> Result<(), ChannelGateError> {
            Ok(())
        }
    }

    struct NoopNotifier;

    #[async_trait]
    impl Notifier for NoopNotifier {
        async fn send_welcome(
            &self,
            _user_id: PlatformUserId,
            _plan: Plan,
            _valid_until: Timestamp,
        ) -> Result<(), String> {
            Ok(())
        }

        async fn send_renewal_prompt(&self, _user_id: PlatformUserId) -> Result<(), String> {
            Ok(())
        }
    }

    fn admin() -> (
        Arc<InMemorySubscriberRepository>,
        Arc<InMemoryPaymentRepository>,
        AdminService,
    ) {
        let subscribers = Arc::new(InMemorySubscriberRepository::new());
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let service = Arc::new(SubscriptionService::new(
            subscribers.clone(),
            payments.clone(),
            Arc::new(NoopGateway),
            Arc::new(NoopGate),
            Arc::new(NoopNotifier),
            IpnVerifier::new("secret"),
            LifecycleSettings::default(),
        ));
        let admin = AdminService::new(service, subscribers.clone(), payments.clone());
        (subscribers, payments, admin)
    }

    fn uid(n: i64) -> PlatformUserId {
        PlatformUserId::new(n)
    }

    async fn seed(
        subscribers: &InMemorySubscriberRepository,
        payments: &InMemoryPaymentRepository,
    ) {
        let now = Timestamp::now();

        let mut active = Subscriber::register(uid(1), "active", now);
        active.activate(Plan::Mid, now);
        subscribers.update(&active).await.unwrap();

        let mut expired = Subscriber::register(uid(2), "expired", now.minus_days(60));
        expired.activate(Plan::Beginner, now.minus_days(60));
        expired.expire(now.minus_days(30));
        subscribers.update(&expired).await.unwrap();

        subscribers
            .upsert_registration(uid(3), "browser", now)
            .await
            .unwrap();

        let mut paid = Payment::new_waiting(
            PaymentId::from("p-1"),
            uid(1),
            Plan::Mid,
            2499,
            "",
            now,
        );
        paid.apply_status(PaymentStatus::Confirmed, None, now);
        payments.insert(&paid).await.unwrap();
        payments
            .insert(&Payment::new_waiting(
                PaymentId::from("p-2"),
                uid(3),
                Plan::Beginner,
                1799,
                "",
                now,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stats_aggregate_users_and_revenue() {
        let (subscribers, payments, admin) = admin();
        seed(&subscribers, &payments).await;

        let stats = admin.stats().await.unwrap();
        assert_eq!(
            stats,
            Stats {
                total_users: 3,
                active_subscriptions: 1,
                expired_subscriptions: 1,
                total_payments: 2,
                successful_payments: 1,
                revenue_cents: 2499,
            }
        );
    }

    #[tokio::test]
    async fn list_users_filters_by_status() {
        let (subscribers, payments, admin) = admin();
        seed(&subscribers, &payments).await;

        let active = admin
            .list_users(Some(SubscriberStatus::Active))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, uid(1));

        assert_eq!(admin.list_users(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cleanup_expires_lapsed_records_without_channel_calls() {
        let (subscribers, _payments, admin) = admin();
        let now = Timestamp::now();
        let mut lapsed = Subscriber::register(uid(9), "lapsed", now.minus_days(45));
        lapsed.activate(Plan::Complete, now.minus_days(45));
        subscribers.update(&lapsed).await.unwrap();

        assert_eq!(admin.cleanup_expired().await.unwrap(), 1);
        assert_eq!(
            subscribers.find(uid(9)).await.unwrap().unwrap().status,
            SubscriberStatus::Expired
        );
    }

    #[tokio::test]
    async fn backup_writes_full_dump_to_requested_path() {
        let (subscribers, payments, admin) = admin();
        seed(&subscribers, &payments).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        let written = admin.backup(Some(&path)).await.unwrap();
        assert_eq!(written, path);

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["users"].as_array().unwrap().len(), 3);
        assert_eq!(parsed["payments"].as_array().unwrap().len(), 2);
        assert!(parsed["backup_date"].is_string());
    }

    #[tokio::test]
    async fn extend_and_revoke_delegate_to_lifecycle() {
        let (subscribers, payments, admin) = admin();
        seed(&subscribers, &payments).await;

        let new_end = admin.extend(uid(1), 7).await.unwrap();
        let stored = subscribers.find(uid(1)).await.unwrap().unwrap();
        assert_eq!(stored.subscription_end, Some(new_end));

        admin.revoke(uid(1)).await.unwrap();
        let stored = subscribers.find(uid(1)).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriberStatus::Revoked);
    }
}
