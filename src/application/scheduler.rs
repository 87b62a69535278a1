//! ExpiryScheduler - background service that ends lapsed subscriptions.
//!
//! The due set is re-derived from persisted subscription windows on every
//! poll, so a restart loses nothing and a renewal between polls simply makes
//! the record not-due anymore. Per-record failures (platform outage during
//! the revoke call) are logged and retried on the next cycle; they never
//! stop the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{error, info, warn};

use crate::domain::subscription::LifecycleError;

use super::SubscriptionService;

/// Configuration for the ExpiryScheduler service.
#[derive(Debug, Clone)]
pub struct ExpirySchedulerConfig {
    /// How often to scan for lapsed subscription windows.
    pub poll_interval: Duration,
}

impl Default for ExpirySchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
        }
    }
}

impl ExpirySchedulerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Background service that expires subscriptions whose window has lapsed.
pub struct ExpiryScheduler {
    service: Arc<SubscriptionService>,
    config: ExpirySchedulerConfig,
}

impl ExpiryScheduler {
    pub fn new(service: Arc<SubscriptionService>) -> Self {
        Self {
            service,
            config: ExpirySchedulerConfig::default(),
        }
    }

    pub fn with_config(service: Arc<SubscriptionService>, config: ExpirySchedulerConfig) -> Self {
        Self { service, config }
    }

    /// Run the scheduler loop until the shutdown signal flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("expiry scheduler stopping");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        // Scan-level failure (storage down). Keep looping;
                        // the next tick retries.
                        error!(error = %e, "expiry scan failed");
                    }
                }
            }
        }
    }

    /// Run exactly one scan cycle, returning how many subscriptions were
    /// expired. Also the test entry point.
    pub async fn poll_once(&self) -> Result<u64, LifecycleError> {
        let due = self.service.due_for_expiry().await?;
        let mut expired = 0;

        for user_id in due {
            match self.service.expire_subscription(user_id).await {
                Ok(true) => expired += 1,
                // Renewed (or gone) between the scan and the fire.
                Ok(false) => {}
                Err(e) => {
                    warn!(user_id = user_id.as_i64(), error = %e, "expiry failed, will retry");
                }
            }
        }

        if expired > 0 {
            info!(expired, "expiry cycle complete");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPaymentRepository, InMemorySubscriberRepository};
    use crate::application::LifecycleSettings;
    use crate::domain::foundation::{PaymentId, PlatformUserId, Timestamp};
    use crate::domain::subscription::{IpnVerifier, Plan, Subscriber, SubscriberStatus};
    use crate::ports::{
        ChannelGate, ChannelGateError, ChannelId, CreateInvoiceRequest, GatewayError, Invoice,
        Notifier, PaymentGateway, SubscriberRepository,
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

    fn service_with(
        subscribers: Arc<InMemorySubscriberRepository>,
    ) -> Arc<SubscriptionService> {
        Arc::new(SubscriptionService::new(
            subscribers,
            Arc::new(InMemoryPaymentRepository::new()),
            Arc::new(NoopGateway),
            Arc::new(NoopGate),
            Arc::new(NoopNotifier),
            IpnVerifier::new("secret"),
            LifecycleSettings::default(),
        ))
    }

    fn active_until(user_id: i64, end: Timestamp) -> Subscriber {
        let mut s = Subscriber::register(PlatformUserId::new(user_id), "u", end.minus_days(30));
        s.activate(Plan::Mid, end.minus_days(30));
        s.subscription_end = Some(end);
        s
    }

    #[tokio::test]
    async fn poll_once_expires_lapsed_windows_only() {
        let subscribers = Arc::new(InMemorySubscriberRepository::new());
        let now = Timestamp::now();
        subscribers
            .update(&active_until(1, now.minus_days(1)))
            .await
            .unwrap();
        subscribers
            .update(&active_until(2, now.add_days(10)))
            .await
            .unwrap();

        let scheduler = ExpiryScheduler::new(service_with(subscribers.clone()));
        let expired = scheduler.poll_once().await.unwrap();

        assert_eq!(expired, 1);
        assert_eq!(
            subscribers
                .find(PlatformUserId::new(1))
                .await
                .unwrap()
                .unwrap()
                .status,
            SubscriberStatus::Expired
        );
        assert_eq!(
            subscribers
                .find(PlatformUserId::new(2))
                .await
                .unwrap()
                .unwrap()
                .status,
            SubscriberStatus::Active
        );
    }

    #[tokio::test]
    async fn poll_once_with_nothing_due_returns_zero() {
        let subscribers = Arc::new(InMemorySubscriberRepository::new());
        let scheduler = ExpiryScheduler::new(service_with(subscribers));
        assert_eq!(scheduler.poll_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_signal() {
        let subscribers = Arc::new(InMemorySubscriberRepository::new());
        let now = Timestamp::now();
        subscribers
            .update(&active_until(1, now.minus_days(1)))
            .await
            .unwrap();

        let config = ExpirySchedulerConfig::default()
            .with_poll_interval(Duration::from_millis(10));
        let scheduler = ExpiryScheduler::with_config(service_with(subscribers.clone()), config);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(
            subscribers
                .find(PlatformUserId::new(1))
                .await
                .unwrap()
                .unwrap()
                .status,
            SubscriberStatus::Expired
        );
    }
}
