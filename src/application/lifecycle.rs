//! Subscription lifecycle engine.
//!
//! Single entry point for every state transition: registration, invoice
//! creation, webhook confirmation, expiry, revocation and extension. All
//! transitions for one user are serialized behind a per-user async lock, so
//! concurrent webhook deliveries and scheduler fires cannot interleave.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::foundation::{PaymentId, PlatformUserId, Timestamp};
use crate::domain::subscription::{
    IpnVerifier, LifecycleError, OrderId, Payment, PaymentStatus, Plan, Subscriber,
    SUBSCRIPTION_PERIOD_DAYS,
};
use crate::ports::{
    ChannelGate, ChannelId, CreateInvoiceRequest, Invoice, Notifier, PaymentGateway,
    PaymentRepository, StatusTransition, SubscriberRepository,
};

/// Tunables and wiring the engine needs beyond its ports.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Fiat currency invoices are priced in.
    pub currency: String,
    /// Public URL the gateway posts IPN callbacks to.
    pub ipn_callback_url: String,
    /// Redirect after successful payment.
    pub success_url: String,
    /// Redirect after cancelled payment.
    pub cancel_url: String,
    /// Channel each plan unlocks.
    pub channels: HashMap<Plan, ChannelId>,
    /// Price overrides in cents; plans fall back to their defaults.
    pub prices_cents: HashMap<Plan, i64>,
    /// How many times a channel grant is attempted before the whole
    /// confirmation is failed.
    pub grant_attempts: u32,
    /// Pause between grant attempts.
    pub grant_backoff: Duration,
}

impl LifecycleSettings {
    pub fn price_cents(&self, plan: Plan) -> i64 {
        self.prices_cents
            .get(&plan)
            .copied()
            .unwrap_or_else(|| plan.default_price_cents())
    }

    fn channel_for(&self, plan: Plan) -> Option<&ChannelId> {
        self.channels.get(&plan)
    }
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            ipn_callback_url: String::new(),
            success_url: String::new(),
            cancel_url: String::new(),
            channels: HashMap::new(),
            prices_cents: HashMap::new(),
            grant_attempts: 3,
            grant_backoff: Duration::from_millis(500),
        }
    }
}

/// Result of processing one IPN delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Confirmed payment: access granted, subscription window set.
    Activated {
        user_id: PlatformUserId,
        plan: Plan,
        valid_until: Timestamp,
    },
    /// Non-confirming status recorded against the payment.
    PaymentRecorded {
        payment_id: PaymentId,
        status: PaymentStatus,
    },
    /// Redelivery of an already-terminal payment; nothing changed.
    Duplicate { payment_id: PaymentId },
    /// Status update for a payment we never issued; nothing changed.
    Ignored,
}

/// Fields the gateway posts in an IPN callback.
///
/// The gateway sends `payment_id` as a JSON number; older payloads used a
/// string, so both are accepted.
#[derive(Debug, Deserialize)]
struct IpnCallback {
    #[serde(deserialize_with = "de_payment_id")]
    payment_id: String,
    payment_status: String,
    order_id: String,
    #[serde(default)]
    price_amount: Option<f64>,
}

fn de_payment_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "payment_id must be a string or number, got {}",
            other
        ))),
    }
}

/// Orchestrates the subscription lifecycle over the repository and
/// integration ports.
pub struct SubscriptionService {
    subscribers: Arc<dyn SubscriberRepository>,
    payments: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    gate: Arc<dyn ChannelGate>,
    notifier: Arc<dyn Notifier>,
    verifier: IpnVerifier,
    settings: LifecycleSettings,
    user_locks: std::sync::Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl SubscriptionService {
    pub fn new(
        subscribers: Arc<dyn SubscriberRepository>,
        payments: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        gate: Arc<dyn ChannelGate>,
        notifier: Arc<dyn Notifier>,
        verifier: IpnVerifier,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            subscribers,
            payments,
            gateway,
            gate,
            notifier,
            verifier,
            settings,
            user_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    fn lock_for(&self, user_id: PlatformUserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(user_id.as_i64())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Records first contact, or refreshes the handle and last-interaction
    /// timestamp on repeat contact.
    pub async fn register_user(
        &self,
        user_id: PlatformUserId,
        username: &str,
    ) -> Result<Subscriber, LifecycleError> {
        let subscriber = self
            .subscribers
            .upsert_registration(user_id, username, Timestamp::now())
            .await?;
        Ok(subscriber)
    }

    /// Creates a hosted invoice for the plan and records the payment as
    /// waiting. The order id ties the eventual callback back to this user.
    pub async fn initiate_payment(
        &self,
        user_id: PlatformUserId,
        username: &str,
        plan: Plan,
    ) -> Result<Invoice, LifecycleError> {
        let now = Timestamp::now();
        self.subscribers
            .upsert_registration(user_id, username, now)
            .await?;

        let order_id = OrderId::encode(user_id, plan, now);
        let amount_cents = self.settings.price_cents(plan);
        let invoice = self
            .gateway
            .create_invoice(CreateInvoiceRequest {
                amount_cents,
                currency: self.settings.currency.clone(),
                order_id: order_id.clone(),
                description: plan.display_name().to_string(),
                ipn_callback_url: self.settings.ipn_callback_url.clone(),
                success_url: self.settings.success_url.clone(),
                cancel_url: self.settings.cancel_url.clone(),
            })
            .await
            .map_err(|e| LifecycleError::gateway(e.to_string()))?;

        let payment = Payment::new_waiting(
            invoice.payment_id.clone(),
            user_id,
            plan,
            amount_cents,
            invoice.invoice_url.clone(),
            now,
        );
        self.payments.insert(&payment).await?;

        info!(
            user_id = user_id.as_i64(),
            plan = plan.key(),
            payment_id = %invoice.payment_id,
            %order_id,
            "invoice created"
        );
        Ok(invoice)
    }

    /// Verifies and applies one IPN delivery.
    ///
    /// The raw body bytes are authenticated before anything is parsed.
    /// Confirmed payments grant channel access BEFORE the payment record is
    /// marked terminal, so a crash between the two leaves the payment
    /// non-terminal and the redelivered callback completes the job.
    pub async fn process_webhook(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, LifecycleError> {
        let signature = signature.ok_or_else(LifecycleError::invalid_signature)?;
        if !self.verifier.verify(raw_body, signature) {
            return Err(LifecycleError::invalid_signature());
        }

        let callback: IpnCallback = serde_json::from_slice(raw_body)
            .map_err(|e| LifecycleError::malformed_payload(e.to_string()))?;
        let order = OrderId::parse(&callback.order_id)?;
        let payment_id = PaymentId::from(callback.payment_id.as_str());
        let status = PaymentStatus::from_gateway(&callback.payment_status);
        let payload: Option<Value> = serde_json::from_slice(raw_body).ok();

        let lock = self.lock_for(order.user_id);
        let _guard = lock.lock().await;

        let now = Timestamp::now();
        match status {
            PaymentStatus::Confirmed => {
                self.apply_confirmation(&payment_id, &order, &callback, payload, now)
                    .await
            }
            _ => self.record_status(&payment_id, status, payload, now).await,
        }
    }

    async fn apply_confirmation(
        &self,
        payment_id: &PaymentId,
        order: &OrderId,
        callback: &IpnCallback,
        payload: Option<Value>,
        now: Timestamp,
    ) -> Result<WebhookOutcome, LifecycleError> {
        if let Some(existing) = self.payments.find(payment_id).await? {
            if existing.status.is_terminal() {
                info!(payment_id = %payment_id, "duplicate confirmation ignored");
                return Ok(WebhookOutcome::Duplicate {
                    payment_id: payment_id.clone(),
                });
            }
        } else {
            // Payment unknown to us (record lost, or invoice created out of
            // band). Trust the authenticated callback and create it.
            let amount_cents = callback
                .price_amount
                .map(|a| (a * 100.0).round() as i64)
                .unwrap_or_else(|| self.settings.price_cents(order.plan));
            let payment = Payment::new_waiting(
                payment_id.clone(),
                order.user_id,
                order.plan,
                amount_cents,
                "",
                now,
            );
            self.payments.insert(&payment).await?;
        }

        // Grant first. If the platform call fails after retries nothing is
        // committed and the gateway's redelivery retries the whole sequence.
        if let Some(channel) = self.settings.channel_for(order.plan) {
            self.grant_with_retry(channel, order.user_id).await?;
        }

        // Activation is written before the payment-status commit below.
        // Within one process the per-user lock keeps a losing duplicate from
        // reaching this point after the winner, so the AlreadyTerminal branch
        // never follows a second activation. Running multiple service
        // instances against one database would break that assumption.
        let mut subscriber = self
            .subscribers
            .upsert_registration(order.user_id, "", now)
            .await?;
        subscriber.activate(order.plan, now);
        let valid_until = subscriber
            .subscription_end
            .unwrap_or_else(|| now.add_days(SUBSCRIPTION_PERIOD_DAYS));
        self.subscribers.update(&subscriber).await?;

        let transition = self
            .payments
            .update_status_if_not_terminal(payment_id, PaymentStatus::Confirmed, payload, now)
            .await?;
        if let StatusTransition::AlreadyTerminal(_) = transition {
            // Raced a parallel delivery; the winner already did all of this.
            return Ok(WebhookOutcome::Duplicate {
                payment_id: payment_id.clone(),
            });
        }

        info!(
            user_id = order.user_id.as_i64(),
            plan = order.plan.key(),
            payment_id = %payment_id,
            valid_until = %valid_until,
            "payment confirmed, access granted"
        );

        if let Err(reason) = self
            .notifier
            .send_welcome(order.user_id, order.plan, valid_until)
            .await
        {
            warn!(user_id = order.user_id.as_i64(), %reason, "welcome message failed");
        }

        Ok(WebhookOutcome::Activated {
            user_id: order.user_id,
            plan: order.plan,
            valid_until,
        })
    }

    async fn record_status(
        &self,
        payment_id: &PaymentId,
        status: PaymentStatus,
        payload: Option<Value>,
        now: Timestamp,
    ) -> Result<WebhookOutcome, LifecycleError> {
        match self
            .payments
            .update_status_if_not_terminal(payment_id, status.clone(), payload, now)
            .await?
        {
            StatusTransition::Applied(payment) => {
                info!(payment_id = %payment_id, status = payment.status.as_str(), "payment status recorded");
                Ok(WebhookOutcome::PaymentRecorded {
                    payment_id: payment_id.clone(),
                    status: payment.status,
                })
            }
            StatusTransition::AlreadyTerminal(_) => Ok(WebhookOutcome::Duplicate {
                payment_id: payment_id.clone(),
            }),
            StatusTransition::NotFound => {
                warn!(payment_id = %payment_id, status = status.as_str(), "status update for unknown payment");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn grant_with_retry(
        &self,
        channel: &ChannelId,
        user_id: PlatformUserId,
    ) -> Result<(), LifecycleError> {
        let attempts = self.settings.grant_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.gate.grant(channel, user_id).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        user_id = user_id.as_i64(),
                        channel = %channel,
                        attempt,
                        error = %e,
                        "channel grant attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.grant_backoff).await;
                    }
                }
            }
        }
        let reason = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        Err(LifecycleError::membership_grant(reason))
    }

    /// Ends an access window that has lapsed.
    ///
    /// Returns `false` without touching anything when the window is no longer
    /// due, which neutralizes stale scheduler fires after a renewal.
    pub async fn expire_subscription(
        &self,
        user_id: PlatformUserId,
    ) -> Result<bool, LifecycleError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let now = Timestamp::now();
        let Some(mut subscriber) = self.subscribers.find(user_id).await? else {
            return Ok(false);
        };
        if !subscriber.is_due_for_expiry(now) {
            return Ok(false);
        }

        if let Some(channel) = subscriber.plan.and_then(|p| self.settings.channel_for(p)) {
            self.gate
                .revoke(channel, user_id)
                .await
                .map_err(|e| LifecycleError::membership_grant(e.to_string()))?;
        }

        subscriber.expire(now);
        self.subscribers.update(&subscriber).await?;
        info!(user_id = user_id.as_i64(), "subscription expired");

        if let Err(reason) = self.notifier.send_renewal_prompt(user_id).await {
            warn!(user_id = user_id.as_i64(), %reason, "renewal prompt failed");
        }
        Ok(true)
    }

    /// Admin removal: revokes channel access immediately regardless of the
    /// remaining window.
    pub async fn revoke_access(&self, user_id: PlatformUserId) -> Result<(), LifecycleError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let now = Timestamp::now();
        let mut subscriber = self
            .subscribers
            .find(user_id)
            .await?
            .ok_or_else(|| LifecycleError::user_not_found(user_id))?;

        if let Some(channel) = subscriber.plan.and_then(|p| self.settings.channel_for(p)) {
            self.gate
                .revoke(channel, user_id)
                .await
                .map_err(|e| LifecycleError::membership_grant(e.to_string()))?;
        }

        subscriber.revoke(now);
        self.subscribers.update(&subscriber).await?;
        info!(user_id = user_id.as_i64(), "access revoked");
        Ok(())
    }

    /// Admin extension: pushes the window end out by `days`, re-granting
    /// channel access so a previously expired or revoked user gets back in.
    pub async fn extend_subscription(
        &self,
        user_id: PlatformUserId,
        days: i64,
    ) -> Result<Timestamp, LifecycleError> {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;

        let now = Timestamp::now();
        let mut subscriber = self
            .subscribers
            .find(user_id)
            .await?
            .ok_or_else(|| LifecycleError::user_not_found(user_id))?;

        if let Some(channel) = subscriber.plan.and_then(|p| self.settings.channel_for(p)) {
            self.grant_with_retry(channel, user_id).await?;
        }

        let new_end = subscriber.extend(days, now);
        self.subscribers.update(&subscriber).await?;
        info!(
            user_id = user_id.as_i64(),
            days,
            new_end = %new_end,
            "subscription extended"
        );
        Ok(new_end)
    }

    /// Users whose access window has lapsed, for the scheduler.
    pub async fn due_for_expiry(&self) -> Result<Vec<PlatformUserId>, LifecycleError> {
        let due = self.subscribers.find_due_for_expiry(Timestamp::now()).await?;
        Ok(due.into_iter().map(|s| s.user_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPaymentRepository, InMemorySubscriberRepository};
    use crate::domain::subscription::{sign_ipn, SubscriberStatus, ORDER_PREFIX};
    use crate::ports::{ChannelGateError, GatewayError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const SECRET: &str = "test-ipn-secret";

    // ════════════════════════════════════════════════════════════════════════
    // Mock Implementations
    // ════════════════════════════════════════════════════════════════════════

    struct MockGateway {
        next_payment_id: String,
        fail: bool,
    }

    impl MockGateway {
        fn returning(payment_id: &str) -> Self {
            Self {
                next_payment_id: payment_id.to_string(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                next_payment_id: String::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for MockGateway {
        async fn create_invoice(
            &self,
            _request: CreateInvoiceRequest,
        ) -> Result<Invoice, GatewayError> {
            if self.fail {
                return Err(GatewayError::request("connection refused"));
            }
            Ok(Invoice {
                payment_id: PaymentId::from(self.next_payment_id.as_str()),
                invoice_url: "https://pay.example/inv".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct MockGate {
        grants: Mutex<Vec<(String, i64)>>,
        revokes: Mutex<Vec<(String, i64)>>,
        grant_failures_remaining: AtomicU32,
        fail_revoke: std::sync::atomic::AtomicBool,
        grant_delay: Option<Duration>,
    }

    impl MockGate {
        fn failing_grants(n: u32) -> Self {
            let gate = Self::default();
            gate.grant_failures_remaining.store(n, Ordering::SeqCst);
            gate
        }

        /// Holds each grant open, widening the window in which a second
        /// delivery of the same payment can race the first.
        fn slow_grants(delay: Duration) -> Self {
            Self {
                grant_delay: Some(delay),
                ..Self::default()
            }
        }

        fn grants(&self) -> Vec<(String, i64)> {
            self.grants.lock().unwrap().clone()
        }

        fn revokes(&self) -> Vec<(String, i64)> {
            self.revokes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelGate for MockGate {
        async fn grant(
            &self,
            channel_id: &ChannelId,
            user_id: PlatformUserId,
        ) -> Result<(), ChannelGateError> {
            if let Some(delay) = self.grant_delay {
                tokio::time::sleep(delay).await;
            }
            if self
                .grant_failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ChannelGateError::new(
                    channel_id.clone(),
                    user_id,
                    "platform unavailable",
                ));
            }
            self.grants
                .lock()
                .unwrap()
                .push((channel_id.as_str().to_string(), user_id.as_i64()));
            Ok(())
        }

        async fn revoke(
            &self,
            channel_id: &ChannelId,
            user_id: PlatformUserId,
        ) -> Result<(), ChannelGateError> {
            if self.fail_revoke.load(Ordering::SeqCst) {
                return Err(ChannelGateError::new(
                    channel_id.clone(),
                    user_id,
                    "platform unavailable",
                ));
            }
            self.revokes
                .lock()
                .unwrap()
                .push((channel_id.as_str().to_string(), user_id.as_i64()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockNotifier {
        welcomes: Mutex<Vec<i64>>,
        prompts: Mutex<Vec<i64>>,
        fail: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send_welcome(
            &self,
            user_id: PlatformUserId,
            _plan: Plan,
            _valid_until: Timestamp,
        ) -> Result<(), String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("blocked by user".to_string());
            }
            self.welcomes.lock().unwrap().push(user_id.as_i64());
            Ok(())
        }

        async fn send_renewal_prompt(&self, user_id: PlatformUserId) -> Result<(), String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("blocked by user".to_string());
            }
            self.prompts.lock().unwrap().push(user_id.as_i64());
            Ok(())
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════

    struct Fixture {
        subscribers: Arc<InMemorySubscriberRepository>,
        payments: Arc<InMemoryPaymentRepository>,
        gate: Arc<MockGate>,
        notifier: Arc<MockNotifier>,
        service: SubscriptionService,
    }

    fn settings() -> LifecycleSettings {
        let mut channels = HashMap::new();
        channels.insert(Plan::Beginner, ChannelId::new("-1001"));
        channels.insert(Plan::Mid, ChannelId::new("-1002"));
        channels.insert(Plan::Complete, ChannelId::new("-1003"));
        LifecycleSettings {
            ipn_callback_url: "https://gate.example/payment_webhook".to_string(),
            success_url: "https://gate.example/thanks".to_string(),
            cancel_url: "https://gate.example/cancelled".to_string(),
            channels,
            grant_backoff: Duration::from_millis(1),
            ..LifecycleSettings::default()
        }
    }

    fn fixture_with(gateway: Arc<dyn PaymentGateway>, gate: Arc<MockGate>) -> Fixture {
        let subscribers = Arc::new(InMemorySubscriberRepository::new());
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let notifier = Arc::new(MockNotifier::default());
        let service = SubscriptionService::new(
            subscribers.clone(),
            payments.clone(),
            gateway,
            gate.clone(),
            notifier.clone(),
            IpnVerifier::new(SECRET),
            settings(),
        );
        Fixture {
            subscribers,
            payments,
            gate,
            notifier,
            service,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            Arc::new(MockGateway::returning("p-100")),
            Arc::new(MockGate::default()),
        )
    }

    fn uid(n: i64) -> PlatformUserId {
        PlatformUserId::new(n)
    }

    fn confirmed_body(payment_id: &str, user_id: i64, plan: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "payment_id": payment_id,
            "payment_status": "finished",
            "order_id": format!("{}_{}_{}_171700000", ORDER_PREFIX, user_id, plan),
            "price_amount": 24.99,
            "pay_currency": "btc",
        }))
        .unwrap()
    }

    fn status_body(payment_id: &str, user_id: i64, plan: &str, status: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "payment_id": payment_id,
            "payment_status": status,
            "order_id": format!("{}_{}_{}_171700000", ORDER_PREFIX, user_id, plan),
        }))
        .unwrap()
    }

    async fn deliver(fx: &Fixture, body: &[u8]) -> Result<WebhookOutcome, LifecycleError> {
        let sig = sign_ipn(SECRET, body);
        fx.service.process_webhook(body, Some(&sig)).await
    }

    async fn activate_user(fx: &Fixture, user_id: i64, payment_id: &str) {
        fx.service
            .initiate_payment(uid(user_id), "user", Plan::Mid)
            .await
            .unwrap();
        let body = confirmed_body(payment_id, user_id, "mid");
        deliver(fx, &body).await.unwrap();
    }

    // ════════════════════════════════════════════════════════════════════════
    // Registration Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn register_user_creates_then_refreshes_contact() {
        let fx = fixture();

        let created = fx.service.register_user(uid(42), "alice").await.unwrap();
        assert_eq!(created.username, "alice");
        assert_eq!(created.status, SubscriberStatus::None);

        let refreshed = fx
            .service
            .register_user(uid(42), "alice_renamed")
            .await
            .unwrap();
        assert_eq!(refreshed.username, "alice_renamed");
        assert_eq!(refreshed.first_seen, created.first_seen);
        assert!(!refreshed.last_interaction.is_before(&created.last_interaction));
        assert_eq!(fx.subscribers.count_all().await.unwrap(), 1);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Invoice Creation Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn initiate_payment_records_waiting_payment() {
        let fx = fixture();
        let invoice = fx
            .service
            .initiate_payment(uid(42), "alice", Plan::Mid)
            .await
            .unwrap();

        assert_eq!(invoice.payment_id.as_str(), "p-100");
        let payment = fx
            .payments
            .find(&PaymentId::from("p-100"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Waiting);
        assert_eq!(payment.amount_cents, 2499);
        assert_eq!(payment.user_id, uid(42));
    }

    #[tokio::test]
    async fn initiate_payment_surfaces_gateway_failure() {
        let fx = fixture_with(Arc::new(MockGateway::failing()), Arc::new(MockGate::default()));
        let err = fx
            .service
            .initiate_payment(uid(42), "alice", Plan::Mid)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Gateway(_)));
        assert_eq!(fx.payments.count_all().await.unwrap(), 0);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Webhook Confirmation Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn confirmed_payment_grants_access_and_opens_window() {
        let fx = fixture();
        fx.service
            .initiate_payment(uid(42), "alice", Plan::Mid)
            .await
            .unwrap();

        let body = confirmed_body("p-100", 42, "mid");
        let outcome = deliver(&fx, &body).await.unwrap();

        match outcome {
            WebhookOutcome::Activated {
                user_id,
                plan,
                valid_until,
            } => {
                assert_eq!(user_id, uid(42));
                assert_eq!(plan, Plan::Mid);
                assert!(valid_until.is_after(&Timestamp::now()));
            }
            other => panic!("expected Activated, got {other:?}"),
        }

        let subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        assert_eq!(subscriber.status, SubscriberStatus::Active);
        assert_eq!(subscriber.plan, Some(Plan::Mid));
        assert!(subscriber.has_access(Timestamp::now()));

        assert_eq!(fx.gate.grants(), vec![("-1002".to_string(), 42)]);
        assert_eq!(*fx.notifier.welcomes.lock().unwrap(), vec![42]);

        let payment = fx
            .payments
            .find(&PaymentId::from("p-100"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmed);
    }

    #[tokio::test]
    async fn duplicate_confirmation_changes_nothing() {
        let fx = fixture();
        fx.service
            .initiate_payment(uid(42), "alice", Plan::Mid)
            .await
            .unwrap();

        let body = confirmed_body("p-100", 42, "mid");
        deliver(&fx, &body).await.unwrap();
        let first_end = fx
            .subscribers
            .find(uid(42))
            .await
            .unwrap()
            .unwrap()
            .subscription_end;

        let outcome = deliver(&fx, &body).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Duplicate { .. }));

        let subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        assert_eq!(subscriber.subscription_end, first_end);
        assert_eq!(fx.gate.grants().len(), 1);
        assert_eq!(fx.notifier.welcomes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_duplicate_deliveries_activate_once() {
        // Gate call held open so the second delivery is in flight while the
        // first is still mid-confirmation; the per-user lock must serialize
        // them into exactly one activation.
        let fx = fixture_with(
            Arc::new(MockGateway::returning("p-100")),
            Arc::new(MockGate::slow_grants(Duration::from_millis(20))),
        );
        fx.service
            .initiate_payment(uid(42), "alice", Plan::Mid)
            .await
            .unwrap();

        let start = Timestamp::now();
        let body = confirmed_body("p-100", 42, "mid");
        let (first, second) = tokio::join!(deliver(&fx, &body), deliver(&fx, &body));

        let outcomes = [first.unwrap(), second.unwrap()];
        let activated = outcomes
            .iter()
            .filter(|o| matches!(o, WebhookOutcome::Activated { .. }))
            .count();
        let duplicate = outcomes
            .iter()
            .filter(|o| matches!(o, WebhookOutcome::Duplicate { .. }))
            .count();
        assert_eq!(activated, 1);
        assert_eq!(duplicate, 1);

        assert_eq!(fx.gate.grants().len(), 1);
        assert_eq!(fx.notifier.welcomes.lock().unwrap().len(), 1);

        // One 30-day window, not two stacked.
        let end = fx
            .subscribers
            .find(uid(42))
            .await
            .unwrap()
            .unwrap()
            .subscription_end
            .unwrap();
        assert!(end.is_after(&start.add_days(29)));
        assert!(end.is_before(&start.add_days(31)));
    }

    #[tokio::test]
    async fn confirmation_for_unknown_payment_creates_record_and_activates() {
        let fx = fixture();
        let body = confirmed_body("p-oob", 7, "complete");

        let outcome = deliver(&fx, &body).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Activated { .. }));

        let payment = fx
            .payments
            .find(&PaymentId::from("p-oob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Confirmed);
        assert_eq!(payment.amount_cents, 2499); // from price_amount in the body

        let subscriber = fx.subscribers.find(uid(7)).await.unwrap().unwrap();
        assert_eq!(subscriber.status, SubscriberStatus::Active);
    }

    #[tokio::test]
    async fn renewal_stacks_on_remaining_window() {
        let fx = fixture();
        activate_user(&fx, 42, "p-100").await;
        let first_end = fx
            .subscribers
            .find(uid(42))
            .await
            .unwrap()
            .unwrap()
            .subscription_end
            .unwrap();

        let body = confirmed_body("p-200", 42, "mid");
        deliver(&fx, &body).await.unwrap();

        let second_end = fx
            .subscribers
            .find(uid(42))
            .await
            .unwrap()
            .unwrap()
            .subscription_end
            .unwrap();
        assert_eq!(second_end, first_end.add_days(SUBSCRIPTION_PERIOD_DAYS));
    }

    #[tokio::test]
    async fn grant_retries_then_succeeds() {
        let gate = Arc::new(MockGate::failing_grants(2));
        let fx = fixture_with(Arc::new(MockGateway::returning("p-100")), gate);
        fx.service
            .initiate_payment(uid(42), "alice", Plan::Mid)
            .await
            .unwrap();

        let body = confirmed_body("p-100", 42, "mid");
        let outcome = deliver(&fx, &body).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Activated { .. }));
        assert_eq!(fx.gate.grants().len(), 1);
    }

    #[tokio::test]
    async fn grant_exhaustion_commits_nothing() {
        let gate = Arc::new(MockGate::failing_grants(10));
        let fx = fixture_with(Arc::new(MockGateway::returning("p-100")), gate);
        fx.service
            .initiate_payment(uid(42), "alice", Plan::Mid)
            .await
            .unwrap();

        let body = confirmed_body("p-100", 42, "mid");
        let err = deliver(&fx, &body).await.unwrap_err();
        assert!(matches!(err, LifecycleError::MembershipGrant(_)));

        // Payment stays non-terminal so the redelivery can finish the job.
        let payment = fx
            .payments
            .find(&PaymentId::from("p-100"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Waiting);
        let subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        assert_ne!(subscriber.status, SubscriberStatus::Active);
        assert!(fx.notifier.welcomes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn welcome_failure_does_not_fail_confirmation() {
        let fx = fixture();
        fx.notifier.fail.store(true, Ordering::SeqCst);
        fx.service
            .initiate_payment(uid(42), "alice", Plan::Mid)
            .await
            .unwrap();

        let body = confirmed_body("p-100", 42, "mid");
        let outcome = deliver(&fx, &body).await.unwrap();
        assert!(matches!(outcome, WebhookOutcome::Activated { .. }));
    }

    // ════════════════════════════════════════════════════════════════════════
    // Webhook Rejection Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn rejects_missing_signature() {
        let fx = fixture();
        let body = confirmed_body("p-100", 42, "mid");
        let err = fx.service.process_webhook(&body, None).await.unwrap_err();
        assert_eq!(err, LifecycleError::InvalidSignature);
    }

    #[tokio::test]
    async fn rejects_tampered_body() {
        let fx = fixture();
        let body = confirmed_body("p-100", 42, "mid");
        let sig = sign_ipn(SECRET, &body);
        let tampered = confirmed_body("p-100", 43, "mid");

        let err = fx
            .service
            .process_webhook(&tampered, Some(&sig))
            .await
            .unwrap_err();
        assert_eq!(err, LifecycleError::InvalidSignature);
        assert!(fx.gate.grants().is_empty());
    }

    #[tokio::test]
    async fn rejects_malformed_json_body() {
        let fx = fixture();
        let body = b"not json at all";
        let sig = sign_ipn(SECRET, body);
        let err = fx
            .service
            .process_webhook(body, Some(&sig))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn rejects_malformed_order_id() {
        let fx = fixture();
        let body = serde_json::to_vec(&serde_json::json!({
            "payment_id": "p-100",
            "payment_status": "finished",
            "order_id": "someone_elses_order_123",
        }))
        .unwrap();
        let sig = sign_ipn(SECRET, &body);
        let err = fx
            .service
            .process_webhook(&body, Some(&sig))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::MalformedOrderId(_)));
    }

    #[tokio::test]
    async fn accepts_numeric_payment_id() {
        let fx = fixture();
        let body = serde_json::to_vec(&serde_json::json!({
            "payment_id": 5077125051_i64,
            "payment_status": "finished",
            "order_id": format!("{}_42_mid_171700000", ORDER_PREFIX),
            "price_amount": 24.99,
        }))
        .unwrap();
        let sig = sign_ipn(SECRET, &body);
        let outcome = fx
            .service
            .process_webhook(&body, Some(&sig))
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Activated { .. }));
        assert!(fx
            .payments
            .find(&PaymentId::from("5077125051"))
            .await
            .unwrap()
            .is_some());
    }

    // ════════════════════════════════════════════════════════════════════════
    // Non-Confirming Status Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn failed_status_is_recorded_without_granting_access() {
        let fx = fixture();
        fx.service
            .initiate_payment(uid(42), "alice", Plan::Mid)
            .await
            .unwrap();

        let body = status_body("p-100", 42, "mid", "failed");
        let outcome = deliver(&fx, &body).await.unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::PaymentRecorded {
                status: PaymentStatus::Failed,
                ..
            }
        ));
        assert!(fx.gate.grants().is_empty());
        let subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        assert_ne!(subscriber.status, SubscriberStatus::Active);
    }

    #[tokio::test]
    async fn confirmation_after_failed_is_rejected_as_duplicate() {
        let fx = fixture();
        fx.service
            .initiate_payment(uid(42), "alice", Plan::Mid)
            .await
            .unwrap();

        deliver(&fx, &status_body("p-100", 42, "mid", "failed"))
            .await
            .unwrap();
        let outcome = deliver(&fx, &confirmed_body("p-100", 42, "mid"))
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Duplicate { .. }));
        assert!(fx.gate.grants().is_empty());
    }

    #[tokio::test]
    async fn unknown_payment_with_non_confirming_status_is_ignored() {
        let fx = fixture();
        let body = status_body("p-absent", 42, "mid", "waiting");
        let outcome = deliver(&fx, &body).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Expiry / Revoke / Extend Tests
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn expire_revokes_access_and_prompts_renewal() {
        let fx = fixture();
        activate_user(&fx, 42, "p-100").await;

        // Backdate the window so it is due.
        let mut subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        subscriber.subscription_end = Some(Timestamp::now().minus_days(1));
        fx.subscribers.update(&subscriber).await.unwrap();

        let expired = fx.service.expire_subscription(uid(42)).await.unwrap();
        assert!(expired);

        let subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        assert_eq!(subscriber.status, SubscriberStatus::Expired);
        assert_eq!(fx.gate.revokes(), vec![("-1002".to_string(), 42)]);
        assert_eq!(*fx.notifier.prompts.lock().unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn stale_expiry_fire_is_a_noop_after_renewal() {
        let fx = fixture();
        activate_user(&fx, 42, "p-100").await;

        let expired = fx.service.expire_subscription(uid(42)).await.unwrap();
        assert!(!expired);

        let subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        assert_eq!(subscriber.status, SubscriberStatus::Active);
        assert!(fx.gate.revokes().is_empty());
    }

    #[tokio::test]
    async fn failed_revoke_leaves_subscription_active_for_retry() {
        let fx = fixture();
        activate_user(&fx, 42, "p-100").await;
        let mut subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        subscriber.subscription_end = Some(Timestamp::now().minus_days(1));
        fx.subscribers.update(&subscriber).await.unwrap();

        fx.gate.fail_revoke.store(true, Ordering::SeqCst);
        let err = fx.service.expire_subscription(uid(42)).await.unwrap_err();
        assert!(matches!(err, LifecycleError::MembershipGrant(_)));

        let subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        assert_eq!(subscriber.status, SubscriberStatus::Active);
    }

    #[tokio::test]
    async fn revoke_access_removes_user_immediately() {
        let fx = fixture();
        activate_user(&fx, 42, "p-100").await;

        fx.service.revoke_access(uid(42)).await.unwrap();

        let subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        assert_eq!(subscriber.status, SubscriberStatus::Revoked);
        assert!(!subscriber.has_access(Timestamp::now()));
        assert_eq!(fx.gate.revokes(), vec![("-1002".to_string(), 42)]);
    }

    #[tokio::test]
    async fn revoke_unknown_user_fails() {
        let fx = fixture();
        let err = fx.service.revoke_access(uid(999)).await.unwrap_err();
        assert!(matches!(err, LifecycleError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn extend_pushes_window_and_regrants() {
        let fx = fixture();
        activate_user(&fx, 42, "p-100").await;
        let before = fx
            .subscribers
            .find(uid(42))
            .await
            .unwrap()
            .unwrap()
            .subscription_end
            .unwrap();

        let new_end = fx.service.extend_subscription(uid(42), 7).await.unwrap();
        assert_eq!(new_end, before.add_days(7));
        assert_eq!(fx.gate.grants().len(), 2); // activation + extension
    }

    #[tokio::test]
    async fn extend_reactivates_expired_user() {
        let fx = fixture();
        activate_user(&fx, 42, "p-100").await;
        let mut subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        subscriber.subscription_end = Some(Timestamp::now().minus_days(5));
        subscriber.expire(Timestamp::now());
        fx.subscribers.update(&subscriber).await.unwrap();

        let new_end = fx.service.extend_subscription(uid(42), 10).await.unwrap();
        assert!(new_end.is_after(&Timestamp::now()));

        let subscriber = fx.subscribers.find(uid(42)).await.unwrap().unwrap();
        assert_eq!(subscriber.status, SubscriberStatus::Active);
        assert!(subscriber.has_access(Timestamp::now()));
    }
}
