//! channel-gate server entry point.
//!
//! Wires the PostgreSQL repositories, NOWPayments gateway and Telegram
//! adapters into the lifecycle engine, then runs the axum server and the
//! expiry scheduler side by side until ctrl-c.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use channel_gate::adapters::http::{router, AppState};
use channel_gate::adapters::nowpayments::{NowPaymentsConfig, NowPaymentsGateway};
use channel_gate::adapters::postgres::{PostgresPaymentRepository, PostgresSubscriberRepository};
use channel_gate::adapters::telegram::{TelegramChannelGate, TelegramConfig, TelegramNotifier};
use channel_gate::application::scheduler::ExpirySchedulerConfig;
use channel_gate::application::{AdminService, ExpiryScheduler, SubscriptionService};
use channel_gate::config::AppConfig;
use channel_gate::domain::subscription::IpnVerifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("migrations applied");
    }

    let subscribers = Arc::new(PostgresSubscriberRepository::new(pool.clone()));
    let payments = Arc::new(PostgresPaymentRepository::new(pool));
    let gateway = Arc::new(NowPaymentsGateway::new(NowPaymentsConfig::new(
        config.gateway.api_key.clone(),
    ))?);
    let telegram = TelegramConfig::new(config.channels.bot_token.clone());
    let gate = Arc::new(TelegramChannelGate::new(telegram.clone())?);
    let notifier = Arc::new(TelegramNotifier::new(telegram)?);

    let service = Arc::new(SubscriptionService::new(
        subscribers.clone(),
        payments.clone(),
        gateway,
        gate,
        notifier,
        IpnVerifier::new(config.gateway.ipn_secret.clone()),
        config.lifecycle_settings(),
    ));
    let admin = Arc::new(AdminService::new(
        service.clone(),
        subscribers,
        payments,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = ExpiryScheduler::with_config(
        service.clone(),
        ExpirySchedulerConfig::default().with_poll_interval(config.scheduler.poll_interval()),
    );
    let scheduler_handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    let app = router(AppState { service, admin });
    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        })
        .await?;

    shutdown_tx.send(true).ok();
    scheduler_handle.await?;
    info!("shutdown complete");
    Ok(())
}
