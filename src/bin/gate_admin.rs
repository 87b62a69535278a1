//! gate-admin entry point.
//!
//! Connects to the same database and platform APIs as the server and runs
//! one administration command.

use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use channel_gate::adapters::nowpayments::{NowPaymentsConfig, NowPaymentsGateway};
use channel_gate::adapters::postgres::{PostgresPaymentRepository, PostgresSubscriberRepository};
use channel_gate::adapters::telegram::{TelegramChannelGate, TelegramConfig, TelegramNotifier};
use channel_gate::application::{AdminService, SubscriptionService};
use channel_gate::cli::{run, Cli};
use channel_gate::config::AppConfig;
use channel_gate::domain::subscription::IpnVerifier;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    config.validate()?;

    // Quiet by default; operators raise RUST_LOG when debugging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

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
    let admin = AdminService::new(service, subscribers, payments);

    run(cli.command, &admin).await?;
    Ok(())
}
