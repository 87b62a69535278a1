//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Variables carry the `CHANNEL_GATE` prefix
//! and nested values use double underscores as separators:
//!
//! - `CHANNEL_GATE__SERVER__PORT=8080` -> `server.port = 8080`
//! - `CHANNEL_GATE__DATABASE__URL=...` -> `database.url = ...`
//! - `CHANNEL_GATE__GATEWAY__IPN_SECRET=...` -> `gateway.ipn_secret = ...`

mod channels;
mod database;
mod error;
mod gateway;
mod plans;
mod scheduler;
mod server;

pub use channels::ChannelsConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use gateway::GatewayConfig;
pub use plans::PlansConfig;
pub use scheduler::SchedulerConfig;
pub use server::ServerConfig;

use serde::Deserialize;

use crate::application::LifecycleSettings;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, log filter)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Payment gateway configuration (NOWPayments)
    pub gateway: GatewayConfig,

    /// Bot token and per-plan channels
    pub channels: ChannelsConfig,

    /// Price overrides
    #[serde(default)]
    pub plans: PlansConfig,

    /// Expiry scheduler tunables
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables, reading `.env` first
    /// when present.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CHANNEL_GATE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.gateway.validate()?;
        self.channels.validate()?;
        self.plans.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }

    /// Settings bundle for the lifecycle engine.
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            currency: self.gateway.currency.clone(),
            ipn_callback_url: self.gateway.ipn_callback_url.clone(),
            success_url: self.gateway.success_url.clone(),
            cancel_url: self.gateway.cancel_url.clone(),
            channels: self.channels.directory(),
            prices_cents: self.plans.overrides(),
            ..LifecycleSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::Plan;

    fn valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/channel_gate".to_string(),
                min_connections: 1,
                max_connections: 10,
                acquire_timeout_secs: 30,
                run_migrations: false,
            },
            gateway: GatewayConfig {
                api_key: "np-key".to_string(),
                ipn_secret: "ipn-secret".to_string(),
                ipn_callback_url: "https://gate.example/payment_webhook".to_string(),
                success_url: String::new(),
                cancel_url: String::new(),
                currency: "USD".to_string(),
            },
            channels: ChannelsConfig {
                bot_token: "123:abc".to_string(),
                beginner_channel: "-1001".to_string(),
                mid_channel: "-1002".to_string(),
                complete_channel: "-1003".to_string(),
            },
            plans: PlansConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn missing_ipn_secret_fails_validation() {
        let mut config = valid_config();
        config.gateway.ipn_secret = String::new();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::MissingRequired(_))
        ));
    }

    #[test]
    fn relative_callback_url_fails_validation() {
        let mut config = valid_config();
        config.gateway.ipn_callback_url = "/payment_webhook".to_string();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidCallbackUrl)
        ));
    }

    #[test]
    fn bad_database_url_fails_validation() {
        let mut config = valid_config();
        config.database.url = "mysql://nope".to_string();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidDatabaseUrl)
        ));
    }

    #[test]
    fn lifecycle_settings_carry_overrides_and_channels() {
        let mut config = valid_config();
        config.plans.mid_price_cents = Some(2999);

        let settings = config.lifecycle_settings();
        assert_eq!(settings.price_cents(Plan::Mid), 2999);
        assert_eq!(settings.price_cents(Plan::Beginner), 1799);
        assert_eq!(
            settings.channels.get(&Plan::Complete).unwrap().as_str(),
            "-1003"
        );
    }

    #[test]
    fn zero_poll_interval_fails_validation() {
        let mut config = valid_config();
        config.scheduler.poll_interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPollInterval)
        ));
    }
}
