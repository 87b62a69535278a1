//! Admin CLI command definitions and execution.
//!
//! The `gate-admin` binary wraps `AdminService` for operators:
//!
//! - `stats` - subscriber and revenue counters
//! - `users` - list subscribers, optionally filtered by status
//! - `extend` - push a user's window out by N days
//! - `revoke` - remove a user's channel access immediately
//! - `cleanup` - bulk-expire lapsed records the scheduler missed
//! - `backup` - dump subscribers and payments to a JSON file

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::application::AdminService;
use crate::domain::foundation::{PlatformUserId, Timestamp};
use crate::domain::subscription::{LifecycleError, SubscriberStatus};

/// channel-gate administration
#[derive(Parser, Debug)]
#[command(name = "gate-admin")]
#[command(about = "Operator tools for the paid channel gate", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Status filter for the `users` command.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CliStatusFilter {
    Active,
    Expired,
    Revoked,
    None,
}

impl From<CliStatusFilter> for SubscriberStatus {
    fn from(filter: CliStatusFilter) -> Self {
        match filter {
            CliStatusFilter::Active => SubscriberStatus::Active,
            CliStatusFilter::Expired => SubscriberStatus::Expired,
            CliStatusFilter::Revoked => SubscriberStatus::Revoked,
            CliStatusFilter::None => SubscriberStatus::None,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show subscriber and revenue counters
    Stats,

    /// List subscribers, most recently active first
    Users {
        /// Only show subscribers with this status
        #[arg(long, value_enum)]
        status: Option<CliStatusFilter>,
    },

    /// Extend a user's subscription window
    Extend {
        /// Platform user id
        user_id: i64,
        /// Days to add
        #[arg(default_value_t = 30)]
        days: i64,
    },

    /// Revoke a user's channel access immediately
    Revoke {
        /// Platform user id
        user_id: i64,
    },

    /// Mark every lapsed-but-active subscription as expired
    Cleanup,

    /// Dump subscribers and payments to a JSON file
    Backup {
        /// Output path (defaults to backup_<timestamp>.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Runs one admin command, printing human-readable output.
pub async fn run(command: Commands, admin: &AdminService) -> Result<(), LifecycleError> {
    match command {
        Commands::Stats => {
            let stats = admin.stats().await?;
            println!("Users:               {}", stats.total_users);
            println!("Active:              {}", stats.active_subscriptions);
            println!("Expired:             {}", stats.expired_subscriptions);
            println!("Payments:            {}", stats.total_payments);
            println!("Successful payments: {}", stats.successful_payments);
            println!(
                "Revenue:             ${:.2}",
                stats.revenue_cents as f64 / 100.0
            );
        }
        Commands::Users { status } => {
            let users = admin.list_users(status.map(Into::into)).await?;
            if users.is_empty() {
                println!("No subscribers found.");
                return Ok(());
            }
            let now = Timestamp::now();
            for user in users {
                let plan = user.plan.map(|p| p.key()).unwrap_or("-");
                let days = user.days_remaining(now);
                println!(
                    "{:<12} {:<20} {:<10} {:<8} {} days left",
                    user.user_id.as_i64(),
                    user.username,
                    plan,
                    user.status,
                    days
                );
            }
        }
        Commands::Extend { user_id, days } => {
            let new_end = admin.extend(PlatformUserId::new(user_id), days).await?;
            println!("Extended user {} until {}", user_id, new_end);
        }
        Commands::Revoke { user_id } => {
            admin.revoke(PlatformUserId::new(user_id)).await?;
            println!("Revoked access for user {}", user_id);
        }
        Commands::Cleanup => {
            let count = admin.cleanup_expired().await?;
            println!("Marked {} subscriptions expired", count);
        }
        Commands::Backup { output } => {
            let path = admin.backup(output.as_deref()).await?;
            println!("Backup written to {}", path.display());
        }
    }
    Ok(())
}
