//! Adapters - implementations of the ports against real infrastructure.
//!
//! - `postgres` - sqlx-backed repositories
//! - `nowpayments` - hosted invoice creation at the crypto gateway
//! - `telegram` - channel membership control and user notifications
//! - `http` - axum server exposing the webhook and operator endpoints
//! - `memory` - map-backed repositories for tests and local runs

pub mod http;
pub mod memory;
pub mod nowpayments;
pub mod postgres;
pub mod telegram;
