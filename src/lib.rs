//! Channel Gate - Paid access management for tiered messaging channels.
//!
//! Users buy a subscription plan through a crypto payment gateway; a verified
//! payment webhook admits them to the matching channel for 30 days, and a
//! background scheduler removes them again when the subscription lapses.

pub mod adapters;
pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod ports;
