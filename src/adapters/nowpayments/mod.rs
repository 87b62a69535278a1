//! NOWPayments gateway adapter.

mod gateway;

pub use gateway::{NowPaymentsConfig, NowPaymentsGateway};
