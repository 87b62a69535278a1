//! Domain layer - aggregates, value objects and pure business rules.
//!
//! No I/O lives here; everything below `ports` and `adapters` depends on this
//! layer, never the other way around.

pub mod foundation;
pub mod subscription;
