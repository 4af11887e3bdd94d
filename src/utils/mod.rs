//! # Utility Modules
//!
//! Supporting utilities shared by the protocol and transport layers.
//!
//! ## Components
//! - **Logging**: `tracing` subscriber setup from [`crate::config::LoggingConfig`]
//! - **Metrics**: Thread-safe observability counters

pub mod logging;
pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
