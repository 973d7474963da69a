//! # Utility Modules
//!
//! Supporting utilities for logging, metrics, shutdown and timing.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe observability counters, one set per node
//! - **Shutdown**: watch-channel stop signal awaited by background tasks
//! - **Time**: Unix timestamps for `local_time` and last-seen fields

pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod time;

pub use metrics::{Metrics, MetricsSnapshot};
