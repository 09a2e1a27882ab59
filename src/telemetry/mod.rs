//! Logging setup and packet/rule counters.

mod logging;
mod metrics;

pub use logging::{init_logging, is_valid_level, LogConfig, LogFormat};
pub use metrics::{Counter, InterfaceStats, MetricsRegistry};
