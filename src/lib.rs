//! prefixwall - remotely programmable prefix filter
//!
//! A control plane installs prefix rules (pass, drop, redirect to an
//! interface) into a longest-prefix-match table; a userspace packet path
//! classifies every frame against it and enforces the result.

pub mod capture;
pub mod config;
pub mod control;
pub mod daemon;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result, RuleError};
