//! Metrics collection for packet and rule statistics.
//!
//! Provides thread-safe counters for tracking classification outcomes,
//! control-plane activity and per-interface traffic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-interface statistics.
#[derive(Debug, Default)]
pub struct InterfaceStats {
    pub rx_packets: Counter,
    pub rx_bytes: Counter,
    pub tx_packets: Counter,
    pub tx_bytes: Counter,
    pub rx_errors: Counter,
    pub tx_errors: Counter,
}

impl InterfaceStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a received packet.
    pub fn record_rx(&self, bytes: usize) {
        self.rx_packets.inc();
        self.rx_bytes.add(bytes as u64);
    }

    /// Records a transmitted packet.
    pub fn record_tx(&self, bytes: usize) {
        self.tx_packets.inc();
        self.tx_bytes.add(bytes as u64);
    }
}

/// Process-wide metrics.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    interfaces: RwLock<HashMap<String, InterfaceStats>>,

    // Data path
    /// Frames handed to the classifier.
    pub packets_received: Counter,
    /// Frames forwarded on the default path.
    pub packets_passed: Counter,
    /// Frames discarded, by rule or degraded redirect.
    pub packets_dropped: Counter,
    /// Frames sent out of a redirect target.
    pub packets_redirected: Counter,
    /// Redirects whose target no longer resolved.
    pub degraded_redirects: Counter,
    /// Transmit attempts that failed.
    pub egress_errors: Counter,

    // Control path
    pub rules_installed: Counter,
    pub rules_withdrawn: Counter,
    /// Requests rejected by the validator or the table.
    pub rule_rejections: Counter,

    /// Current number of installed rules.
    pub rule_count: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an interface for statistics tracking.
    pub fn register_interface(&self, name: &str) {
        self.interfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_default();
    }

    fn with_interface(&self, interface: &str, f: impl FnOnce(&InterfaceStats)) {
        if let Some(stats) = self
            .interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(interface)
        {
            f(stats);
        }
    }

    /// Records a received packet on an interface.
    pub fn record_rx(&self, interface: &str, bytes: usize) {
        self.with_interface(interface, |s| s.record_rx(bytes));
    }

    /// Records a transmitted packet on an interface.
    pub fn record_tx(&self, interface: &str, bytes: usize) {
        self.with_interface(interface, |s| s.record_tx(bytes));
    }

    pub fn record_rx_error(&self, interface: &str) {
        self.with_interface(interface, |s| s.rx_errors.inc());
    }

    pub fn record_tx_error(&self, interface: &str) {
        self.with_interface(interface, |s| s.tx_errors.inc());
    }

    /// Updates the rule count gauge.
    pub fn set_rule_count(&self, count: usize) {
        self.rule_count.store(count as u64, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs, interfaces sorted by name.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("packets_received".into(), self.packets_received.get()),
            ("packets_passed".into(), self.packets_passed.get()),
            ("packets_dropped".into(), self.packets_dropped.get()),
            ("packets_redirected".into(), self.packets_redirected.get()),
            ("degraded_redirects".into(), self.degraded_redirects.get()),
            ("egress_errors".into(), self.egress_errors.get()),
            ("rules_installed".into(), self.rules_installed.get()),
            ("rules_withdrawn".into(), self.rules_withdrawn.get()),
            ("rule_rejections".into(), self.rule_rejections.get()),
            ("rule_count".into(), self.rule_count.load(Ordering::Relaxed)),
        ];

        let interfaces = self
            .interfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = interfaces.keys().collect();
        names.sort();
        for name in names {
            let stats = &interfaces[name];
            result.extend([
                (format!("{}_rx_packets", name), stats.rx_packets.get()),
                (format!("{}_rx_bytes", name), stats.rx_bytes.get()),
                (format!("{}_tx_packets", name), stats.tx_packets.get()),
                (format!("{}_tx_bytes", name), stats.tx_bytes.get()),
                (format!("{}_rx_errors", name), stats.rx_errors.get()),
                (format!("{}_tx_errors", name), stats.tx_errors.get()),
            ]);
        }

        result
    }
}
