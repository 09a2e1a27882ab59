//! Configuration validation

use super::Config;
use crate::control::validate_update;
use crate::telemetry::is_valid_level;
use std::collections::HashSet;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_logging(config, &mut result);
    validate_table(config, &mut result);
    validate_control(config, &mut result);
    validate_ports(config, &mut result);
    validate_rules(config, &mut result);

    result
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    if !is_valid_level(&config.logging.level) {
        result.warn(format!(
            "logging.level: unknown level '{}', using info",
            config.logging.level
        ));
    }
}

fn validate_table(config: &Config, result: &mut ValidationResult) {
    if config.table.max_entries == 0 {
        result.error("table.max_entries: must be at least 1");
    }
}

fn validate_control(config: &Config, result: &mut ValidationResult) {
    if config.control.listen.parse::<SocketAddr>().is_err() {
        result.error(format!(
            "control.listen: '{}' is not a socket address",
            config.control.listen
        ));
    }
    if config.control.request_timeout_ms == 0 {
        result.error("control.request_timeout_ms: must be greater than 0");
    }
}

fn validate_ports(config: &Config, result: &mut ValidationResult) {
    if config.ports.is_empty() {
        result.error("ports: at least one port is required");
    }

    let mut ingress = HashSet::new();
    for (i, port) in config.ports.iter().enumerate() {
        if port.ingress == port.egress {
            result.warn(format!(
                "ports[{}]: ingress and egress are both '{}'",
                i, port.ingress
            ));
        }
        if !ingress.insert(port.ingress.as_str()) {
            result.error(format!(
                "ports[{}]: ingress '{}' used by more than one port",
                i, port.ingress
            ));
        }
    }
}

fn validate_rules(config: &Config, result: &mut ValidationResult) {
    let known = config.interface_names();
    let mut seen = HashSet::new();

    for (i, rule) in config.rules.iter().enumerate() {
        let (prefix, action) = match validate_update(&rule.to_request()) {
            Ok(validated) => validated,
            Err(e) => {
                result.error(format!("rules[{}]: {} ({})", i, e, e.code()));
                continue;
            }
        };

        if let Some(name) = action.interface() {
            if !known.iter().any(|k| k == name) {
                result.error(format!(
                    "rules[{}]: redirect interface '{}' not defined in ports or interfaces",
                    i, name
                ));
            }
        }

        if !seen.insert(prefix) {
            result.warn(format!(
                "rules[{}]: duplicate prefix {}, later entry wins",
                i, prefix
            ));
        }
    }
}
