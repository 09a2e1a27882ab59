//! Configuration management
//!
//! Loads and validates config.toml.

mod types;
mod validation;

pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

/// Parse configuration from TOML text
pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataplane::{ActionKind, MatchField};
    use crate::telemetry::LogFormat;

    #[test]
    fn test_parse_full_config() {
        let config = parse(
            r#"
            [logging]
            level = "debug"
            format = "json"

            [table]
            default_action = "drop"
            match_field = "source"
            max_entries = 1000

            [control]
            listen = "0.0.0.0:6000"
            request_timeout_ms = 250

            [journal]
            path = "/tmp/rules.journal"

            [metrics]
            interval_secs = 10

            [[ports]]
            ingress = "eth0"
            egress = "eth1"

            [[interfaces]]
            name = "eth3"

            [[rules]]
            prefix = "8.8.8.8/32"
            action = "redirect"
            redirect_interface = "eth3"
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.table.default_action, DefaultAction::Drop);
        assert_eq!(config.table.match_field, MatchField::Source);
        assert_eq!(config.table.max_entries, 1000);
        assert_eq!(config.control.request_timeout_ms, 250);
        let journal = config.journal.as_ref().unwrap();
        assert!(journal.compact_on_start);
        assert_eq!(config.metrics.interval_secs, 10);
        assert_eq!(config.rules[0].action, ActionKind::Redirect);
        assert_eq!(config.interface_names(), ["eth0", "eth1", "eth3"]);
    }

    #[test]
    fn test_parse_defaults() {
        let config = parse("[[ports]]\ningress = \"eth0\"\negress = \"eth1\"\n").unwrap();
        assert_eq!(config.table.default_action, DefaultAction::Pass);
        assert_eq!(config.table.match_field, MatchField::Destination);
        assert_eq!(config.table.max_entries, crate::dataplane::DEFAULT_MAX_ENTRIES);
        assert_eq!(config.control.listen, "127.0.0.1:50051");
        assert!(config.journal.is_none());
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_parse_rejects_redirect_default() {
        assert!(parse("[table]\ndefault_action = \"redirect\"\n").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_section() {
        assert!(matches!(parse("[routing]\n"), Err(Error::Config(_))));
    }
}
