//! Configuration types

use crate::control::UpdateRuleRequest;
use crate::dataplane::{Action, ActionKind, MatchField, DEFAULT_MAX_ENTRIES};
use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::path::PathBuf;

/// Daemon configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub logging: LogConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub journal: Option<JournalConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Config {
    /// Every interface name the daemon binds, ports first, deduplicated
    pub fn interface_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let all = self
            .ports
            .iter()
            .flat_map(|p| [p.ingress.as_str(), p.egress.as_str()])
            .chain(self.interfaces.iter().map(|i| i.name.as_str()));
        for name in all {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }
}

/// Default action when no prefix matches. Redirect is not allowed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultAction {
    #[default]
    Pass,
    Drop,
}

impl From<DefaultAction> for Action {
    fn from(action: DefaultAction) -> Self {
        match action {
            DefaultAction::Pass => Action::Pass,
            DefaultAction::Drop => Action::Drop,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub default_action: DefaultAction,
    pub match_field: MatchField,
    pub max_entries: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            default_action: DefaultAction::Pass,
            match_field: MatchField::Destination,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub listen: String,
    pub request_timeout_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:50051".to_string(),
            request_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    pub path: PathBuf,
    #[serde(default = "default_true")]
    pub compact_on_start: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between statistics log lines, 0 disables them
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// An ingress interface and where passed frames leave
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortConfig {
    pub ingress: String,
    pub egress: String,
}

/// Extra redirect target that is not part of any port
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
}

/// Rule installed at start-up
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleConfig {
    pub prefix: String,
    pub action: ActionKind,
    #[serde(default)]
    pub redirect_interface: Option<String>,
}

impl RuleConfig {
    pub fn to_request(&self) -> UpdateRuleRequest {
        UpdateRuleRequest {
            prefix: self.prefix.clone(),
            action: self.action,
            redirect_interface: self.redirect_interface.clone(),
        }
    }
}
