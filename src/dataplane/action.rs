//! Rule actions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Disposition applied to packets matching a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Action {
    /// Forward the packet unchanged
    #[default]
    Pass,
    /// Discard the packet
    Drop,
    /// Send the packet out of `interface` instead of the default path
    Redirect { interface: Arc<str> },
}

impl Action {
    pub fn redirect(interface: impl Into<Arc<str>>) -> Self {
        Action::Redirect {
            interface: interface.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Pass => ActionKind::Pass,
            Action::Drop => ActionKind::Drop,
            Action::Redirect { .. } => ActionKind::Redirect,
        }
    }

    /// Redirect target, if any
    pub fn interface(&self) -> Option<&str> {
        match self {
            Action::Redirect { interface } => Some(interface),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Pass => write!(f, "PASS"),
            Action::Drop => write!(f, "DROP"),
            Action::Redirect { interface } => write!(f, "REDIRECT{{{}}}", interface),
        }
    }
}

/// Action tag as it appears on the wire and in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionKind {
    #[serde(alias = "pass")]
    Pass,
    #[serde(alias = "drop")]
    Drop,
    #[serde(alias = "redirect")]
    Redirect,
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pass" => Ok(ActionKind::Pass),
            "drop" => Ok(ActionKind::Drop),
            "redirect" => Ok(ActionKind::Redirect),
            _ => Err(format!("unknown action: {s}")),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Pass => "PASS",
            ActionKind::Drop => "DROP",
            ActionKind::Redirect => "REDIRECT",
        };
        f.write_str(name)
    }
}
