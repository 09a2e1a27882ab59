//! Control request and outcome shapes
//!
//! These are the types carried over the control transport. On the wire a
//! request is tagged by `op`:
//!
//! ```text
//! {"op":"update","prefix":"10.0.0.0/8","action":"DROP"}
//! {"op":"update","prefix":"8.8.8.8/32","action":"REDIRECT","redirect_interface":"eth3"}
//! {"op":"withdraw","prefix":"10.0.0.0/8"}
//! {"op":"list"}
//! ```

use crate::dataplane::{ActionKind, Prefix, Rule};
use crate::error::RuleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRuleRequest {
    /// CIDR notation
    pub prefix: String,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_interface: Option<String>,
}

impl UpdateRuleRequest {
    pub fn new(prefix: impl Into<String>, action: ActionKind) -> Self {
        Self {
            prefix: prefix.into(),
            action,
            redirect_interface: None,
        }
    }

    pub fn redirect(prefix: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            action: ActionKind::Redirect,
            redirect_interface: Some(interface.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawRuleRequest {
    pub prefix: String,
}

impl WithdrawRuleRequest {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ControlRequest {
    Update(UpdateRuleRequest),
    Withdraw(WithdrawRuleRequest),
    List,
}

/// Whether a mutation is known to have landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeState {
    /// Committed to the table
    Applied,
    /// Refused; the table is unchanged
    Rejected,
    /// The caller gave up waiting; the mutation may still commit
    Unknown,
}

/// Result of one control request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRuleOutcome {
    /// `null` while the outcome is unknown
    #[serde(default)]
    pub success: Option<bool>,
    pub state: OutcomeState,
    /// Short result code (`"installed"`, `"UnresolvedInterface"`, ...)
    pub detail: String,
    /// Human-readable explanation for rejections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UpdateRuleOutcome {
    pub fn applied(detail: impl Into<String>) -> Self {
        Self {
            success: Some(true),
            state: OutcomeState::Applied,
            detail: detail.into(),
            message: None,
        }
    }

    pub fn rejected(err: &RuleError) -> Self {
        Self {
            success: Some(false),
            state: OutcomeState::Rejected,
            detail: err.code().to_string(),
            message: Some(err.to_string()),
        }
    }

    /// True only for a mutation known to have committed
    pub fn succeeded(&self) -> bool {
        self.success == Some(true)
    }

    pub fn unknown() -> Self {
        Self {
            success: None,
            state: OutcomeState::Unknown,
            detail: "Unknown".to_string(),
            message: Some("request timed out before the outcome was known".to_string()),
        }
    }
}

/// One installed rule as reported by `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleView {
    pub prefix: Prefix,
    pub action: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Rule> for RuleView {
    fn from(rule: &Rule) -> Self {
        Self {
            prefix: rule.prefix,
            action: rule.action.kind(),
            interface: rule.action.interface().map(str::to_string),
            updated_at: rule.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlResponse {
    Outcome(UpdateRuleOutcome),
    Rules { rules: Vec<RuleView> },
}

impl ControlResponse {
    /// The outcome, if this is not a rule listing
    pub fn outcome(&self) -> Option<&UpdateRuleOutcome> {
        match self {
            ControlResponse::Outcome(outcome) => Some(outcome),
            ControlResponse::Rules { .. } => None,
        }
    }
}

impl From<UpdateRuleOutcome> for ControlResponse {
    fn from(outcome: UpdateRuleOutcome) -> Self {
        ControlResponse::Outcome(outcome)
    }
}
