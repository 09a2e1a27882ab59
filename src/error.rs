use std::io;

/// Process-level errors: start-up, I/O, configuration, packet parsing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("journal error: {0}")]
    Journal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported back to the control plane for a single rule request.
///
/// None of these are fatal to the process; they are folded into an
/// `UpdateRuleOutcome` by the control service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("prefix length {len} out of range (max {max})")]
    InvalidPrefix { len: u32, max: u8 },

    #[error("interface {name} cannot be resolved")]
    UnresolvedInterface { name: String },

    #[error("table full ({limit} entries)")]
    CapacityExceeded { limit: usize },

    #[error("internal table error: {0}")]
    InternalTableError(String),
}

impl RuleError {
    /// Stable machine-readable code, carried in outcome `detail`.
    pub fn code(&self) -> &'static str {
        match self {
            RuleError::MalformedRequest(_) => "MalformedRequest",
            RuleError::InvalidAction(_) => "InvalidAction",
            RuleError::InvalidPrefix { .. } => "InvalidPrefix",
            RuleError::UnresolvedInterface { .. } => "UnresolvedInterface",
            RuleError::CapacityExceeded { .. } => "CapacityExceeded",
            RuleError::InternalTableError(_) => "InternalTableError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_error_codes() {
        assert_eq!(
            RuleError::UnresolvedInterface {
                name: "ghost0".into()
            }
            .code(),
            "UnresolvedInterface"
        );
        assert_eq!(
            RuleError::InvalidPrefix { len: 33, max: 32 }.code(),
            "InvalidPrefix"
        );
        assert_eq!(
            RuleError::MalformedRequest("x".into()).code(),
            "MalformedRequest"
        );
    }

    #[test]
    fn test_rule_error_display() {
        let err = RuleError::InvalidPrefix { len: 129, max: 128 };
        assert_eq!(err.to_string(), "prefix length 129 out of range (max 128)");
    }
}
