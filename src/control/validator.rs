//! Rule validator
//!
//! Turns a control request into a canonical prefix and action, or rejects
//! it. Pure: no table or registry access. Whether a redirect target
//! actually exists is checked by the table at install time.

use super::message::{UpdateRuleRequest, WithdrawRuleRequest};
use crate::dataplane::{Action, ActionKind, Prefix};
use crate::error::RuleError;

/// Linux IFNAMSIZ minus the terminating NUL
const MAX_INTERFACE_NAME: usize = 15;

/// Syntactic check of an interface name.
pub fn validate_interface_name(name: &str) -> Result<(), RuleError> {
    if name.len() > MAX_INTERFACE_NAME {
        return Err(RuleError::InvalidAction(format!(
            "interface name {name:?} longer than {MAX_INTERFACE_NAME} bytes"
        )));
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c.is_control())
    {
        return Err(RuleError::InvalidAction(format!(
            "interface name {name:?} contains invalid characters"
        )));
    }
    Ok(())
}

/// Validate an install/replace request.
///
/// An empty `redirect_interface` is treated as absent.
pub fn validate_update(req: &UpdateRuleRequest) -> Result<(Prefix, Action), RuleError> {
    let prefix = Prefix::parse(&req.prefix)?;
    let interface = req
        .redirect_interface
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let action = match (req.action, interface) {
        (ActionKind::Pass, None) => Action::Pass,
        (ActionKind::Drop, None) => Action::Drop,
        (ActionKind::Redirect, Some(name)) => {
            validate_interface_name(name)?;
            Action::redirect(name)
        }
        (ActionKind::Redirect, None) => {
            return Err(RuleError::InvalidAction(
                "REDIRECT requires redirect_interface".into(),
            ))
        }
        (kind, Some(name)) => {
            return Err(RuleError::InvalidAction(format!(
                "{kind} must not carry redirect_interface (got {name:?})"
            )))
        }
    };

    Ok((prefix, action))
}

/// Validate a withdraw request.
pub fn validate_withdraw(req: &WithdrawRuleRequest) -> Result<Prefix, RuleError> {
    Prefix::parse(&req.prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_requests() {
        let (prefix, action) =
            validate_update(&UpdateRuleRequest::new("10.1.2.3/16", ActionKind::Drop)).unwrap();
        assert_eq!(prefix.to_string(), "10.1.0.0/16");
        assert_eq!(action, Action::Drop);

        let (_, action) =
            validate_update(&UpdateRuleRequest::redirect("8.8.8.8/32", "eth3")).unwrap();
        assert_eq!(action, Action::redirect("eth3"));
    }

    #[test]
    fn test_redirect_requires_interface() {
        let err = validate_update(&UpdateRuleRequest::new("8.8.8.8/32", ActionKind::Redirect))
            .unwrap_err();
        assert_eq!(err.code(), "InvalidAction");

        let err = validate_update(&UpdateRuleRequest::redirect("8.8.8.8/32", "  ")).unwrap_err();
        assert_eq!(err.code(), "InvalidAction");
    }

    #[test]
    fn test_pass_drop_reject_interface() {
        for kind in [ActionKind::Pass, ActionKind::Drop] {
            let mut req = UpdateRuleRequest::new("10.0.0.0/8", kind);
            req.redirect_interface = Some("eth3".into());
            assert_eq!(validate_update(&req).unwrap_err().code(), "InvalidAction");
        }
    }

    #[test]
    fn test_empty_interface_is_absent() {
        let mut req = UpdateRuleRequest::new("10.0.0.0/8", ActionKind::Drop);
        req.redirect_interface = Some(String::new());
        assert_eq!(validate_update(&req).unwrap().1, Action::Drop);
    }

    #[test]
    fn test_bad_prefix_codes() {
        let err = validate_update(&UpdateRuleRequest::new("10.0.0.0", ActionKind::Drop))
            .unwrap_err();
        assert_eq!(err.code(), "MalformedRequest");

        let err = validate_update(&UpdateRuleRequest::new("10.0.0.0/40", ActionKind::Drop))
            .unwrap_err();
        assert_eq!(err.code(), "InvalidPrefix");

        let err = validate_withdraw(&WithdrawRuleRequest::new("::/129")).unwrap_err();
        assert_eq!(err.code(), "InvalidPrefix");
    }

    #[test]
    fn test_interface_name_syntax() {
        assert!(validate_interface_name("eth0.100").is_ok());
        assert!(validate_interface_name("enp0s31f6").is_ok());
        assert!(validate_interface_name("a-very-long-interface").is_err());
        assert!(validate_interface_name("eth 0").is_err());
        assert!(validate_interface_name("../eth0").is_err());
    }
}
