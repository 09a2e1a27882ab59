//! Control plane
//!
//! Rule requests arrive through the TCP server (or directly as library
//! calls), are validated, applied to the prefix table and optionally
//! recorded in the journal.

pub mod journal;
pub mod message;
pub mod server;
pub mod service;
pub mod validator;

pub use journal::{replay, Journal, JournalOp, JournalRecord, ReplayStats};
pub use message::{
    ControlRequest, ControlResponse, OutcomeState, RuleView, UpdateRuleOutcome,
    UpdateRuleRequest, WithdrawRuleRequest,
};
pub use server::ControlServer;
pub use service::RuleControlService;
pub use validator::{validate_interface_name, validate_update, validate_withdraw};
