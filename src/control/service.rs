//! Rule control service
//!
//! The entry point for every rule change. Validation and table errors are
//! folded into the returned outcome; nothing here returns `Err` to the
//! caller.

use super::journal::Journal;
use super::message::{
    ControlRequest, ControlResponse, RuleView, UpdateRuleOutcome, UpdateRuleRequest,
    WithdrawRuleRequest,
};
use super::validator::{validate_update, validate_withdraw};
use crate::dataplane::{Prefix, PrefixTable};
use crate::error::RuleError;
use crate::telemetry::MetricsRegistry;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct RuleControlService {
    table: Arc<PrefixTable>,
    metrics: Arc<MetricsRegistry>,
    /// Held across table mutation and journal append so both see the same
    /// order of requests.
    commit: Mutex<Option<Journal>>,
}

impl RuleControlService {
    pub fn new(table: Arc<PrefixTable>, metrics: Arc<MetricsRegistry>) -> Self {
        Self::with_journal(table, metrics, None)
    }

    pub fn with_journal(
        table: Arc<PrefixTable>,
        metrics: Arc<MetricsRegistry>,
        journal: Option<Journal>,
    ) -> Self {
        metrics.set_rule_count(table.len());
        Self {
            table,
            metrics,
            commit: Mutex::new(journal),
        }
    }

    pub fn table(&self) -> &Arc<PrefixTable> {
        &self.table
    }

    fn lock_commit(&self) -> Result<MutexGuard<'_, Option<Journal>>, RuleError> {
        self.commit
            .lock()
            .map_err(|_| RuleError::InternalTableError("commit lock poisoned".into()))
    }

    fn reject(&self, prefix: &str, err: RuleError) -> UpdateRuleOutcome {
        self.metrics.rule_rejections.inc();
        info!(prefix, code = err.code(), "Rule request rejected: {}", err);
        UpdateRuleOutcome::rejected(&err)
    }

    /// Install or replace a rule.
    pub fn update_rule(&self, req: &UpdateRuleRequest) -> UpdateRuleOutcome {
        debug!(?req, "update_rule");
        match self.try_update(req) {
            Ok(outcome) => outcome,
            Err(e) => self.reject(&req.prefix, e),
        }
    }

    fn try_update(&self, req: &UpdateRuleRequest) -> Result<UpdateRuleOutcome, RuleError> {
        let (prefix, action) = validate_update(req)?;

        let mut journal = self.lock_commit()?;
        if !self.table.install(prefix, action.clone())? {
            debug!(%prefix, %action, "Rule already installed");
            return Ok(UpdateRuleOutcome::applied("unchanged"));
        }

        self.metrics.rules_installed.inc();
        self.metrics.set_rule_count(self.table.len());
        info!(%prefix, %action, "Rule installed");

        if let Some(journal) = journal.as_mut() {
            let snapshot = self.table.snapshot();
            if let Some(rule) = snapshot.get(&prefix) {
                if let Err(e) = journal.append_install(rule) {
                    error!(%prefix, "Failed to journal install: {}", e);
                }
            }
        }

        Ok(UpdateRuleOutcome::applied("installed"))
    }

    /// Remove a rule. Withdrawing an absent prefix succeeds.
    pub fn withdraw_rule(&self, req: &WithdrawRuleRequest) -> UpdateRuleOutcome {
        debug!(?req, "withdraw_rule");
        match self.try_withdraw(req) {
            Ok(outcome) => outcome,
            Err(e) => self.reject(&req.prefix, e),
        }
    }

    fn try_withdraw(&self, req: &WithdrawRuleRequest) -> Result<UpdateRuleOutcome, RuleError> {
        let prefix: Prefix = validate_withdraw(req)?;

        let mut journal = self.lock_commit()?;
        if !self.table.withdraw(&prefix)? {
            debug!(%prefix, "Withdraw of absent prefix");
            return Ok(UpdateRuleOutcome::applied("absent"));
        }

        self.metrics.rules_withdrawn.inc();
        self.metrics.set_rule_count(self.table.len());
        info!(%prefix, "Rule withdrawn");

        if let Some(journal) = journal.as_mut() {
            if let Err(e) = journal.append_withdraw(prefix) {
                error!(%prefix, "Failed to journal withdraw: {}", e);
            }
        }

        Ok(UpdateRuleOutcome::applied("withdrawn"))
    }

    /// All installed rules
    pub fn list_rules(&self) -> Vec<RuleView> {
        self.table.rules().iter().map(RuleView::from).collect()
    }

    /// Rewrite the journal from the current table, if there is one.
    pub fn compact_journal(&self) -> crate::Result<()> {
        let mut journal = self
            .commit
            .lock()
            .map_err(|_| crate::Error::Journal("commit lock poisoned".into()))?;
        if let Some(journal) = journal.as_mut() {
            journal.compact(&self.table.rules())?;
        }
        Ok(())
    }

    /// Handle one request synchronously.
    pub fn handle(&self, req: ControlRequest) -> ControlResponse {
        match req {
            ControlRequest::Update(req) => self.update_rule(&req).into(),
            ControlRequest::Withdraw(req) => self.withdraw_rule(&req).into(),
            ControlRequest::List => ControlResponse::Rules {
                rules: self.list_rules(),
            },
        }
    }

    /// Handle a request on the blocking pool, giving up after `timeout`.
    ///
    /// On timeout the caller gets an `Unknown` outcome; the request keeps
    /// running and may still commit.
    pub async fn submit(self: &Arc<Self>, req: ControlRequest, timeout: Duration) -> ControlResponse {
        let service = Arc::clone(self);
        let task = tokio::task::spawn_blocking(move || service.handle(req));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("Control task failed: {}", e);
                UpdateRuleOutcome::rejected(&RuleError::InternalTableError(e.to_string())).into()
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Control request timed out");
                UpdateRuleOutcome::unknown().into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::message::OutcomeState;
    use crate::dataplane::{Action, ActionKind, StaticRegistry};
    use std::net::IpAddr;

    fn service() -> RuleControlService {
        let registry = Arc::new(StaticRegistry::with_interfaces([("eth3", 4)]));
        RuleControlService::new(
            Arc::new(PrefixTable::new(registry)),
            Arc::new(MetricsRegistry::new()),
        )
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_update_and_withdraw() {
        let svc = service();
        let outcome = svc.update_rule(&UpdateRuleRequest::new("185.100.0.0/16", ActionKind::Drop));
        assert!(outcome.succeeded());
        assert_eq!(outcome.state, OutcomeState::Applied);
        assert_eq!(svc.table().lookup(ip("185.100.5.5")), Action::Drop);

        let outcome = svc.withdraw_rule(&WithdrawRuleRequest::new("185.100.0.0/16"));
        assert!(outcome.succeeded());
        assert_eq!(outcome.detail, "withdrawn");
        assert_eq!(svc.table().lookup(ip("185.100.5.5")), Action::Pass);

        let outcome = svc.withdraw_rule(&WithdrawRuleRequest::new("185.100.0.0/16"));
        assert!(outcome.succeeded());
        assert_eq!(outcome.detail, "absent");
    }

    #[test]
    fn test_rejections_are_outcomes() {
        let svc = service();

        let outcome = svc.update_rule(&UpdateRuleRequest::redirect("1.2.3.4/32", "ghost0"));
        assert_eq!(outcome.success, Some(false));
        assert_eq!(outcome.state, OutcomeState::Rejected);
        assert_eq!(outcome.detail, "UnresolvedInterface");

        let outcome = svc.update_rule(&UpdateRuleRequest::new("not-a-prefix", ActionKind::Drop));
        assert_eq!(outcome.detail, "MalformedRequest");

        let outcome = svc.withdraw_rule(&WithdrawRuleRequest::new("10.0.0.0/33"));
        assert_eq!(outcome.detail, "InvalidPrefix");

        assert!(svc.table().is_empty());
        assert_eq!(svc.metrics.rule_rejections.get(), 3);
    }

    #[test]
    fn test_handle_list() {
        let svc = service();
        svc.handle(ControlRequest::Update(UpdateRuleRequest::redirect(
            "8.8.8.8/32",
            "eth3",
        )));
        svc.handle(ControlRequest::Update(UpdateRuleRequest::new(
            "10.0.0.0/8",
            ActionKind::Drop,
        )));

        match svc.handle(ControlRequest::List) {
            ControlResponse::Rules { rules } => {
                let listed: Vec<String> = rules.iter().map(|r| r.prefix.to_string()).collect();
                assert_eq!(listed, ["8.8.8.8/32", "10.0.0.0/8"]);
                assert_eq!(rules[0].interface.as_deref(), Some("eth3"));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn test_metrics_track_rule_count() {
        let svc = service();
        svc.update_rule(&UpdateRuleRequest::new("10.0.0.0/8", ActionKind::Drop));
        svc.update_rule(&UpdateRuleRequest::new("11.0.0.0/8", ActionKind::Drop));
        svc.withdraw_rule(&WithdrawRuleRequest::new("10.0.0.0/8"));

        assert_eq!(svc.metrics.rules_installed.get(), 2);
        assert_eq!(svc.metrics.rules_withdrawn.get(), 1);
        assert!(svc.metrics.export().contains(&("rule_count".into(), 1)));
    }

    #[test]
    fn test_journal_records_committed_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.journal");
        let (journal, _) = Journal::open(&path).unwrap();

        let registry = Arc::new(StaticRegistry::with_interfaces([("eth3", 4)]));
        let svc = RuleControlService::with_journal(
            Arc::new(PrefixTable::new(registry)),
            Arc::new(MetricsRegistry::new()),
            Some(journal),
        );
        svc.update_rule(&UpdateRuleRequest::new("10.0.0.0/8", ActionKind::Drop));
        svc.update_rule(&UpdateRuleRequest::redirect("1.2.3.4/32", "ghost0"));
        svc.withdraw_rule(&WithdrawRuleRequest::new("10.0.0.0/8"));
        svc.withdraw_rule(&WithdrawRuleRequest::new("10.0.0.0/8"));
        drop(svc);

        let (_, records) = Journal::open(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 1);
        assert_eq!(records[1].seq, 2);
    }

    #[test]
    fn test_repeated_install_is_not_journaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.journal");

        for _ in 0..3 {
            let (journal, records) = Journal::open(&path).unwrap();
            let table = Arc::new(PrefixTable::new(Arc::new(StaticRegistry::new())));
            crate::control::replay(&records, &table);
            let svc = RuleControlService::with_journal(
                table,
                Arc::new(MetricsRegistry::new()),
                Some(journal),
            );
            let outcome = svc.update_rule(&UpdateRuleRequest::new("10.0.0.0/8", ActionKind::Drop));
            assert!(outcome.succeeded());
        }

        let (_, records) = Journal::open(&path).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_identical_update_reports_unchanged() {
        let svc = service();
        let req = UpdateRuleRequest::new("10.0.0.0/8", ActionKind::Drop);
        assert_eq!(svc.update_rule(&req).detail, "installed");
        let outcome = svc.update_rule(&req);
        assert!(outcome.succeeded());
        assert_eq!(outcome.detail, "unchanged");
        assert_eq!(svc.metrics.rules_installed.get(), 1);
    }

    #[tokio::test]
    async fn test_submit_returns_response() {
        let svc = Arc::new(service());
        let resp = svc
            .submit(
                ControlRequest::Update(UpdateRuleRequest::new("10.0.0.0/8", ActionKind::Drop)),
                Duration::from_secs(5),
            )
            .await;
        assert_eq!(resp.outcome().map(|o| o.succeeded()), Some(true));
    }
}
