use chrono::{DateTime, Utc};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::json;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use crate::{
    error::Result,
    events::{CoreEvent, EventSink},
    reclaim::{
        analyzer::{AccountAnalysis, AccountAnalyzer},
        engine::{ExecutionMode, ReclaimAction, ReclaimExecutor, ReclaimStatus},
        safety::{safety_report, SafetyCheckResult, SafetyEngine},
    },
    solana::rent::RentCalculator,
    storage::{audit::AuditTrail, json_file, models::{AuditAction, TrackedAccount}, registry::AccountRegistry},
};
use tracing::{error, info, warn};

/// Per-run aggregate printed after `analyze` and `reclaim`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_tracked: usize,
    pub still_existing: usize,
    pub reclaimable: usize,
    pub analysis_failures: usize,
    /// Lamports held by tracked accounts that still exist
    pub total_locked: u64,
    pub total_reclaimable: u64,
    pub total_reclaimed: u64,
    pub total_simulated: u64,
    pub still_locked: u64,
    pub outcomes: BTreeMap<ReclaimStatus, usize>,
    pub rejection_reasons: BTreeMap<String, usize>,
}

impl RunReport {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            started_at: Utc::now(),
            finished_at: None,
            total_tracked: 0,
            still_existing: 0,
            reclaimable: 0,
            analysis_failures: 0,
            total_locked: 0,
            total_reclaimable: 0,
            total_reclaimed: 0,
            total_simulated: 0,
            still_locked: 0,
            outcomes: BTreeMap::new(),
            rejection_reasons: BTreeMap::new(),
        }
    }

    pub fn outcome(&self, status: ReclaimStatus) -> usize {
        self.outcomes.get(&status).copied().unwrap_or(0)
    }

    fn record_analysis(&mut self, analysis: &AccountAnalysis, safety: &SafetyCheckResult) {
        let state = &analysis.current_state;
        if state.exists {
            self.still_existing += 1;
            self.total_locked = self.total_locked.saturating_add(state.balance);
            self.still_locked = self.still_locked.saturating_add(state.balance);
        }
        if safety.approved {
            self.reclaimable += 1;
            self.total_reclaimable = self.total_reclaimable.saturating_add(analysis.reclaimable_balance);
        } else {
            *self.rejection_reasons.entry(safety.reason.clone()).or_insert(0) += 1;
        }
    }

    fn record_action(&mut self, action: &ReclaimAction) {
        *self.outcomes.entry(action.status).or_insert(0) += 1;
        match action.status {
            ReclaimStatus::Confirmed => {
                self.total_reclaimed = self.total_reclaimed.saturating_add(action.amount);
                self.still_locked = self.still_locked.saturating_sub(action.amount);
            }
            ReclaimStatus::DryRun => {
                self.total_simulated = self.total_simulated.saturating_add(action.amount);
            }
            ReclaimStatus::Pending | ReclaimStatus::Submitted | ReclaimStatus::Failed => {}
        }
    }

    /// Persist as `reclaim-report-<unix>.json` in `dir`
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let stamp = self.finished_at.unwrap_or(self.started_at).timestamp();
        let path = dir.join(format!("reclaim-report-{}.json", stamp));
        json_file::write_atomic(&path, self)?;
        info!("Run report written to {}", path.display());
        Ok(path)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("=== Reclaim Run Report ({}) ===\n", self.mode));
        out.push_str(&format!("Tracked accounts:   {}\n", self.total_tracked));
        out.push_str(&format!("Still existing:     {}\n", self.still_existing));
        out.push_str(&format!("Reclaimable:        {}\n", self.reclaimable));
        out.push_str(&format!("Analysis failures:  {}\n", self.analysis_failures));
        out.push_str(&format!("Total locked:       {}\n", RentCalculator::format_sol(self.total_locked)));
        out.push_str(&format!("Reclaimable amount: {}\n", RentCalculator::format_sol(self.total_reclaimable)));
        out.push_str(&format!("Reclaimed:          {}\n", RentCalculator::format_sol(self.total_reclaimed)));
        out.push_str(&format!("Simulated:          {}\n", RentCalculator::format_sol(self.total_simulated)));
        out.push_str(&format!("Still locked:       {}\n", RentCalculator::format_sol(self.still_locked)));

        if !self.outcomes.is_empty() {
            out.push_str("Outcomes:\n");
            for (status, count) in &self.outcomes {
                out.push_str(&format!("  {:<10} {}\n", status.as_str(), count));
            }
        }
        if !self.rejection_reasons.is_empty() {
            out.push_str("Rejections:\n");
            for (reason, count) in &self.rejection_reasons {
                out.push_str(&format!("  {:>5}  {}\n", count, reason));
            }
        }
        out
    }

    pub fn print_summary(&self) {
        println!("\n{}", format!("=== Reclaim Run Report ({}) ===", self.mode).cyan().bold());
        println!("Tracked accounts:   {}", self.total_tracked);
        println!("Still existing:     {}", self.still_existing);
        println!("Reclaimable:        {}", self.reclaimable.to_string().green());
        if self.analysis_failures > 0 {
            println!("Analysis failures:  {}", self.analysis_failures.to_string().red());
        }
        println!("Total locked:       {}", crate::utils::format_sol(self.total_locked));
        println!("Reclaimable amount: {}", crate::utils::format_sol(self.total_reclaimable));
        println!("Reclaimed:          {} ✓", crate::utils::format_sol(self.total_reclaimed));
        if self.total_simulated > 0 {
            println!("Simulated:          {}", crate::utils::format_sol(self.total_simulated));
        }
        println!("Still locked:       {}", crate::utils::format_sol(self.still_locked));

        if !self.outcomes.is_empty() {
            println!("\n{}", "Outcomes:".yellow());
            for (status, count) in &self.outcomes {
                let label = match status {
                    ReclaimStatus::Confirmed => status.as_str().green(),
                    ReclaimStatus::Failed => status.as_str().red(),
                    _ => status.as_str().normal(),
                };
                println!("  {:<10} {}", label, count);
            }
        }
        if !self.rejection_reasons.is_empty() {
            println!("\n{}", "Rejections:".yellow());
            for (reason, count) in &self.rejection_reasons {
                println!("  {:>5}  {}", count, reason);
            }
        }
    }
}

/// Sequential analyze → check → execute over every tracked account.
///
/// Without an executor the pipeline only analyzes and records decisions.
pub struct ReclaimPipeline {
    registry: AccountRegistry,
    audit: AuditTrail,
    analyzer: AccountAnalyzer,
    safety: SafetyEngine,
    executor: Option<ReclaimExecutor>,
    events: EventSink,
    show_progress: bool,
    print_reports: bool,
}

impl ReclaimPipeline {
    pub fn new(
        registry: AccountRegistry,
        audit: AuditTrail,
        analyzer: AccountAnalyzer,
        safety: SafetyEngine,
        executor: Option<ReclaimExecutor>,
        events: EventSink,
    ) -> Self {
        Self {
            registry,
            audit,
            analyzer,
            safety,
            executor,
            events,
            show_progress: false,
            print_reports: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Print the safety report of every analyzed account to stdout
    pub fn with_safety_reports(mut self, print: bool) -> Self {
        self.print_reports = print;
        self
    }

    fn mode_label(&self) -> &'static str {
        match self.executor.as_ref().map(|e| e.mode()) {
            None => "analyze",
            Some(ExecutionMode::DryRun) => "dry-run",
            Some(ExecutionMode::Live) => "live",
        }
    }

    pub async fn run(&self) -> Result<RunReport> {
        let accounts = self.registry.list()?;
        let mut report = RunReport::new(self.mode_label());
        report.total_tracked = accounts.len();

        info!("Processing {} tracked account(s) in {} mode", accounts.len(), report.mode);
        let progress = self.progress_bar(accounts.len());

        for tracked in &accounts {
            progress.set_message(crate::utils::format_pubkey(&tracked.public_key));
            self.process(tracked, &mut report).await;
            progress.inc(1);
        }

        progress.finish_and_clear();
        report.finished_at = Some(Utc::now());

        info!(
            "Run complete: {} tracked, {} reclaimable, {} confirmed, {} failed",
            report.total_tracked,
            report.reclaimable,
            report.outcome(ReclaimStatus::Confirmed),
            report.outcome(ReclaimStatus::Failed)
        );
        Ok(report)
    }

    async fn process(&self, tracked: &TrackedAccount, report: &mut RunReport) {
        let analysis = match self.analyzer.analyze(tracked).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Skipping {}: analysis failed: {}", tracked.public_key, e);
                report.analysis_failures += 1;
                return;
            }
        };

        if let Err(e) = self.registry.touch(&tracked.public_key, Utc::now()) {
            error!("Failed to refresh last check of {}: {}", tracked.public_key, e);
        }

        let safety = self.safety.evaluate(&analysis);
        report.record_analysis(&analysis, &safety);
        if self.print_reports {
            println!("{}", safety_report(&analysis, &safety));
        }

        let mut details = analysis.audit_details();
        details["approved"] = json!(safety.approved);
        details["reason"] = json!(safety.reason);
        details["failedChecks"] = json!(safety.failed_checks().map(|c| c.name.as_str()).collect::<Vec<_>>());
        self.record(AuditAction::Analyzed, &tracked.public_key, details);

        if !safety.approved {
            return;
        }
        let Some(executor) = &self.executor else {
            return;
        };

        match executor.execute(&analysis, &safety).await {
            Ok(action) => {
                report.record_action(&action);
                self.record_action(&action);
            }
            Err(e) => {
                warn!("Executor refused {}: {}", tracked.public_key, e);
            }
        }
    }

    fn record_action(&self, action: &ReclaimAction) {
        let account = action.account_key.to_string();
        let details = action.audit_details();

        match action.status {
            ReclaimStatus::DryRun => self.record(AuditAction::ReclaimDryRun, &account, details),
            ReclaimStatus::Confirmed => {
                self.record(AuditAction::ReclaimExecuted, &account, details.clone());
                self.record(AuditAction::ReclaimConfirmed, &account, details);
                match self.registry.remove(&account) {
                    Ok(true) => {}
                    Ok(false) => warn!("Confirmed account {} was no longer tracked", account),
                    Err(e) => error!("Failed to remove {} from registry: {}", account, e),
                }
            }
            ReclaimStatus::Failed => {
                if action.signature.is_some() {
                    self.record(AuditAction::ReclaimExecuted, &account, details.clone());
                }
                self.record(AuditAction::ReclaimFailed, &account, details);
            }
            ReclaimStatus::Pending | ReclaimStatus::Submitted => {
                warn!("Reclaim of {} ended in non-terminal state {}", account, action.status);
            }
        }
    }

    /// Audit first, then fan out. A write failure is logged and the run continues.
    fn record(&self, action: AuditAction, account: &str, details: serde_json::Value) {
        if let Err(e) = self.audit.append(action, Some(account), details.clone()) {
            error!("Failed to write {} audit entry for {}: {}", action, account, e);
        }
        self.events.emit(CoreEvent::new(action, Some(account.to_string()), details));
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress || self.print_reports {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::EndpointConfig,
        reclaim::{analyzer::AnalyzerConfig, engine::ExecutorConfig, safety::SafetyConfig},
        solana::{
            client::{LedgerClient, MockLedgerClient, SignatureState},
            gateway::EndpointGateway,
            keyring::Keyring,
        },
    };
    use solana_client::rpc_response::RpcConfirmedTransactionStatusWithSignature;
    use solana_sdk::{
        account::Account,
        hash::Hash,
        pubkey::Pubkey,
        signature::{Keypair, Signature, Signer},
    };
    use std::{sync::Arc, time::Duration};

    const CURRENT_SLOT: u64 = 1_000_000;

    struct Fixture {
        _dir: tempfile::TempDir,
        registry_path: PathBuf,
        audit_path: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                registry_path: dir.path().join("registry.json"),
                audit_path: dir.path().join("audit-log.json"),
                _dir: dir,
            }
        }

        fn registry(&self) -> AccountRegistry {
            AccountRegistry::new(&self.registry_path)
        }

        fn audit(&self) -> AuditTrail {
            AuditTrail::new(&self.audit_path)
        }
    }

    fn system_account(lamports: u64, data: Vec<u8>) -> Account {
        Account {
            lamports,
            data,
            owner: solana_sdk::system_program::id(),
            executable: false,
            rent_epoch: 0,
        }
    }

    fn ledger(accounts: Vec<(Pubkey, Account)>) -> MockLedgerClient {
        let mut client = MockLedgerClient::new();
        client.expect_get_slot().returning(|| Ok(CURRENT_SLOT));
        client
            .expect_get_account()
            .returning(move |key| Ok(accounts.iter().find(|(k, _)| k == key).map(|(_, a)| a.clone())));
        client.expect_get_signatures_for_address().returning(|_, _, _| {
            Ok(vec![RpcConfirmedTransactionStatusWithSignature {
                signature: Signature::default().to_string(),
                slot: 850_000,
                err: None,
                memo: None,
                block_time: None,
                confirmation_status: None,
            }])
        });
        client
    }

    fn pipeline(fixture: &Fixture, client: MockLedgerClient, executor_mode: Option<(ExecutionMode, Option<Keyring>)>) -> (ReclaimPipeline, tokio::sync::mpsc::UnboundedReceiver<CoreEvent>) {
        let client: Arc<dyn LedgerClient> = Arc::new(client);
        let gateway = Arc::new(
            EndpointGateway::with_connector(&[EndpointConfig::new("http://rpc", "rpc", 1)], |_| {
                Arc::clone(&client)
            })
            .unwrap(),
        );

        let analyzer = AccountAnalyzer::new(
            Arc::clone(&gateway),
            AnalyzerConfig {
                policy: SafetyConfig {
                    min_inactivity_slots: 100_000,
                    allowed_programs: Vec::new(),
                },
                probe_timeout: Duration::from_secs(1),
            },
        );
        let safety = analyzer.safety_engine();
        let executor = executor_mode.map(|(mode, keyring)| {
            ReclaimExecutor::new(
                Arc::clone(&gateway),
                keyring.map(Arc::new),
                ExecutorConfig {
                    treasury: Pubkey::new_unique(),
                    mode,
                    max_retries: 0,
                    retry_delay: Duration::from_millis(1),
                    probe_timeout: Duration::from_secs(1),
                    confirm_timeout: Duration::from_millis(50),
                    poll_interval: Duration::from_millis(5),
                },
            )
        });

        let (events, receiver) = EventSink::channel();
        (
            ReclaimPipeline::new(fixture.registry(), fixture.audit(), analyzer, safety, executor, events),
            receiver,
        )
    }

    fn track(fixture: &Fixture, key: Pubkey) {
        let record = TrackedAccount::new(key, solana_sdk::system_program::id(), 2_000_000, 500_000, "sig", Utc::now());
        assert_eq!(fixture.registry().import(vec![record]).unwrap(), 1);
    }

    fn actions(fixture: &Fixture) -> Vec<AuditAction> {
        fixture.audit().entries().unwrap().into_iter().map(|e| e.action).collect()
    }

    #[tokio::test]
    async fn test_dry_run_records_and_keeps_registry() {
        let fixture = Fixture::new();
        let eligible = Keypair::new().pubkey();
        let busy = Keypair::new().pubkey();
        track(&fixture, eligible);
        track(&fixture, busy);

        let mut client = ledger(vec![
            (eligible, system_account(2_000_000, vec![])),
            (busy, system_account(3_000_000, vec![1, 2, 3])),
        ]);
        client.expect_send_transaction().never();

        let (pipeline, mut events) = pipeline(&fixture, client, Some((ExecutionMode::DryRun, None)));
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.total_tracked, 2);
        assert_eq!(report.still_existing, 2);
        assert_eq!(report.reclaimable, 1);
        assert_eq!(report.outcome(ReclaimStatus::DryRun), 1);
        assert_eq!(report.total_simulated, 2_000_000);
        assert_eq!(report.total_locked, 5_000_000);
        assert_eq!(report.still_locked, 5_000_000);
        assert_eq!(report.rejection_reasons.len(), 1);

        assert_eq!(
            actions(&fixture),
            vec![AuditAction::Analyzed, AuditAction::ReclaimDryRun, AuditAction::Analyzed]
        );
        assert_eq!(fixture.registry().list().unwrap().len(), 2);
        assert!(fixture.registry().list().unwrap().iter().all(|a| a.last_checked_at.is_some()));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event.action);
        }
        assert_eq!(seen, actions(&fixture));
    }

    #[tokio::test]
    async fn test_analyze_only_never_executes() {
        let fixture = Fixture::new();
        let key = Keypair::new().pubkey();
        track(&fixture, key);

        let mut client = ledger(vec![(key, system_account(2_000_000, vec![]))]);
        client.expect_send_transaction().never();

        let (pipeline, _events) = pipeline(&fixture, client, None);
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.mode, "analyze");
        assert_eq!(report.reclaimable, 1);
        assert!(report.outcomes.is_empty());
        assert_eq!(actions(&fixture), vec![AuditAction::Analyzed]);
    }

    #[tokio::test]
    async fn test_confirmed_reclaim_removes_account() {
        let fixture = Fixture::new();
        let account = Keypair::new();
        let key = account.pubkey();
        track(&fixture, key);

        let mut client = ledger(vec![(key, system_account(2_000_000, vec![]))]);
        client.expect_get_latest_blockhash().returning(|| Ok(Hash::new_unique()));
        client
            .expect_send_transaction()
            .times(1)
            .returning(|tx| Ok(tx.signatures[0]));
        client
            .expect_get_signature_state()
            .returning(|_| Ok(SignatureState::Confirmed));

        let keyring = Keyring::new(Keypair::new()).with_account_signer(account);
        let (pipeline, _events) = pipeline(&fixture, client, Some((ExecutionMode::Live, Some(keyring))));
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.outcome(ReclaimStatus::Confirmed), 1);
        assert_eq!(report.total_reclaimed, 2_000_000);
        assert_eq!(report.still_locked, 0);
        assert_eq!(
            actions(&fixture),
            vec![AuditAction::Analyzed, AuditAction::ReclaimExecuted, AuditAction::ReclaimConfirmed]
        );
        assert!(fixture.registry().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_reclaim_keeps_account() {
        let fixture = Fixture::new();
        let account = Keypair::new();
        let key = account.pubkey();
        track(&fixture, key);

        let mut client = ledger(vec![(key, system_account(2_000_000, vec![]))]);
        client.expect_get_latest_blockhash().returning(|| Ok(Hash::new_unique()));
        client.expect_send_transaction().returning(|_| {
            Err(crate::error::ReclaimError::TransactionFailed("node is behind".to_string()))
        });

        let keyring = Keyring::new(Keypair::new()).with_account_signer(account);
        let (pipeline, _events) = pipeline(&fixture, client, Some((ExecutionMode::Live, Some(keyring))));
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.outcome(ReclaimStatus::Failed), 1);
        assert_eq!(actions(&fixture), vec![AuditAction::Analyzed, AuditAction::ReclaimFailed]);
        assert_eq!(fixture.registry().list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_analysis_failure_skips_account() {
        let fixture = Fixture::new();
        let key = Keypair::new().pubkey();
        track(&fixture, key);

        let mut client = MockLedgerClient::new();
        client.expect_get_slot().returning(|| Ok(CURRENT_SLOT));
        client
            .expect_get_account()
            .returning(|_| Err(crate::error::ReclaimError::TransactionFailed("timeout".to_string())));

        let (pipeline, _events) = pipeline(&fixture, client, Some((ExecutionMode::DryRun, None)));
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.analysis_failures, 1);
        assert!(actions(&fixture).is_empty());
    }

    #[test]
    fn test_report_saves_next_to_audit_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = RunReport::new("dry-run");
        report.finished_at = Some(Utc::now());
        report.total_tracked = 3;

        let path = report.save(dir.path()).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("reclaim-report-") && name.ends_with(".json"));

        let saved: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved["totalTracked"], 3);
        assert_eq!(saved["mode"], "dry-run");
        assert!(report.render_text().contains("Tracked accounts:   3"));
    }
}
