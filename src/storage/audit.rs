use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use crate::{
    error::Result,
    solana::rent::RentCalculator,
    storage::{
        json_file,
        models::{AuditAction, AuditEntry},
    },
};
use tracing::debug;

/// Append-only decision and action log backed by a single JSON array
pub struct AuditTrail {
    path: PathBuf,
}

impl AuditTrail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        json_file::read_or_default(&self.path)
    }

    /// Read the log, append one entry and replace the file
    pub fn append(
        &self,
        action: AuditAction,
        account: Option<&str>,
        details: serde_json::Value,
    ) -> Result<AuditEntry> {
        let mut entries = self.entries()?;
        let entry = AuditEntry::new(action, account.map(str::to_string), details);
        entries.push(entry.clone());
        json_file::write_atomic(&self.path, &entries)?;
        debug!("Audit {} {}", action, account.unwrap_or("-"));
        Ok(entry)
    }

    pub fn summary(&self) -> Result<AuditSummary> {
        Ok(AuditSummary::from_entries(&self.entries()?))
    }
}

/// Latest ANALYZED snapshot of one account
#[derive(Debug, Clone, Copy)]
struct Observed {
    exists: bool,
    balance: u64,
    approved: bool,
    reclaimable_balance: u64,
}

impl Observed {
    fn from_details(details: &serde_json::Value) -> Self {
        let flag = |name: &str| details.get(name).and_then(|v| v.as_bool()).unwrap_or(false);
        let lamports = |name: &str| details.get(name).and_then(|v| v.as_u64()).unwrap_or(0);
        Self {
            exists: flag("exists"),
            balance: lamports("balance"),
            approved: flag("approved"),
            reclaimable_balance: lamports("reclaimableBalance"),
        }
    }
}

/// Aggregate view over the whole audit log
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditSummary {
    pub total_entries: usize,
    pub counts_by_action: BTreeMap<AuditAction, usize>,
    pub total_reclaimed: u64,
    pub total_simulated: u64,
    pub rejection_reasons: BTreeMap<String, usize>,
    /// Accounts whose latest analysis found them on chain and not since reclaimed
    pub still_existing: usize,
    pub reclaimable: usize,
    pub total_reclaimable: u64,
    pub still_locked: u64,
    pub first_entry_at: Option<DateTime<Utc>>,
    pub last_entry_at: Option<DateTime<Utc>>,
}

impl AuditSummary {
    pub fn from_entries(entries: &[AuditEntry]) -> Self {
        let mut summary = AuditSummary {
            total_entries: entries.len(),
            first_entry_at: entries.first().map(|e| e.timestamp),
            last_entry_at: entries.last().map(|e| e.timestamp),
            ..Default::default()
        };

        let mut latest: BTreeMap<&str, Observed> = BTreeMap::new();

        for entry in entries {
            *summary.counts_by_action.entry(entry.action).or_insert(0) += 1;
            let amount = entry.details.get("amount").and_then(|v| v.as_u64()).unwrap_or(0);

            match entry.action {
                AuditAction::ReclaimConfirmed => {
                    summary.total_reclaimed = summary.total_reclaimed.saturating_add(amount);
                    if let Some(account) = entry.account.as_deref() {
                        latest.remove(account);
                    }
                }
                AuditAction::ReclaimDryRun => {
                    summary.total_simulated = summary.total_simulated.saturating_add(amount);
                }
                AuditAction::Analyzed => {
                    if let Some(account) = entry.account.as_deref() {
                        latest.insert(account, Observed::from_details(&entry.details));
                    }
                    let approved = entry.details.get("approved").and_then(|v| v.as_bool());
                    if approved == Some(false) {
                        let reason = entry
                            .details
                            .get("reason")
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown")
                            .to_string();
                        *summary.rejection_reasons.entry(reason).or_insert(0) += 1;
                    }
                }
                AuditAction::Indexed | AuditAction::ReclaimExecuted | AuditAction::ReclaimFailed => {}
            }
        }

        for observed in latest.values().filter(|o| o.exists) {
            summary.still_existing += 1;
            summary.still_locked = summary.still_locked.saturating_add(observed.balance);
            if observed.approved {
                summary.reclaimable += 1;
                summary.total_reclaimable = summary.total_reclaimable.saturating_add(observed.reclaimable_balance);
            }
        }

        summary
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.counts_by_action.get(&action).copied().unwrap_or(0)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Audit Trail Summary ===\n");
        out.push_str(&format!("Entries:          {}\n", self.total_entries));
        if let (Some(first), Some(last)) = (self.first_entry_at, self.last_entry_at) {
            out.push_str(&format!(
                "Period:           {} .. {}\n",
                first.format("%Y-%m-%d %H:%M:%S UTC"),
                last.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        out.push_str("\nActions:\n");
        for (action, count) in &self.counts_by_action {
            out.push_str(&format!("  {:<18} {}\n", action.as_str(), count));
        }
        out.push_str(&format!(
            "\nReclaimed:        {} lamports ({})\n",
            self.total_reclaimed,
            RentCalculator::format_sol(self.total_reclaimed)
        ));
        out.push_str(&format!(
            "Simulated:        {} lamports ({})\n",
            self.total_simulated,
            RentCalculator::format_sol(self.total_simulated)
        ));
        out.push_str(&format!("Still existing:   {}\n", self.still_existing));
        out.push_str(&format!(
            "Reclaimable:      {} ({})\n",
            self.reclaimable,
            RentCalculator::format_sol(self.total_reclaimable)
        ));
        out.push_str(&format!(
            "Still locked:     {} lamports ({})\n",
            self.still_locked,
            RentCalculator::format_sol(self.still_locked)
        ));
        if !self.rejection_reasons.is_empty() {
            out.push_str("\nRejection reasons:\n");
            for (reason, count) in &self.rejection_reasons {
                out.push_str(&format!("  {:>5}  {}\n", count, reason));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_keeps_previous_entries() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::new(dir.path().join("audit.json"));

        trail.append(AuditAction::Indexed, None, json!({ "imported": 2 })).unwrap();
        trail.append(AuditAction::Analyzed, Some("abc"), json!({ "approved": true })).unwrap();

        let entries = trail.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::Indexed);
        assert_eq!(entries[0].account, None);
        assert_eq!(entries[1].account.as_deref(), Some("abc"));
    }

    #[test]
    fn test_document_layout() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::new(dir.path().join("audit.json"));
        trail.append(AuditAction::ReclaimFailed, Some("abc"), json!({ "error": "boom" })).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(trail.path()).unwrap()).unwrap();
        let entry = &raw[0];
        assert!(entry["timestamp"].is_string());
        assert!(entry["unix_timestamp"].is_i64());
        assert_eq!(entry["action"], "RECLAIM_FAILED");
        assert_eq!(entry["account"], "abc");
        assert_eq!(entry["details"]["error"], "boom");
    }

    #[test]
    fn test_summary_aggregates_outcomes_and_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::new(dir.path().join("audit.json"));

        trail.append(AuditAction::Analyzed, Some("a"), json!({ "approved": false, "reason": "derived address" })).unwrap();
        trail.append(AuditAction::Analyzed, Some("b"), json!({ "approved": false, "reason": "derived address" })).unwrap();
        trail.append(AuditAction::Analyzed, Some("c"), json!({ "approved": false, "reason": "inactivity" })).unwrap();
        trail.append(AuditAction::Analyzed, Some("d"), json!({ "approved": true })).unwrap();
        trail.append(AuditAction::ReclaimDryRun, Some("d"), json!({ "amount": 2_000_000u64 })).unwrap();
        trail.append(AuditAction::ReclaimConfirmed, Some("d"), json!({ "amount": 1_500_000u64 })).unwrap();

        let summary = trail.summary().unwrap();
        assert_eq!(summary.total_entries, 6);
        assert_eq!(summary.count(AuditAction::Analyzed), 4);
        assert_eq!(summary.count(AuditAction::ReclaimFailed), 0);
        assert_eq!(summary.total_simulated, 2_000_000);
        assert_eq!(summary.total_reclaimed, 1_500_000);
        assert_eq!(summary.rejection_reasons["derived address"], 2);
        assert_eq!(summary.rejection_reasons["inactivity"], 1);
        assert!(summary.render_text().contains("RECLAIM_CONFIRMED"));
    }

    #[test]
    fn test_summary_tracks_latest_analysis_per_account() {
        let dir = tempfile::tempdir().unwrap();
        let trail = AuditTrail::new(dir.path().join("audit.json"));
        let analyzed = |exists: bool, balance: u64, approved: bool| {
            let reclaimable = if approved { balance } else { 0 };
            json!({
                "exists": exists,
                "balance": balance,
                "approved": approved,
                "reclaimableBalance": reclaimable,
            })
        };

        // First run: a is rejected, b approved and later confirmed, c missing
        trail.append(AuditAction::Analyzed, Some("a"), analyzed(true, 1_000_000, false)).unwrap();
        trail.append(AuditAction::Analyzed, Some("b"), analyzed(true, 2_000_000, true)).unwrap();
        trail.append(AuditAction::ReclaimConfirmed, Some("b"), json!({ "amount": 2_000_000u64 })).unwrap();
        trail.append(AuditAction::Analyzed, Some("c"), analyzed(false, 0, false)).unwrap();
        // Second run: a became reclaimable and gained lamports
        trail.append(AuditAction::Analyzed, Some("a"), analyzed(true, 3_000_000, true)).unwrap();

        let summary = trail.summary().unwrap();
        assert_eq!(summary.still_existing, 1);
        assert_eq!(summary.reclaimable, 1);
        assert_eq!(summary.total_reclaimable, 3_000_000);
        assert_eq!(summary.still_locked, 3_000_000);
        assert_eq!(summary.total_reclaimed, 2_000_000);

        let text = summary.render_text();
        assert!(text.contains("Still existing:   1"));
        assert!(text.contains("Still locked:     3000000 lamports"));
    }
}
