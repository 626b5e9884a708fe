//! Fail-closed safety gate between analysis and execution.
//!
//! Every analysis runs through the same nine checks in the same order. A
//! reclaim is approved only when all of them pass; a missing account stops
//! evaluation after the first check.

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use crate::{
    reclaim::analyzer::{AccountAnalysis, RiskFlag},
    solana::{accounts::AccountKind, rent::RentCalculator},
};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyCheck {
    AccountExists,
    NotDerivedAddress,
    OwnerProgramAllowed,
    SystemOwned,
    NoTokenBalance,
    NoAccountData,
    InactivityThreshold,
    RentExempt,
    PositiveBalance,
}

impl SafetyCheck {
    /// Evaluation order
    pub const ALL: [SafetyCheck; 9] = [
        SafetyCheck::AccountExists,
        SafetyCheck::NotDerivedAddress,
        SafetyCheck::OwnerProgramAllowed,
        SafetyCheck::SystemOwned,
        SafetyCheck::NoTokenBalance,
        SafetyCheck::NoAccountData,
        SafetyCheck::InactivityThreshold,
        SafetyCheck::RentExempt,
        SafetyCheck::PositiveBalance,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SafetyCheck::AccountExists => "account_exists",
            SafetyCheck::NotDerivedAddress => "not_derived_address",
            SafetyCheck::OwnerProgramAllowed => "owner_program_allowed",
            SafetyCheck::SystemOwned => "system_owned",
            SafetyCheck::NoTokenBalance => "no_token_balance",
            SafetyCheck::NoAccountData => "no_account_data",
            SafetyCheck::InactivityThreshold => "inactivity_threshold",
            SafetyCheck::RentExempt => "rent_exempt",
            SafetyCheck::PositiveBalance => "positive_balance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyCheckResult {
    pub approved: bool,
    pub reason: String,
    pub checks: Vec<CheckResult>,
    pub checked_at: DateTime<Utc>,
}

impl SafetyCheckResult {
    pub fn failed_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub min_inactivity_slots: u64,
    /// Owner programs trusted in addition to the system program
    pub allowed_programs: Vec<Pubkey>,
}

pub struct SafetyEngine {
    config: SafetyConfig,
}

impl SafetyEngine {
    pub fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, analysis: &AccountAnalysis) -> SafetyCheckResult {
        self.evaluate_at(analysis, Utc::now())
    }

    /// Deterministic: identical inputs give identical results
    pub fn evaluate_at(&self, analysis: &AccountAnalysis, checked_at: DateTime<Utc>) -> SafetyCheckResult {
        let existence = self.run(SafetyCheck::AccountExists, analysis);
        if !existence.passed {
            debug!("Safety evaluation for {} stopped: account missing", analysis.public_key);
            return SafetyCheckResult {
                approved: false,
                reason: "Account does not exist".to_string(),
                checks: vec![existence],
                checked_at,
            };
        }

        let checks: Vec<CheckResult> = SafetyCheck::ALL
            .iter()
            .map(|check| self.run(*check, analysis))
            .collect();

        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect();
        let approved = failed.is_empty();
        let reason = if approved {
            format!("All {} safety checks passed", checks.len())
        } else {
            format!("Failed safety checks: {}", failed.join(", "))
        };

        info!(
            "Safety {} for {}: {}",
            if approved { "APPROVED" } else { "REJECTED" },
            analysis.public_key,
            reason
        );

        SafetyCheckResult {
            approved,
            reason,
            checks,
            checked_at,
        }
    }

    fn run(&self, check: SafetyCheck, analysis: &AccountAnalysis) -> CheckResult {
        let state = &analysis.current_state;

        let (passed, details) = match check {
            SafetyCheck::AccountExists => (
                state.exists,
                if state.exists { "Account exists on chain".to_string() } else { "Account does not exist".to_string() },
            ),
            SafetyCheck::NotDerivedAddress => {
                let derived = state.is_derived_key || analysis.has_flag(RiskFlag::DerivedKey);
                (
                    !derived,
                    if derived {
                        "Address is off the ed25519 curve (program-derived)".to_string()
                    } else {
                        "Address is on the ed25519 curve".to_string()
                    },
                )
            }
            SafetyCheck::OwnerProgramAllowed => match state.owner {
                Some(owner) if owner == solana_sdk::system_program::id() => {
                    (true, "Owned by the system program".to_string())
                }
                Some(owner) if self.config.allowed_programs.contains(&owner) => {
                    (true, format!("Owner {} is allow-listed", owner))
                }
                Some(owner) => (false, format!("Owner {} is not the system program or allow-listed", owner)),
                None => (false, "Owner unknown".to_string()),
            },
            SafetyCheck::SystemOwned => (
                state.account_kind == AccountKind::SystemOwned,
                format!("Account kind is {}", state.account_kind),
            ),
            SafetyCheck::NoTokenBalance => {
                let flagged = analysis.has_flag(RiskFlag::NonZeroTokenBalance);
                (
                    !flagged,
                    match state.token_amount {
                        Some(amount) => format!("Token balance {}", amount),
                        None => "No token balance".to_string(),
                    },
                )
            }
            SafetyCheck::NoAccountData => {
                let has_data = state.has_data() || analysis.has_flag(RiskFlag::HasData);
                (!has_data, format!("{} bytes of account data", state.raw_data.len()))
            }
            SafetyCheck::InactivityThreshold => (
                analysis.inactivity_slots >= self.config.min_inactivity_slots,
                format!(
                    "Inactive for {} slots (minimum {})",
                    analysis.inactivity_slots, self.config.min_inactivity_slots
                ),
            ),
            SafetyCheck::RentExempt => (
                state.rent_exempt,
                if state.rent_exempt { "Account is rent-exempt".to_string() } else { "Account is not rent-exempt".to_string() },
            ),
            SafetyCheck::PositiveBalance => (
                analysis.reclaimable_balance > 0,
                format!("Reclaimable balance {} lamports", analysis.reclaimable_balance),
            ),
        };

        CheckResult {
            name: check.name().to_string(),
            passed,
            details,
        }
    }
}

/// Operator-facing text block describing a decision and the raw account attributes
pub fn safety_report(analysis: &AccountAnalysis, result: &SafetyCheckResult) -> String {
    let state = &analysis.current_state;
    let tracked = &analysis.tracked_account;
    let mut out = String::new();

    out.push_str(&format!("=== Safety Report: {} ===\n", analysis.public_key));
    out.push_str(&format!(
        "Decision:              {}\n",
        if result.approved { "APPROVED" } else { "REJECTED" }
    ));
    out.push_str(&format!("Reason:                {}\n", result.reason));
    out.push_str(&format!(
        "Checked at:            {}\n",
        result.checked_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    out.push_str("Checks:\n");
    for (i, check) in result.checks.iter().enumerate() {
        out.push_str(&format!(
            "  [{}] {}. {:<22} {}\n",
            if check.passed { "PASS" } else { "FAIL" },
            i + 1,
            check.name,
            check.details
        ));
    }

    out.push_str("Account:\n");
    out.push_str(&format!("  Exists:                {}\n", state.exists));
    out.push_str(&format!(
        "  Balance:               {} lamports ({})\n",
        state.balance,
        RentCalculator::format_sol(state.balance)
    ));
    out.push_str(&format!(
        "  Owner:                 {}\n",
        state.owner.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string())
    ));
    out.push_str(&format!("  Kind:                  {}\n", state.account_kind));
    out.push_str(&format!("  Rent exempt:           {}\n", state.rent_exempt));
    out.push_str(&format!("  Data length:           {}\n", state.raw_data.len()));
    out.push_str(&format!("  Derived key:           {}\n", state.is_derived_key));
    out.push_str(&format!("  Derived token account: {}\n", state.is_derived_token_account));
    out.push_str(&format!("  Last modified slot:    {}\n", state.last_modified_slot));
    out.push_str(&format!("  Inactivity slots:      {}\n", analysis.inactivity_slots));
    out.push_str(&format!("  Reclaimable balance:   {}\n", analysis.reclaimable_balance));
    let flags = if analysis.risk_flags.is_empty() {
        "none".to_string()
    } else {
        analysis.risk_flags.iter().map(|f| f.describe()).collect::<Vec<_>>().join("; ")
    };
    out.push_str(&format!("  Risk flags:            {}\n", flags));

    out.push_str("Tracked:\n");
    out.push_str(&format!("  Controlling program:   {}\n", tracked.controlling_program));
    out.push_str(&format!("  Rent at creation:      {}\n", tracked.rent_balance_at_creation));
    out.push_str(&format!("  Creation slot:         {}\n", tracked.creation_slot));
    out.push_str(&format!("  Creation proof:        {}\n", tracked.creation_proof));

    out
}
