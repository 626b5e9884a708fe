use serde::Serialize;
use serde_json::json;
use solana_sdk::{account::Account, pubkey::Pubkey};
use std::{sync::Arc, time::Duration};
use crate::{
    error::Result,
    solana::{
        accounts::{is_known_program, AccountKind, AccountState, SLOTS_PER_DAY},
        gateway::{Connection, EndpointGateway},
    },
    reclaim::safety::{SafetyConfig, SafetyEngine},
    storage::models::TrackedAccount,
};
use tracing::{debug, info, warn};

/// Conditions that make an account unsafe or premature to sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskFlag {
    DerivedKey,
    UnknownProgram,
    NonZeroTokenBalance,
    RecentActivity,
    BelowInactivityThreshold,
    HasData,
}

impl RiskFlag {
    pub fn describe(&self) -> &'static str {
        match self {
            RiskFlag::DerivedKey => "address is a program-derived address",
            RiskFlag::UnknownProgram => "owned by an unknown program",
            RiskFlag::NonZeroTokenBalance => "holds a non-zero token balance",
            RiskFlag::RecentActivity => "active within the last 24 hours",
            RiskFlag::BelowInactivityThreshold => "inactive for less than the required period",
            RiskFlag::HasData => "account data is not empty",
        }
    }

    /// `RecentActivity` is informational; the inactivity gate is `BelowInactivityThreshold`
    pub fn blocks_reclaim(&self) -> bool {
        !matches!(self, RiskFlag::RecentActivity)
    }
}

/// Result of analyzing one tracked account
#[derive(Debug, Clone, PartialEq)]
pub struct AccountAnalysis {
    pub public_key: Pubkey,
    pub is_reclaimable: bool,
    pub reason: String,
    pub current_state: AccountState,
    pub tracked_account: TrackedAccount,
    /// Full balance for system-owned accounts, zero otherwise
    pub reclaimable_balance: u64,
    pub inactivity_slots: u64,
    pub risk_flags: Vec<RiskFlag>,
}

impl AccountAnalysis {
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.risk_flags.contains(&flag)
    }

    pub fn audit_details(&self) -> serde_json::Value {
        let state = &self.current_state;
        json!({
            "exists": state.exists,
            "balance": state.balance,
            "owner": state.owner.map(|o| o.to_string()),
            "accountKind": state.account_kind,
            "rentExempt": state.rent_exempt,
            "dataLength": state.raw_data.len(),
            "lastModifiedSlot": state.last_modified_slot,
            "inactivitySlots": self.inactivity_slots,
            "reclaimableBalance": self.reclaimable_balance,
            "riskFlags": self.risk_flags,
            "isReclaimable": self.is_reclaimable,
            "analysisReason": self.reason,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Shared with the safety engine so flags and checks judge by the same limits
    pub policy: SafetyConfig,
    pub probe_timeout: Duration,
}

/// An account whose state could not be fetched
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisFailure {
    pub public_key: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct BatchAnalysis {
    pub analyses: Vec<AccountAnalysis>,
    pub failures: Vec<AnalysisFailure>,
}

pub struct AccountAnalyzer {
    gateway: Arc<EndpointGateway>,
    config: AnalyzerConfig,
}

struct Observation {
    current_slot: u64,
    account: Option<Account>,
    last_activity_slot: Option<u64>,
}

impl AccountAnalyzer {
    pub fn new(gateway: Arc<EndpointGateway>, config: AnalyzerConfig) -> Self {
        Self { gateway, config }
    }

    /// Safety engine over the same policy this analyzer flags against
    pub fn safety_engine(&self) -> SafetyEngine {
        SafetyEngine::new(self.config.policy.clone())
    }

    /// Fetch the account's live state and classify it
    pub async fn analyze(&self, tracked: &TrackedAccount) -> Result<AccountAnalysis> {
        let pubkey = tracked.pubkey()?;
        let conn = self.gateway.acquire_connection(self.config.probe_timeout).await?;

        let observation = match observe(&conn, &pubkey).await {
            Ok(observation) => {
                self.gateway.mark_successful(conn.url());
                observation
            }
            Err(e) => {
                self.gateway.mark_failed(conn.url());
                return Err(e);
            }
        };

        let state = match &observation.account {
            Some(account) => {
                let last_modified = observation.last_activity_slot.unwrap_or(tracked.creation_slot);
                AccountState::from_account(pubkey, account, last_modified)
            }
            None => AccountState::missing(pubkey, tracked.creation_slot),
        };

        Ok(self.evaluate(tracked, state, observation.current_slot))
    }

    /// Classify an already-observed state. Pure: no network access.
    pub fn evaluate(&self, tracked: &TrackedAccount, state: AccountState, current_slot: u64) -> AccountAnalysis {
        let inactivity_slots =
            current_slot.saturating_sub(state.last_modified_slot.max(tracked.creation_slot));

        if !state.exists {
            debug!("Account {} does not exist", state.public_key);
            return AccountAnalysis {
                public_key: state.public_key,
                is_reclaimable: false,
                reason: "Account does not exist".to_string(),
                current_state: state,
                tracked_account: tracked.clone(),
                reclaimable_balance: 0,
                inactivity_slots,
                risk_flags: Vec::new(),
            };
        }

        let risk_flags = self.risk_flags(&state, inactivity_slots);
        let reclaimable_balance = if state.account_kind == AccountKind::SystemOwned {
            state.balance
        } else {
            0
        };

        let blocker = if state.account_kind != AccountKind::SystemOwned {
            Some(format!("Account kind {} cannot be emptied by a transfer", state.account_kind))
        } else if let Some(flag) = risk_flags.iter().find(|f| f.blocks_reclaim()) {
            Some(format!("Account {}", flag.describe()))
        } else if !state.rent_exempt {
            Some("Account is not rent-exempt".to_string())
        } else if reclaimable_balance == 0 {
            Some("Account holds no lamports".to_string())
        } else {
            None
        };

        let is_reclaimable = blocker.is_none();
        let reason = blocker.unwrap_or_else(|| {
            format!("Empty system account inactive for {} slots", inactivity_slots)
        });

        debug!(
            "Analyzed {}: kind={} balance={} inactivity={} flags={:?} reclaimable={}",
            state.public_key, state.account_kind, state.balance, inactivity_slots, risk_flags, is_reclaimable
        );

        AccountAnalysis {
            public_key: state.public_key,
            is_reclaimable,
            reason,
            current_state: state,
            tracked_account: tracked.clone(),
            reclaimable_balance,
            inactivity_slots,
            risk_flags,
        }
    }

    /// Analyze accounts one at a time; a failed fetch is recorded and skipped
    pub async fn analyze_multiple(&self, accounts: &[TrackedAccount]) -> BatchAnalysis {
        let mut batch = BatchAnalysis::default();

        for tracked in accounts {
            match self.analyze(tracked).await {
                Ok(analysis) => batch.analyses.push(analysis),
                Err(e) => {
                    warn!("Analysis failed for {}: {}", tracked.public_key, e);
                    batch.failures.push(AnalysisFailure {
                        public_key: tracked.public_key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Analyzed {} account(s): {} reclaimable, {} failed",
            accounts.len(),
            batch.analyses.iter().filter(|a| a.is_reclaimable).count(),
            batch.failures.len()
        );
        batch
    }

    fn risk_flags(&self, state: &AccountState, inactivity_slots: u64) -> Vec<RiskFlag> {
        let mut flags = Vec::new();

        if state.is_derived_key {
            flags.push(RiskFlag::DerivedKey);
        }
        if let Some(owner) = &state.owner {
            if !is_known_program(owner) && !self.config.policy.allowed_programs.contains(owner) {
                flags.push(RiskFlag::UnknownProgram);
            }
        }
        if state.token_amount.unwrap_or(0) > 0 {
            flags.push(RiskFlag::NonZeroTokenBalance);
        }
        if inactivity_slots < SLOTS_PER_DAY {
            flags.push(RiskFlag::RecentActivity);
        }
        if inactivity_slots < self.config.policy.min_inactivity_slots {
            flags.push(RiskFlag::BelowInactivityThreshold);
        }
        if state.has_data() {
            flags.push(RiskFlag::HasData);
        }

        flags
    }
}

async fn observe(conn: &Connection, pubkey: &Pubkey) -> Result<Observation> {
    let current_slot = conn.get_slot().await?;
    let account = conn.get_account(pubkey).await?;

    let last_activity_slot = if account.is_some() {
        conn.get_signatures_for_address(pubkey, None, 1)
            .await?
            .first()
            .map(|s| s.slot)
    } else {
        None
    };

    Ok(Observation { current_slot, account, last_activity_slot })
}
