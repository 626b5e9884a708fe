use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, str::FromStr};
use crate::error::Result;

/// A sponsored account under tracking, keyed by its public key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedAccount {
    pub public_key: String,
    /// Program that owned the account when it was created
    pub controlling_program: String,
    pub rent_balance_at_creation: u64,
    pub creation_slot: u64,
    /// Signature of the creating transaction
    pub creation_proof: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl TrackedAccount {
    pub fn new(
        pubkey: Pubkey,
        controlling_program: Pubkey,
        rent_balance_at_creation: u64,
        creation_slot: u64,
        creation_proof: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            public_key: pubkey.to_string(),
            controlling_program: controlling_program.to_string(),
            rent_balance_at_creation,
            creation_slot,
            creation_proof: creation_proof.into(),
            created_at,
            last_checked_at: None,
        }
    }

    pub fn pubkey(&self) -> Result<Pubkey> {
        Ok(Pubkey::from_str(&self.public_key)?)
    }
}

/// On-disk registry document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDocument {
    #[serde(default)]
    pub sponsored_accounts: Vec<TrackedAccount>,
    #[serde(default)]
    pub last_indexed_slot: u64,
    #[serde(default)]
    pub last_indexed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_indexed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStatistics {
    pub total_count: usize,
    /// Sum of rent balances recorded at creation
    pub total_rent_locked: u64,
    pub counts_by_owner: BTreeMap<String, usize>,
    pub last_indexed_slot: u64,
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub total_indexed: u64,
}

/// Material events recorded in the audit trail and pushed to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Indexed,
    Analyzed,
    ReclaimDryRun,
    ReclaimExecuted,
    ReclaimConfirmed,
    ReclaimFailed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Indexed => "INDEXED",
            AuditAction::Analyzed => "ANALYZED",
            AuditAction::ReclaimDryRun => "RECLAIM_DRY_RUN",
            AuditAction::ReclaimExecuted => "RECLAIM_EXECUTED",
            AuditAction::ReclaimConfirmed => "RECLAIM_CONFIRMED",
            AuditAction::ReclaimFailed => "RECLAIM_FAILED",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the append-only audit log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub unix_timestamp: i64,
    pub action: AuditAction,
    pub account: Option<String>,
    pub details: serde_json::Value,
}

impl AuditEntry {
    pub fn new(action: AuditAction, account: Option<String>, details: serde_json::Value) -> Self {
        let timestamp = Utc::now();
        Self {
            timestamp,
            unix_timestamp: timestamp.timestamp(),
            action,
            account,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracked_account_uses_camel_case_keys() {
        let account = TrackedAccount::new(
            Pubkey::new_unique(),
            solana_sdk::system_program::id(),
            2_000_000,
            12,
            "sig",
            Utc::now(),
        );
        let json = serde_json::to_value(&account).unwrap();
        assert!(json.get("publicKey").is_some());
        assert!(json.get("rentBalanceAtCreation").is_some());
        assert!(json.get("lastCheckedAt").is_some());
    }

    #[test]
    fn test_audit_action_wire_names() {
        let json = serde_json::to_string(&AuditAction::ReclaimDryRun).unwrap();
        assert_eq!(json, "\"RECLAIM_DRY_RUN\"");
        assert_eq!(AuditAction::ReclaimConfirmed.to_string(), "RECLAIM_CONFIRMED");
    }
}
