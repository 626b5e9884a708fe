use chrono::{DateTime, Utc};
use serde_json::Value;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta,
    EncodedTransaction,
    UiInstruction,
    UiMessage,
    UiParsedInstruction,
};
use std::{str::FromStr, sync::Arc, time::Duration};
use crate::{
    error::Result,
    solana::{gateway::EndpointGateway, rent::RentCalculator},
    storage::models::TrackedAccount,
};
use spl_token::solana_program::program_pack::Pack;
use tracing::{debug, info, warn};

/// Max signatures per `getSignaturesForAddress` page
const PAGE_SIZE: usize = 1000;

/// Finds accounts the operator paid to create by walking its transaction history
pub struct AccountDiscovery {
    gateway: Arc<EndpointGateway>,
    operator: Pubkey,
    probe_timeout: Duration,
}

impl AccountDiscovery {
    pub fn new(gateway: Arc<EndpointGateway>, operator: Pubkey, probe_timeout: Duration) -> Self {
        Self { gateway, operator, probe_timeout }
    }

    /// Scan up to `max_signatures` of the operator's most recent transactions
    pub async fn discover(&self, max_signatures: usize) -> Result<Vec<TrackedAccount>> {
        info!("Discovering sponsored accounts for operator: {}", self.operator);

        let mut discovered = Vec::new();
        let mut before: Option<Signature> = None;
        let mut total_fetched = 0usize;

        while total_fetched < max_signatures {
            let limit = PAGE_SIZE.min(max_signatures - total_fetched);
            let conn = self.gateway.acquire_connection(self.probe_timeout).await?;

            let signatures = match conn.get_signatures_for_address(&self.operator, before, limit).await {
                Ok(signatures) => signatures,
                Err(e) => {
                    self.gateway.mark_failed(conn.url());
                    return Err(e);
                }
            };

            if signatures.is_empty() {
                break;
            }
            debug!("Processing page of {} signatures", signatures.len());

            for sig_info in &signatures {
                if sig_info.err.is_some() {
                    continue;
                }
                let signature = Signature::from_str(&sig_info.signature)?;

                match conn.get_transaction(&signature).await {
                    Ok(Some(tx)) => discovered.extend(self.parse_transaction(&tx, &signature)),
                    Ok(None) => debug!("Transaction {} not available", signature),
                    Err(e) => {
                        warn!("Failed to fetch transaction {}: {}", signature, e);
                        self.gateway.mark_failed(conn.url());
                    }
                }
            }

            total_fetched += signatures.len();
            if let Some(last) = signatures.last() {
                before = Some(Signature::from_str(&last.signature)?);
            }
            if signatures.len() < limit {
                break;
            }
        }

        info!("Discovered {} sponsored account(s) in {} signatures", discovered.len(), total_fetched);
        Ok(discovered)
    }

    /// Extract operator-sponsored account creations from one transaction
    pub fn parse_transaction(
        &self,
        tx: &EncodedConfirmedTransactionWithStatusMeta,
        signature: &Signature,
    ) -> Vec<TrackedAccount> {
        if tx.transaction.meta.as_ref().map(|m| m.err.is_some()).unwrap_or(false) {
            return Vec::new();
        }

        let EncodedTransaction::Json(ui_tx) = &tx.transaction.transaction else {
            return Vec::new();
        };

        if fee_payer(&ui_tx.message) != Some(self.operator) {
            return Vec::new();
        }

        let UiMessage::Parsed(parsed_msg) = &ui_tx.message else {
            return Vec::new();
        };

        let created_at = tx
            .block_time
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .unwrap_or_else(Utc::now);

        parsed_msg
            .instructions
            .iter()
            .filter_map(|ix| parse_creation(ix, signature, tx.slot, created_at))
            .collect()
    }
}

/// The fee payer is always the first account key
pub fn fee_payer(message: &UiMessage) -> Option<Pubkey> {
    let first = match message {
        UiMessage::Parsed(parsed) => parsed.account_keys.first().map(|k| k.pubkey.as_str()),
        UiMessage::Raw(raw) => raw.account_keys.first().map(String::as_str),
    };
    first.and_then(|key| Pubkey::from_str(key).ok())
}

fn parse_creation(
    instruction: &UiInstruction,
    signature: &Signature,
    slot: u64,
    created_at: DateTime<Utc>,
) -> Option<TrackedAccount> {
    let UiInstruction::Parsed(UiParsedInstruction::Parsed(parsed)) = instruction else {
        return None;
    };
    let kind = parsed.parsed.get("type").and_then(Value::as_str)?;
    let info = parsed.parsed.get("info").and_then(Value::as_object)?;
    let key = |name: &str| info.get(name).and_then(Value::as_str).and_then(|s| Pubkey::from_str(s).ok());

    let (account, owner, lamports) = match (parsed.program.as_str(), kind) {
        ("system", "createAccount" | "createAccountWithSeed") => {
            let lamports = info.get("lamports").and_then(Value::as_u64).unwrap_or(0);
            (key("newAccount")?, key("owner")?, lamports)
        }
        ("spl-token", "initializeAccount" | "initializeAccount2" | "initializeAccount3") => {
            let lamports = RentCalculator::minimum_balance(spl_token::state::Account::LEN);
            (key("account")?, spl_token::id(), lamports)
        }
        ("spl-associated-token-account", "create" | "createIdempotent") => {
            let lamports = RentCalculator::minimum_balance(spl_token::state::Account::LEN);
            (key("account")?, spl_token::id(), lamports)
        }
        _ => return None,
    };

    debug!("Found {} creation of {} in {}", kind, account, signature);
    Some(TrackedAccount::new(account, owner, lamports, slot, signature.to_string(), created_at))
}
