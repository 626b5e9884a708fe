use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::Transaction,
};
use std::{sync::Arc, time::Duration};
use crate::{
    error::{ReclaimError, Result},
    reclaim::{analyzer::AccountAnalysis, safety::SafetyCheckResult},
    solana::{client::SignatureState, gateway::EndpointGateway, keyring::Keyring, rent::RentCalculator},
};
use tracing::{debug, info, warn};

/// Lifecycle of a single reclaim attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReclaimStatus {
    Pending,
    DryRun,
    Submitted,
    Confirmed,
    Failed,
}

impl ReclaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReclaimStatus::Pending => "PENDING",
            ReclaimStatus::DryRun => "DRY_RUN",
            ReclaimStatus::Submitted => "SUBMITTED",
            ReclaimStatus::Confirmed => "CONFIRMED",
            ReclaimStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReclaimStatus::DryRun | ReclaimStatus::Confirmed | ReclaimStatus::Failed)
    }

    pub fn can_transition_to(&self, next: ReclaimStatus) -> bool {
        matches!(
            (self, next),
            (ReclaimStatus::Pending, ReclaimStatus::DryRun)
                | (ReclaimStatus::Pending, ReclaimStatus::Submitted)
                | (ReclaimStatus::Pending, ReclaimStatus::Failed)
                | (ReclaimStatus::Submitted, ReclaimStatus::Confirmed)
                | (ReclaimStatus::Submitted, ReclaimStatus::Failed)
        )
    }
}

impl std::fmt::Display for ReclaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one reclaim attempt and where it ended up
#[derive(Debug, Clone, PartialEq)]
pub struct ReclaimAction {
    pub account_key: Pubkey,
    pub treasury_address: Pubkey,
    pub amount: u64,
    pub reason: String,
    pub signature: Option<Signature>,
    pub status: ReclaimStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl ReclaimAction {
    fn new(analysis: &AccountAnalysis, treasury: Pubkey) -> Self {
        Self {
            account_key: analysis.public_key,
            treasury_address: treasury,
            amount: analysis.reclaimable_balance,
            reason: analysis.reason.clone(),
            signature: None,
            status: ReclaimStatus::Pending,
            created_at: Utc::now(),
            executed_at: None,
            error_message: None,
        }
    }

    /// Move to `next`, rejecting any edge outside the state machine
    pub fn transition(&mut self, next: ReclaimStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ReclaimError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Reclaim {} {} -> {}", self.account_key, self.status, next);
        self.status = next;
        if next.is_terminal() {
            self.executed_at = Some(Utc::now());
        }
        Ok(())
    }

    fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        warn!("Reclaim of {} failed: {}", self.account_key, message);
        self.error_message = Some(message);
        self.transition(ReclaimStatus::Failed)
    }

    pub fn audit_details(&self) -> serde_json::Value {
        json!({
            "treasury": self.treasury_address.to_string(),
            "amount": self.amount,
            "amountSol": RentCalculator::lamports_to_sol(self.amount),
            "reason": self.reason,
            "signature": self.signature.map(|s| s.to_string()),
            "status": self.status,
            "createdAt": self.created_at,
            "executedAt": self.executed_at,
            "error": self.error_message,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    DryRun,
    Live,
}

/// Delay between signature status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub treasury: Pubkey,
    pub mode: ExecutionMode,
    /// Extra submission attempts after the first
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub probe_timeout: Duration,
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
}

pub struct ReclaimExecutor {
    gateway: Arc<EndpointGateway>,
    keyring: Option<Arc<Keyring>>,
    config: ExecutorConfig,
}

impl ReclaimExecutor {
    pub fn new(gateway: Arc<EndpointGateway>, keyring: Option<Arc<Keyring>>, config: ExecutorConfig) -> Self {
        Self { gateway, keyring, config }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.config.mode
    }

    /// Reclaim one approved account. Refuses anything the safety engine rejected.
    pub async fn execute(&self, analysis: &AccountAnalysis, safety: &SafetyCheckResult) -> Result<ReclaimAction> {
        if !safety.approved {
            return Err(ReclaimError::NotApproved(safety.reason.clone()));
        }

        let mut action = ReclaimAction::new(analysis, self.config.treasury);

        match self.config.mode {
            ExecutionMode::DryRun => {
                action.transition(ReclaimStatus::DryRun)?;
                info!(
                    "DRY RUN: Would reclaim {} lamports ({}) from {} to {}",
                    action.amount,
                    RentCalculator::format_sol(action.amount),
                    action.account_key,
                    action.treasury_address
                );
            }
            ExecutionMode::Live => self.execute_live(&mut action, analysis).await?,
        }

        Ok(action)
    }

    async fn execute_live(&self, action: &mut ReclaimAction, analysis: &AccountAnalysis) -> Result<()> {
        let Some(keyring) = self.keyring.as_deref() else {
            return action.fail("No keyring configured for live execution");
        };
        let Some(account_signer) = keyring.signer_for(&action.account_key) else {
            return action.fail(format!("No signing key available for {}", action.account_key));
        };

        if let Err(e) = self.preflight(analysis).await {
            return action.fail(format!("Pre-flight check failed: {}", e));
        }

        info!(
            "Reclaiming {} lamports ({}) from {} to {}",
            action.amount,
            RentCalculator::format_sol(action.amount),
            action.account_key,
            action.treasury_address
        );

        let instruction = system_instruction::transfer(&action.account_key, &action.treasury_address, action.amount);
        let attempts = self.config.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.submit(&instruction, keyring.operator(), account_signer).await {
                Ok(signature) => {
                    info!("Submitted reclaim of {} (attempt {}/{}): {}", action.account_key, attempt, attempts, signature);
                    action.signature = Some(signature);
                    action.transition(ReclaimStatus::Submitted)?;
                    break;
                }
                Err(ReclaimError::Signing(e)) => {
                    return action.fail(format!("Signing failed: {}", e));
                }
                Err(e) => {
                    warn!("Submission attempt {}/{} for {} failed: {}", attempt, attempts, action.account_key, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        let Some(signature) = action.signature else {
            return action.fail(format!("Submission failed after {} attempt(s): {}", attempts, last_error));
        };

        match self.await_confirmation(&signature).await {
            Ok(()) => {
                action.transition(ReclaimStatus::Confirmed)?;
                info!(
                    "✓ Reclaimed {} lamports from {} | Signature: {}",
                    action.amount, action.account_key, signature
                );
                Ok(())
            }
            Err(e) => action.fail(e.to_string()),
        }
    }

    /// Re-read the balance right before moving it
    async fn preflight(&self, analysis: &AccountAnalysis) -> Result<()> {
        let conn = self.gateway.acquire_connection(self.config.probe_timeout).await?;
        let account = match conn.get_account(&analysis.public_key).await {
            Ok(account) => account,
            Err(e) => {
                self.gateway.mark_failed(conn.url());
                return Err(e);
            }
        };

        let Some(account) = account else {
            return Err(ReclaimError::AccountNotFound(analysis.public_key.to_string()));
        };
        if account.lamports != analysis.current_state.balance {
            return Err(ReclaimError::TransactionFailed(format!(
                "balance changed since analysis ({} -> {})",
                analysis.current_state.balance, account.lamports
            )));
        }
        Ok(())
    }

    async fn submit(&self, instruction: &Instruction, operator: &Keypair, account_signer: &Keypair) -> Result<Signature> {
        let conn = self.gateway.acquire_connection(self.config.probe_timeout).await?;

        let blockhash = match conn.get_latest_blockhash().await {
            Ok(hash) => hash,
            Err(e) => {
                self.gateway.mark_failed(conn.url());
                return Err(e);
            }
        };

        let transaction = build_transaction(instruction, operator, account_signer, blockhash)?;

        match conn.send_transaction(&transaction).await {
            Ok(signature) => {
                self.gateway.mark_successful(conn.url());
                Ok(signature)
            }
            Err(e) => {
                self.gateway.mark_failed(conn.url());
                Err(e)
            }
        }
    }

    async fn await_confirmation(&self, signature: &Signature) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.config.confirm_timeout;

        loop {
            match self.gateway.acquire_connection(self.config.probe_timeout).await {
                Ok(conn) => match conn.get_signature_state(signature).await {
                    Ok(SignatureState::Confirmed) => return Ok(()),
                    Ok(SignatureState::Failed(err)) => {
                        return Err(ReclaimError::TransactionFailed(err));
                    }
                    Ok(SignatureState::Pending) => debug!("Signature {} still pending", signature),
                    Err(e) => {
                        warn!("Status check for {} failed: {}", signature, e);
                        self.gateway.mark_failed(conn.url());
                    }
                },
                Err(e) => warn!("No endpoint available to confirm {}: {}", signature, e),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(ReclaimError::TransactionFailed(format!(
                    "{} not confirmed within {}ms",
                    signature,
                    self.config.confirm_timeout.as_millis()
                )));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

/// Operator pays the fee; the account co-signs its own debit
fn build_transaction(
    instruction: &Instruction,
    operator: &Keypair,
    account_signer: &Keypair,
    blockhash: Hash,
) -> Result<Transaction> {
    let mut signers: Vec<&Keypair> = vec![operator];
    if account_signer.pubkey() != operator.pubkey() {
        signers.push(account_signer);
    }

    let mut transaction = Transaction::new_with_payer(&[instruction.clone()], Some(&operator.pubkey()));
    transaction
        .try_sign(signers.as_slice(), blockhash)
        .map_err(|e| ReclaimError::Signing(e.to_string()))?;
    Ok(transaction)
}
