use async_trait::async_trait;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::RpcTransactionConfig,
    rpc_response::RpcConfirmedTransactionStatusWithSignature,
};
use solana_sdk::{
    account::Account,
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use solana_transaction_status::{EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding};
use std::time::Duration;
use crate::error::Result;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a submitted signature currently stands on the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureState {
    Pending,
    Confirmed,
    Failed(String),
}

/// The subset of the ledger RPC surface the bot reads and writes through.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current slot; doubles as the liveness probe
    async fn get_slot(&self) -> Result<u64>;

    /// `None` when the account does not exist
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>>;

    async fn get_latest_blockhash(&self) -> Result<Hash>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature>;

    async fn get_signature_state(&self, signature: &Signature) -> Result<SignatureState>;

    /// Newest-first signatures touching `address`, paginated with `before`
    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        before: Option<Signature>,
        limit: usize,
    ) -> Result<Vec<RpcConfirmedTransactionStatusWithSignature>>;

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>>;
}

/// JSON-RPC backed ledger client for a single endpoint
pub struct SolanaRpcClient {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaRpcClient {
    pub fn new(rpc_url: &str, commitment: CommitmentConfig) -> Self {
        let client = RpcClient::new_with_timeout_and_commitment(
            rpc_url.to_string(),
            REQUEST_TIMEOUT,
            commitment,
        );
        Self { client, commitment }
    }
}

#[async_trait]
impl LedgerClient for SolanaRpcClient {
    async fn get_slot(&self) -> Result<u64> {
        Ok(self.client.get_slot().await?)
    }

    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>> {
        let response = self.client
            .get_account_with_commitment(pubkey, self.commitment)
            .await?;
        Ok(response.value)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        Ok(self.client.send_transaction(transaction).await?)
    }

    async fn get_signature_state(&self, signature: &Signature) -> Result<SignatureState> {
        let state = match self.client.get_signature_status(signature).await? {
            None => SignatureState::Pending,
            Some(Ok(())) => SignatureState::Confirmed,
            Some(Err(e)) => SignatureState::Failed(e.to_string()),
        };
        Ok(state)
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        before: Option<Signature>,
        limit: usize,
    ) -> Result<Vec<RpcConfirmedTransactionStatusWithSignature>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before,
            until: None,
            limit: Some(limit),
            commitment: Some(self.commitment),
        };
        Ok(self.client
            .get_signatures_for_address_with_config(address, config)
            .await?)
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        match self.client.get_transaction_with_config(signature, config).await {
            Ok(tx) => Ok(Some(tx)),
            Err(e) => {
                // A pruned or unknown transaction comes back as a null result
                if e.to_string().contains("invalid type: null") {
                    Ok(None)
                } else {
                    Err(e.into())
                }
            }
        }
    }
}
