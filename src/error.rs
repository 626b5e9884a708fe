use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReclaimError {
    #[error("Solana RPC error: {0}")]
    SolanaRpc(#[from] solana_client::client_error::ClientError),

    #[error("All RPC endpoints failed: {}", tried.join(", "))]
    AllEndpointsFailed { tried: Vec<String> },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Reclaim not approved by safety checks: {0}")]
    NotApproved(String),

    #[error("Invalid reclaim state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Persistence failed for {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pubkey: {0}")]
    ParsePubkey(#[from] solana_sdk::pubkey::ParsePubkeyError),

    #[error("Invalid signature: {0}")]
    ParseSignature(#[from] solana_sdk::signature::ParseSignatureError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReclaimError {
    pub fn persistence(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReclaimError>;
