use serde::Deserialize;
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use std::str::FromStr;
use crate::error::{ReclaimError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub solana: SolanaConfig,
    pub operator: OperatorConfig,
    #[serde(default)]
    pub reclaim: ReclaimConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SolanaConfig {
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    /// Timeout for a single endpoint liveness probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// How long to poll for a submitted transaction before giving up
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>, name: impl Into<String>, weight: u32) -> Self {
        Self {
            url: url.into(),
            name: Some(name.into()),
            weight,
        }
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.url.clone())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperatorConfig {
    /// Operator public key, used for discovery when no keypair is configured
    #[serde(default)]
    pub pubkey: Option<String>,
    /// Operator keypair: a JSON keypair file or a base58 secret key. Only needed for live runs.
    #[serde(default)]
    pub keypair_path: Option<String>,
    pub treasury_wallet: String,
    /// Directory of keypair files for sponsored accounts that must co-sign their own transfer
    #[serde(default)]
    pub signer_keypairs_dir: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReclaimConfig {
    #[serde(default = "default_min_inactivity_slots")]
    pub min_inactivity_slots: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Owner programs besides the system program that pass the owner check
    #[serde(default)]
    pub allowed_programs: Vec<String>,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            min_inactivity_slots: default_min_inactivity_slots(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            dry_run: true,
            allowed_programs: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_registry_path")]
    pub registry_path: String,
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            audit_log_path: default_audit_log_path(),
        }
    }
}

fn default_commitment() -> String { "confirmed".to_string() }
fn default_probe_timeout_ms() -> u64 { 5_000 }
fn default_confirm_timeout_ms() -> u64 { 60_000 }
fn default_weight() -> u32 { 1 }
fn default_min_inactivity_slots() -> u64 { 100_000 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 2_000 }
fn default_true() -> bool { true }
fn default_registry_path() -> String { "data/registry.json".to_string() }
fn default_audit_log_path() -> String { "data/audit-log.json".to_string() }

impl Config {
    /// Load layered configuration: the given file (if present), then `RECLAIM__*` env vars.
    pub fn load(path: &str) -> Result<Self> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("RECLAIM").separator("__"))
            .build()
            .map_err(|e| ReclaimError::Config(e.to_string()))?;

        let config: Config = config
            .try_deserialize()
            .map_err(|e| ReclaimError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.solana.endpoints.is_empty() {
            return Err(ReclaimError::Config("at least one RPC endpoint is required".to_string()));
        }
        if self.reclaim.min_inactivity_slots == 0 {
            return Err(ReclaimError::Config("min_inactivity_slots must be greater than zero".to_string()));
        }
        self.treasury_wallet()?;
        self.operator_pubkey()?;
        self.allowed_programs()?;
        Ok(())
    }

    pub fn commitment_config(&self) -> CommitmentConfig {
        match self.solana.commitment.as_str() {
            "processed" => CommitmentConfig::processed(),
            "finalized" => CommitmentConfig::finalized(),
            _ => CommitmentConfig::confirmed(),
        }
    }

    pub fn treasury_wallet(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.operator.treasury_wallet)
            .map_err(|e| ReclaimError::Config(format!("Invalid treasury wallet: {}", e)))
    }

    pub fn operator_pubkey(&self) -> Result<Option<Pubkey>> {
        self.operator
            .pubkey
            .as_deref()
            .map(|p| {
                Pubkey::from_str(p).map_err(|e| ReclaimError::Config(format!("Invalid operator pubkey: {}", e)))
            })
            .transpose()
    }

    pub fn allowed_programs(&self) -> Result<Vec<Pubkey>> {
        self.reclaim.allowed_programs
            .iter()
            .map(|p| {
                Pubkey::from_str(p)
                    .map_err(|e| ReclaimError::Config(format!("Invalid allow-listed program {}: {}", p, e)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            solana: SolanaConfig {
                endpoints: vec![EndpointConfig::new("http://localhost:8899", "local", 1)],
                commitment: default_commitment(),
                probe_timeout_ms: default_probe_timeout_ms(),
                confirm_timeout_ms: default_confirm_timeout_ms(),
            },
            operator: OperatorConfig {
                pubkey: None,
                keypair_path: None,
                treasury_wallet: Pubkey::new_unique().to_string(),
                signer_keypairs_dir: None,
            },
            reclaim: ReclaimConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    #[test]
    fn test_validate_accepts_sample() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_endpoints() {
        let mut config = sample();
        config.solana.endpoints.clear();
        assert!(matches!(config.validate(), Err(ReclaimError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_allowlist() {
        let mut config = sample();
        config.reclaim.allowed_programs = vec!["not-a-key".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reclaim_defaults_are_dry_run() {
        let reclaim = ReclaimConfig::default();
        assert!(reclaim.dry_run);
        assert_eq!(reclaim.min_inactivity_slots, 100_000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let treasury = Pubkey::new_unique();
        std::fs::write(
            &path,
            format!(
                r#"
[solana]
commitment = "finalized"

[[solana.endpoints]]
url = "https://primary.example"
name = "primary"
weight = 10

[[solana.endpoints]]
url = "https://backup.example"

[operator]
treasury_wallet = "{}"

[reclaim]
min_inactivity_slots = 432000
"#,
                treasury
            ),
        )
        .unwrap();

        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.solana.endpoints.len(), 2);
        assert_eq!(config.solana.endpoints[1].display_name(), "https://backup.example");
        assert_eq!(config.solana.endpoints[1].weight, 1);
        assert_eq!(config.commitment_config(), CommitmentConfig::finalized());
        assert_eq!(config.treasury_wallet().unwrap(), treasury);
        assert_eq!(config.reclaim.min_inactivity_slots, 432_000);
        assert_eq!(config.storage.registry_path, "data/registry.json");
    }
}
