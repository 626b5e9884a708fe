use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair, Signer},
};
use std::{collections::BTreeMap, fs, path::Path};
use crate::error::{ReclaimError, Result};
use tracing::{debug, info, warn};

/// Operator keypair plus keypairs for sponsored accounts that must sign their own transfer
pub struct Keyring {
    operator: Keypair,
    accounts: BTreeMap<Pubkey, Keypair>,
}

impl Keyring {
    pub fn new(operator: Keypair) -> Self {
        Self {
            operator,
            accounts: BTreeMap::new(),
        }
    }

    /// Load the operator from a keypair file or base58 secret, and every
    /// `*.json` keypair file in `signer_dir`
    pub fn load(operator_source: &str, signer_dir: Option<&str>) -> Result<Self> {
        let mut keyring = Self::new(read_keypair(operator_source)?);
        info!("Loaded operator keypair {}", keyring.operator.pubkey());

        if let Some(dir) = signer_dir {
            let entries = fs::read_dir(dir).map_err(|e| ReclaimError::persistence(dir, e))?;
            for entry in entries {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match read_keypair_file(&path) {
                    Ok(keypair) => keyring = keyring.with_account_signer(keypair),
                    Err(e) => warn!("Skipping unreadable keypair {}: {}", path.display(), e),
                }
            }
            info!("Loaded {} account signer(s) from {}", keyring.accounts.len(), dir);
        }

        Ok(keyring)
    }

    pub fn with_account_signer(mut self, keypair: Keypair) -> Self {
        debug!("Registered signer for {}", keypair.pubkey());
        self.accounts.insert(keypair.pubkey(), keypair);
        self
    }

    pub fn operator(&self) -> &Keypair {
        &self.operator
    }

    /// The keypair that can authorize moving lamports out of `account`
    pub fn signer_for(&self, account: &Pubkey) -> Option<&Keypair> {
        if self.operator.pubkey() == *account {
            return Some(&self.operator);
        }
        self.accounts.get(account)
    }
}

fn read_keypair(source: &str) -> Result<Keypair> {
    if Path::new(source).exists() {
        return read_keypair_file(source)
            .map_err(|e| ReclaimError::Config(format!("Invalid keypair file {}: {}", source, e)));
    }

    let bytes = bs58::decode(source.trim())
        .into_vec()
        .map_err(|e| ReclaimError::Config(format!("Operator key is neither a file nor base58: {}", e)))?;
    Keypair::from_bytes(&bytes)
        .map_err(|e| ReclaimError::Config(format!("Invalid operator secret key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::write_keypair_file;

    #[test]
    fn test_load_from_base58_and_signer_dir() {
        let operator = Keypair::new();
        let account = Keypair::new();
        let dir = tempfile::tempdir().unwrap();
        write_keypair_file(&account, dir.path().join("account.json")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let keyring = Keyring::load(
            &operator.to_base58_string(),
            Some(dir.path().to_str().unwrap()),
        )
        .unwrap();

        assert_eq!(keyring.operator().pubkey(), operator.pubkey());
        assert_eq!(
            keyring.signer_for(&account.pubkey()).map(|k| k.pubkey()),
            Some(account.pubkey())
        );
        assert_eq!(
            keyring.signer_for(&operator.pubkey()).map(|k| k.pubkey()),
            Some(operator.pubkey())
        );
        assert!(keyring.signer_for(&Pubkey::new_unique()).is_none());
    }

    #[test]
    fn test_rejects_garbage_operator_key() {
        assert!(matches!(Keyring::load("0OIl", None), Err(ReclaimError::Config(_))));
    }
}
