use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};
use crate::{
    error::{ReclaimError, Result},
    storage::{
        json_file,
        models::{RegistryDocument, RegistryStatistics, TrackedAccount},
    },
};
use tracing::{debug, info, warn};

/// Durable set of tracked sponsored accounts.
///
/// Every operation reads the JSON document from disk, and every mutation writes
/// the whole document back atomically. No state is cached between calls.
pub struct AccountRegistry {
    path: PathBuf,
}

impl AccountRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<RegistryDocument> {
        json_file::read_or_default(&self.path)
    }

    fn save(&self, document: &RegistryDocument) -> Result<()> {
        json_file::write_atomic(&self.path, document)
    }

    /// Add new accounts, skipping keys that are already tracked or repeated in
    /// `records`. Returns how many were actually added.
    pub fn import(&self, records: Vec<TrackedAccount>) -> Result<usize> {
        Ok(self.import_new(records)?.len())
    }

    /// Same as [`import`](Self::import) but hands back the admitted records
    pub fn import_new(&self, records: Vec<TrackedAccount>) -> Result<Vec<TrackedAccount>> {
        let mut document = self.load()?;
        let mut known: HashSet<String> = document
            .sponsored_accounts
            .iter()
            .map(|a| a.public_key.clone())
            .collect();

        let mut imported = Vec::new();
        let mut highest_slot = document.last_indexed_slot;

        for record in records {
            if let Err(e) = record.pubkey() {
                warn!("Skipping record with invalid public key {}: {}", record.public_key, e);
                continue;
            }
            if !known.insert(record.public_key.clone()) {
                debug!("Account {} already tracked, skipping", record.public_key);
                continue;
            }
            highest_slot = highest_slot.max(record.creation_slot);
            document.sponsored_accounts.push(record.clone());
            imported.push(record);
        }

        document.last_indexed_slot = highest_slot;
        document.last_indexed_at = Some(Utc::now());
        document.total_indexed += imported.len() as u64;
        self.save(&document)?;

        info!(
            "Imported {} account(s) into registry ({} tracked)",
            imported.len(),
            document.sponsored_accounts.len()
        );
        Ok(imported)
    }

    /// Records from an import file: either a bare array of accounts or a
    /// whole registry document exported from another instance
    pub fn read_import_file(path: &Path) -> Result<Vec<TrackedAccount>> {
        let bytes = std::fs::read(path).map_err(|e| ReclaimError::persistence(path, e))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        if value.is_array() {
            return Ok(serde_json::from_value(value)?);
        }
        let document: RegistryDocument = serde_json::from_value(value)?;
        Ok(document.sponsored_accounts)
    }

    /// Tracked accounts in import order
    pub fn list(&self) -> Result<Vec<TrackedAccount>> {
        Ok(self.load()?.sponsored_accounts)
    }

    pub fn get(&self, public_key: &str) -> Result<Option<TrackedAccount>> {
        Ok(self
            .load()?
            .sponsored_accounts
            .into_iter()
            .find(|a| a.public_key == public_key))
    }

    /// Returns whether the key was tracked
    pub fn remove(&self, public_key: &str) -> Result<bool> {
        let mut document = self.load()?;
        let before = document.sponsored_accounts.len();
        document.sponsored_accounts.retain(|a| a.public_key != public_key);

        if document.sponsored_accounts.len() == before {
            return Ok(false);
        }
        self.save(&document)?;
        info!("Removed {} from registry", public_key);
        Ok(true)
    }

    /// Refresh `last_checked_at`; returns whether the key was tracked
    pub fn touch(&self, public_key: &str, checked_at: DateTime<Utc>) -> Result<bool> {
        let mut document = self.load()?;
        let Some(account) = document
            .sponsored_accounts
            .iter_mut()
            .find(|a| a.public_key == public_key)
        else {
            return Ok(false);
        };
        account.last_checked_at = Some(checked_at);
        self.save(&document)?;
        Ok(true)
    }

    pub fn statistics(&self) -> Result<RegistryStatistics> {
        let document = self.load()?;
        let mut counts_by_owner = BTreeMap::new();
        let mut total_rent_locked = 0u64;

        for account in &document.sponsored_accounts {
            *counts_by_owner.entry(account.controlling_program.clone()).or_insert(0) += 1;
            total_rent_locked = total_rent_locked.saturating_add(account.rent_balance_at_creation);
        }

        Ok(RegistryStatistics {
            total_count: document.sponsored_accounts.len(),
            total_rent_locked,
            counts_by_owner,
            last_indexed_slot: document.last_indexed_slot,
            last_indexed_at: document.last_indexed_at,
            total_indexed: document.total_indexed,
        })
    }
}
