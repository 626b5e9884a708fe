use serde::{Deserialize, Serialize};
use solana_sdk::{account::Account, pubkey::Pubkey};
use spl_token::{
    solana_program::program_pack::Pack,
    state::{Account as TokenAccount, Mint},
};
use crate::solana::rent::RentCalculator;

/// Roughly one day of slots at 400ms per slot
pub const SLOTS_PER_DAY: u64 = 216_000;

/// How an account is laid out on chain, which decides whether a plain
/// lamport transfer could ever empty it safely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountKind {
    SystemOwned,
    FungibleMint,
    FungibleHolding,
    AssociatedHolding,
    DerivedProgramAddress,
    ExecutableProgram,
    Unknown,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::SystemOwned => "system-owned",
            AccountKind::FungibleMint => "fungible-mint",
            AccountKind::FungibleHolding => "fungible-holding",
            AccountKind::AssociatedHolding => "associated-holding",
            AccountKind::DerivedProgramAddress => "derived-program-address",
            AccountKind::ExecutableProgram => "executable-program",
            AccountKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of an account's on-chain state at query time. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountState {
    pub public_key: Pubkey,
    pub balance: u64,
    pub exists: bool,
    pub owner: Option<Pubkey>,
    pub rent_exempt: bool,
    pub last_modified_slot: u64,
    pub raw_data: Vec<u8>,
    pub is_derived_key: bool,
    pub is_derived_token_account: bool,
    pub account_kind: AccountKind,
    /// Token amount when the account is an SPL token holding
    pub token_amount: Option<u64>,
}

impl AccountState {
    pub fn missing(public_key: Pubkey, last_modified_slot: u64) -> Self {
        Self {
            public_key,
            balance: 0,
            exists: false,
            owner: None,
            rent_exempt: false,
            last_modified_slot,
            raw_data: Vec::new(),
            is_derived_key: is_derived_key(&public_key),
            is_derived_token_account: false,
            account_kind: AccountKind::Unknown,
            token_amount: None,
        }
    }

    pub fn from_account(public_key: Pubkey, account: &Account, last_modified_slot: u64) -> Self {
        let is_derived_key = is_derived_key(&public_key);
        let classification = classify(&public_key, account, is_derived_key);

        Self {
            public_key,
            balance: account.lamports,
            exists: true,
            owner: Some(account.owner),
            rent_exempt: RentCalculator::is_rent_exempt(account),
            last_modified_slot,
            raw_data: account.data.clone(),
            is_derived_key,
            is_derived_token_account: classification.kind == AccountKind::AssociatedHolding,
            account_kind: classification.kind,
            token_amount: classification.token_amount,
        }
    }

    pub fn has_data(&self) -> bool {
        !self.raw_data.is_empty()
    }
}

/// A key is a derived (program) address exactly when it is not a valid
/// ed25519 point. `Pubkey::is_on_curve` is the same decompression check the
/// runtime applies when validating signatures.
pub fn is_derived_key(pubkey: &Pubkey) -> bool {
    !pubkey.is_on_curve()
}

/// Owner programs whose accounts the analyzer knows how to reason about
pub fn is_known_program(program: &Pubkey) -> bool {
    *program == solana_sdk::system_program::id()
        || *program == spl_token::id()
        || *program == spl_associated_token_account::id()
        || is_loader(program)
}

fn is_loader(program: &Pubkey) -> bool {
    *program == solana_sdk::bpf_loader::id()
        || *program == solana_sdk::bpf_loader_deprecated::id()
        || *program == solana_sdk::bpf_loader_upgradeable::id()
        || *program == solana_sdk::native_loader::id()
}

struct Classification {
    kind: AccountKind,
    token_amount: Option<u64>,
}

fn classify(pubkey: &Pubkey, account: &Account, is_derived_key: bool) -> Classification {
    let plain = |kind| Classification { kind, token_amount: None };

    if account.executable || is_loader(&account.owner) {
        return plain(AccountKind::ExecutableProgram);
    }

    if account.owner == solana_sdk::system_program::id() {
        return plain(AccountKind::SystemOwned);
    }

    if account.owner == spl_token::id() {
        return classify_token(pubkey, &account.data);
    }

    if is_derived_key {
        return plain(AccountKind::DerivedProgramAddress);
    }

    plain(AccountKind::Unknown)
}

fn classify_token(pubkey: &Pubkey, data: &[u8]) -> Classification {
    if data.len() == Mint::LEN {
        return Classification { kind: AccountKind::FungibleMint, token_amount: None };
    }

    if data.len() == TokenAccount::LEN {
        if let Ok(holding) = TokenAccount::unpack(data) {
            let associated = spl_associated_token_account::get_associated_token_address(
                &holding.owner,
                &holding.mint,
            );
            let kind = if associated == *pubkey {
                AccountKind::AssociatedHolding
            } else {
                AccountKind::FungibleHolding
            };
            return Classification { kind, token_amount: Some(holding.amount) };
        }
    }

    Classification { kind: AccountKind::Unknown, token_amount: None }
}
