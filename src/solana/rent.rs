use solana_sdk::{account::Account, rent::Rent};

/// Lamports per SOL constant
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub struct RentCalculator;

impl RentCalculator {
    /// Minimum balance for an account of `data_len` bytes to be rent-exempt
    pub fn minimum_balance(data_len: usize) -> u64 {
        Rent::default().minimum_balance(data_len)
    }

    /// Check if account is rent-exempt under the ledger's rent parameters
    pub fn is_rent_exempt(account: &Account) -> bool {
        Rent::default().is_exempt(account.lamports, account.data.len())
    }

    /// Convert lamports to SOL (as f64)
    pub fn lamports_to_sol(lamports: u64) -> f64 {
        lamports as f64 / LAMPORTS_PER_SOL as f64
    }

    /// Format lamports as SOL string with decimals
    pub fn format_sol(lamports: u64) -> String {
        format!("{:.9} SOL", Self::lamports_to_sol(lamports))
    }
}
