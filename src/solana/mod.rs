pub mod accounts;
pub mod client;
pub mod discovery;
pub mod gateway;
pub mod keyring;
pub mod rent;

pub use accounts::{AccountKind, AccountState, SLOTS_PER_DAY};
pub use client::{LedgerClient, SignatureState, SolanaRpcClient};
pub use discovery::AccountDiscovery;
pub use gateway::{Connection, EndpointGateway, EndpointStatus};
pub use keyring::Keyring;
pub use rent::{RentCalculator, LAMPORTS_PER_SOL};
