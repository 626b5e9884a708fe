pub mod config;
pub mod error;
pub mod events;
pub mod reclaim;
pub mod solana;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{ReclaimError, Result};
