pub mod audit;
pub mod json_file;
pub mod models;
pub mod registry;

pub use audit::{AuditSummary, AuditTrail};
pub use models::{AuditAction, AuditEntry, RegistryDocument, RegistryStatistics, TrackedAccount};
pub use registry::AccountRegistry;
