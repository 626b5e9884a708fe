pub mod analyzer;
pub mod batch;
pub mod engine;
pub mod safety;

pub use analyzer::{AccountAnalysis, AccountAnalyzer, AnalyzerConfig, BatchAnalysis, RiskFlag};
pub use batch::{ReclaimPipeline, RunReport};
pub use engine::{ExecutionMode, ExecutorConfig, ReclaimAction, ReclaimExecutor, ReclaimStatus};
pub use safety::{safety_report, CheckResult, SafetyCheck, SafetyCheckResult, SafetyConfig, SafetyEngine};
