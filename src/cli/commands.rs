use clap::{ArgGroup, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "rent-reclaim")]
#[command(about = "Safely reclaims rent from dormant operator-sponsored Solana accounts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (extension optional)
    #[arg(short, long, global = true, default_value = "config/default")]
    pub config: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add sponsored accounts to the registry
    #[command(group(ArgGroup::new("source").required(true).args(["file", "scan"])))]
    Index {
        /// JSON file with an account array or a registry document
        #[arg(short, long)]
        file: Option<String>,

        /// Discover accounts from the operator's transaction history
        #[arg(long)]
        scan: bool,

        /// Max signatures to walk when scanning
        #[arg(short, long, default_value = "1000")]
        limit: usize,
    },

    /// Analyze every tracked account and record the safety decision
    Analyze {
        /// Print the full safety report for each account
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run the full pipeline over the registry
    #[command(group(ArgGroup::new("mode").required(true).args(["dry_run", "live"])))]
    Reclaim {
        /// Simulate without sending transactions
        #[arg(long)]
        dry_run: bool,

        /// Submit real transfers to the treasury
        #[arg(long)]
        live: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Summarize the audit trail
    Report {
        /// Output format: text or json
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show registry statistics
    Stats {
        /// Output format: table or json
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Create the storage files and print the effective configuration
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reclaim_requires_a_mode() {
        assert!(Cli::try_parse_from(["rent-reclaim", "reclaim"]).is_err());
        assert!(Cli::try_parse_from(["rent-reclaim", "reclaim", "--dry-run", "--live"]).is_err());

        let cli = Cli::try_parse_from(["rent-reclaim", "reclaim", "--live", "--yes"]).unwrap();
        assert!(matches!(cli.command, Commands::Reclaim { live: true, yes: true, dry_run: false }));
    }

    #[test]
    fn test_index_requires_a_source() {
        assert!(Cli::try_parse_from(["rent-reclaim", "index"]).is_err());

        let cli = Cli::try_parse_from(["rent-reclaim", "index", "--scan", "--limit", "50"]).unwrap();
        assert!(matches!(cli.command, Commands::Index { scan: true, limit: 50, file: None }));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["rent-reclaim", "stats", "--config", "prod.toml", "--format", "json"]).unwrap();
        assert_eq!(cli.config, "prod.toml");
        assert!(matches!(cli.command, Commands::Stats { format: OutputFormat::Json }));
    }
}
