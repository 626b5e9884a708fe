mod cli;

use clap::Parser;
use cli::{Cli, Commands, OutputFormat};
use colored::*;
use rent_reclaim::{
    config::Config,
    error::{self, ReclaimError},
    events::{self, EventSink},
    reclaim::{
        engine::DEFAULT_POLL_INTERVAL,
        AccountAnalyzer,
        AnalyzerConfig,
        ExecutionMode,
        ExecutorConfig,
        ReclaimExecutor,
        ReclaimPipeline,
        SafetyConfig,
    },
    solana::{AccountDiscovery, EndpointGateway, Keyring},
    storage::{AccountRegistry, AuditAction, AuditTrail, TrackedAccount},
    utils,
};
use serde_json::json;
use solana_sdk::{pubkey::Pubkey, signature::Signer};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rent_reclaim=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Index { file, scan, limit } => {
            info!("Indexing sponsored accounts...");
            index_accounts(&config, file.as_deref(), scan, limit).await
        }

        Commands::Analyze { verbose } => {
            info!("Analyzing tracked accounts...");
            run_pipeline(&config, None, verbose).await
        }

        Commands::Reclaim { dry_run: _, live, yes } => {
            info!("Starting reclaim run...");
            reclaim_accounts(&config, live, yes).await
        }

        Commands::Report { format } => show_report(&config, format),

        Commands::Stats { format } => {
            info!("Generating statistics...");
            show_stats(&config, format)
        }

        Commands::Init => {
            info!("Initializing...");
            initialize(&config)
        }
    };

    if let Err(e) = result {
        error!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn gateway(config: &Config) -> error::Result<Arc<EndpointGateway>> {
    Ok(Arc::new(EndpointGateway::from_config(&config.solana, config.commitment_config())?))
}

fn probe_timeout(config: &Config) -> Duration {
    Duration::from_millis(config.solana.probe_timeout_ms)
}

fn operator_pubkey(config: &Config) -> error::Result<Pubkey> {
    if let Some(pubkey) = config.operator_pubkey()? {
        return Ok(pubkey);
    }
    let source = config.operator.keypair_path.as_deref().ok_or_else(|| {
        ReclaimError::Config("operator.pubkey or operator.keypair_path is required".to_string())
    })?;
    Ok(Keyring::load(source, None)?.operator().pubkey())
}

async fn index_accounts(config: &Config, file: Option<&str>, scan: bool, limit: usize) -> error::Result<()> {
    let (records, source) = if scan {
        let operator = operator_pubkey(config)?;
        println!("{}", format!("Scanning history of operator {}...", operator).cyan());
        let discovery = AccountDiscovery::new(gateway(config)?, operator, probe_timeout(config));
        (discovery.discover(limit).await?, "scan")
    } else {
        let path = file.ok_or_else(|| ReclaimError::Config("--file or --scan is required".to_string()))?;
        println!("{}", format!("Importing accounts from {}...", path).cyan());
        (AccountRegistry::read_import_file(Path::new(path))?, "file")
    };

    let found = records.len();
    let registry = AccountRegistry::new(&config.storage.registry_path);
    let audit = AuditTrail::new(&config.storage.audit_log_path);
    let imported = registry.import_new(records)?;

    for account in &imported {
        if let Err(e) = audit.append(AuditAction::Indexed, Some(&account.public_key), indexed_details(account, source)) {
            error!("Failed to audit indexing of {}: {}", account.public_key, e);
        }
    }

    println!("\n{}", "=== Index Results ===".cyan().bold());
    println!("Found:      {}", found);
    println!("Imported:   {} ✓", imported.len().to_string().green());
    println!("Skipped:    {}", (found - imported.len()).to_string().yellow());
    println!("Tracked:    {}", registry.list()?.len());
    Ok(())
}

fn indexed_details(account: &TrackedAccount, source: &str) -> serde_json::Value {
    json!({
        "source": source,
        "controllingProgram": account.controlling_program,
        "rentBalanceAtCreation": account.rent_balance_at_creation,
        "creationSlot": account.creation_slot,
        "creationProof": account.creation_proof,
    })
}

async fn reclaim_accounts(config: &Config, live: bool, yes: bool) -> error::Result<()> {
    let live = if live && config.reclaim.dry_run {
        println!(
            "{}",
            "Configuration has reclaim.dry_run = true; running as a dry run".yellow()
        );
        false
    } else {
        live
    };

    if !live {
        println!("{}", "DRY RUN: No transactions will be sent".yellow());
        return run_pipeline(config, Some((ExecutionMode::DryRun, None)), false).await;
    }

    let source = config.operator.keypair_path.as_deref().ok_or_else(|| {
        ReclaimError::Config("operator.keypair_path is required for live reclaims".to_string())
    })?;
    let keyring = Keyring::load(source, config.operator.signer_keypairs_dir.as_deref())?;

    if !yes {
        let tracked = AccountRegistry::new(&config.storage.registry_path).list()?.len();
        let prompt = format!(
            "Send live reclaim transfers for up to {} tracked account(s) to {}?",
            tracked,
            config.treasury_wallet()?
        );
        if !utils::confirm_action(&prompt) {
            println!("Cancelled");
            return Ok(());
        }
    }

    run_pipeline(config, Some((ExecutionMode::Live, Some(keyring))), false).await
}

async fn run_pipeline(
    config: &Config,
    execution: Option<(ExecutionMode, Option<Keyring>)>,
    verbose: bool,
) -> error::Result<()> {
    let gateway = gateway(config)?;

    let analyzer = AccountAnalyzer::new(
        Arc::clone(&gateway),
        AnalyzerConfig {
            policy: SafetyConfig {
                min_inactivity_slots: config.reclaim.min_inactivity_slots,
                allowed_programs: config.allowed_programs()?,
            },
            probe_timeout: probe_timeout(config),
        },
    );
    let safety = analyzer.safety_engine();

    let executor = match execution {
        Some((mode, keyring)) => Some(ReclaimExecutor::new(
            Arc::clone(&gateway),
            keyring.map(Arc::new),
            ExecutorConfig {
                treasury: config.treasury_wallet()?,
                mode,
                max_retries: config.reclaim.max_retries,
                retry_delay: Duration::from_millis(config.reclaim.retry_delay_ms),
                probe_timeout: probe_timeout(config),
                confirm_timeout: Duration::from_millis(config.solana.confirm_timeout_ms),
                poll_interval: DEFAULT_POLL_INTERVAL,
            },
        )),
        None => None,
    };

    let (sink, receiver) = EventSink::channel();
    let cancel = CancellationToken::new();
    let subscriber = events::spawn_log_subscriber(receiver, cancel.clone());

    let audit_path = PathBuf::from(&config.storage.audit_log_path);
    let pipeline = ReclaimPipeline::new(
        AccountRegistry::new(&config.storage.registry_path),
        AuditTrail::new(&audit_path),
        analyzer,
        safety,
        executor,
        sink,
    )
    .with_progress(true)
    .with_safety_reports(verbose);

    let result = tokio::select! {
        report = pipeline.run() => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; finishing without a run report");
            Err(ReclaimError::Other(anyhow::anyhow!("interrupted")))
        }
    };

    drop(pipeline);
    cancel.cancel();
    match subscriber.await {
        Ok(seen) => info!("Event subscriber handled {} event(s)", seen),
        Err(e) => warn!("Event subscriber ended abnormally: {}", e),
    }

    let report = result?;
    report.print_summary();

    let report_dir = match audit_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    match report.save(&report_dir) {
        Ok(path) => println!("\nReport saved to {}", path.display().to_string().cyan()),
        Err(e) => error!("Failed to save run report: {}", e),
    }
    Ok(())
}

fn show_report(config: &Config, format: OutputFormat) -> error::Result<()> {
    let audit = AuditTrail::new(&config.storage.audit_log_path);
    let summary = audit.summary()?;
    let registry = AccountRegistry::new(&config.storage.registry_path).statistics()?;

    if format == OutputFormat::Json {
        let report = json!({ "audit": summary, "registry": registry });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", summary.render_text());
    println!("Still tracked:    {}", registry.total_count);
    println!("Rent at creation: {}", utils::format_sol(registry.total_rent_locked));

    let recent: Vec<_> = audit
        .entries()?
        .into_iter()
        .rev()
        .filter(|e| e.action != AuditAction::Analyzed)
        .take(10)
        .collect();
    if !recent.is_empty() {
        println!("\n{}", "Recent Actions:".yellow());
        utils::print_table_border(90);
        utils::print_table_row(&["Timestamp", "Action", "Account", "Amount"], &[24, 18, 20, 20]);
        utils::print_table_border(90);
        for entry in recent {
            let amount = entry.details.get("amount").and_then(|v| v.as_u64());
            utils::print_table_row(
                &[
                    &utils::format_timestamp(&entry.timestamp),
                    entry.action.as_str(),
                    &utils::format_pubkey(entry.account.as_deref().unwrap_or("-")),
                    &amount.map(rent_reclaim::solana::RentCalculator::format_sol).unwrap_or_default(),
                ],
                &[24, 18, 20, 20],
            );
        }
        utils::print_table_border(90);
    }
    Ok(())
}

fn show_stats(config: &Config, format: OutputFormat) -> error::Result<()> {
    let stats = AccountRegistry::new(&config.storage.registry_path).statistics()?;
    let summary = AuditTrail::new(&config.storage.audit_log_path).summary()?;

    if format == OutputFormat::Json {
        let report = json!({ "registry": stats, "audit": summary });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "=== Rent Reclaim Statistics ===".cyan().bold());
    println!("\nRegistry:");
    println!("  Tracked:      {}", stats.total_count.to_string().green());
    println!("  Rent locked:  {}", utils::format_sol(stats.total_rent_locked));
    println!("  Indexed:      {}", stats.total_indexed);
    println!("  Last slot:    {}", stats.last_indexed_slot);
    if let Some(at) = &stats.last_indexed_at {
        println!("  Last index:   {}", utils::format_timestamp(at));
    }

    if !stats.counts_by_owner.is_empty() {
        println!("\n{}", "By Owner Program:".yellow());
        utils::print_table_border(60);
        utils::print_table_row(&["Program", "Accounts"], &[46, 10]);
        utils::print_table_border(60);
        for (owner, count) in &stats.counts_by_owner {
            utils::print_table_row(&[owner, &count.to_string()], &[46, 10]);
        }
        utils::print_table_border(60);
    }

    println!("\nAudit Trail:");
    println!("  Entries:      {}", summary.total_entries);
    println!("  Confirmed:    {}", summary.count(AuditAction::ReclaimConfirmed).to_string().cyan());
    println!("  Failed:       {}", summary.count(AuditAction::ReclaimFailed).to_string().red());
    println!("  Reclaimed:    {}", utils::format_sol(summary.total_reclaimed));
    Ok(())
}

fn initialize(config: &Config) -> error::Result<()> {
    println!("{}", "Initializing Rent Reclaim Bot...".green());

    let registry = AccountRegistry::new(&config.storage.registry_path);
    if registry.path().exists() {
        println!("{}", format!("✓ Registry present at {}", registry.path().display()).green());
    } else {
        registry.import(Vec::new())?;
        println!("{}", format!("✓ Registry created at {}", registry.path().display()).green());
    }

    let audit = AuditTrail::new(&config.storage.audit_log_path);
    if !audit.path().exists() {
        rent_reclaim::storage::json_file::write_atomic(audit.path(), &Vec::<serde_json::Value>::new())?;
    }
    println!("{}", format!("✓ Audit log at {}", audit.path().display()).green());
    println!("{}", "✓ Configuration loaded".green());

    println!("\n{}", "Configuration:".cyan());
    for endpoint in &config.solana.endpoints {
        println!("  Endpoint:       {} (weight {})", endpoint.display_name(), endpoint.weight);
    }
    println!("  Commitment:     {}", config.solana.commitment);
    println!("  Treasury:       {}", config.operator.treasury_wallet);
    println!("  Dry Run:        {}", config.reclaim.dry_run);
    println!("  Min Inactive:   {} slots", config.reclaim.min_inactivity_slots);
    println!("  Max Retries:    {}", config.reclaim.max_retries);

    println!("\n{}", "Ready to use! Try running:".cyan());
    println!("  {} to track accounts", "rent-reclaim index --scan".yellow());
    println!("  {} to review decisions", "rent-reclaim analyze --verbose".yellow());
    println!("  {} to simulate a run", "rent-reclaim reclaim --dry-run".yellow());
    Ok(())
}
