//! Graphsync CLI - keep a temporal knowledge graph in step with your documents

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use graphsync_core::commands::document::{self, IngestStatus};
use graphsync_core::commands::{SyncContext, sync};
use graphsync_core::config::Config;
use graphsync_core::storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "graphsync")]
#[command(author, version, about = "Keep a temporal knowledge graph in step with your documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest text files and schedule their graph sync
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Document ID (single file only; defaults to the file stem)
        #[arg(long)]
        id: Option<String>,
        /// Domain timestamp, RFC 3339 (defaults to the file's mtime)
        #[arg(long)]
        modified_at: Option<DateTime<Utc>>,
    },

    /// Retry documents whose graph sync failed
    Reconcile {
        /// Maximum documents per pass
        #[arg(short, long)]
        limit: Option<usize>,
        /// Keep reconciling on an interval until interrupted
        #[arg(short, long)]
        watch: bool,
        /// Seconds between passes in watch mode (defaults to config)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },

    /// Re-sync one document now, ignoring the retry limit
    Resync { document_id: String },

    /// Show graph sync status
    Status {
        /// Show a single document
        document_id: Option<String>,
    },

    /// List a document's episodes
    Episodes {
        document_id: String,
        /// Include invalidated episodes
        #[arg(short, long)]
        all: bool,
    },

    /// Show a document's sync audit log
    Log { document_id: String },

    /// Delete a document and retire its episodes
    Delete { document_id: String },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("graphsync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Config { action } => cmd_config(action, quiet),
        Commands::Doctor => cmd_doctor(quiet).await,
        command => {
            let config = Config::load()?;
            let db = Database::open(config.database_path()?).await?;
            let ctx = SyncContext::from_config(&db, &config);

            let result = run(&ctx, &config, command, format, quiet).await;

            // Deferred syncs must finish before the pool closes
            ctx.wait_idle().await;
            db.close().await;
            result
        }
    }
}

async fn run(
    ctx: &SyncContext,
    config: &Config,
    command: Commands,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Ingest {
            files,
            id,
            modified_at,
        } => cmd_ingest(ctx, files, id, modified_at, format, quiet).await,

        Commands::Reconcile {
            limit,
            watch,
            interval,
        } => {
            if watch {
                let interval = interval
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| config.sync.reconcile_interval());
                cmd_reconcile_watch(ctx, interval, limit, quiet).await
            } else {
                cmd_reconcile(ctx, limit, format, quiet).await
            }
        }

        Commands::Resync { document_id } => cmd_resync(ctx, &document_id, format, quiet).await,

        Commands::Status { document_id } => cmd_status(ctx, document_id.as_deref(), format).await,

        Commands::Episodes { document_id, all } => {
            cmd_episodes(ctx, &document_id, all, format).await
        }

        Commands::Log { document_id } => cmd_log(ctx, &document_id, format).await,

        Commands::Delete { document_id } => cmd_delete(ctx, &document_id, format, quiet).await,

        Commands::Config { .. } | Commands::Doctor => Ok(()),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ingest(
    ctx: &SyncContext,
    files: Vec<PathBuf>,
    id: Option<String>,
    modified_at: Option<DateTime<Utc>>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    if id.is_some() && files.len() > 1 {
        anyhow::bail!("--id can only be used with a single file");
    }

    let mut reports = Vec::with_capacity(files.len());
    for path in &files {
        let report = document::ingest_file(ctx, path, id.as_deref(), modified_at).await?;

        if format == OutputFormat::Text && !quiet {
            match &report.status {
                IngestStatus::Unchanged => {
                    println!("{}: unchanged", report.document_id);
                }
                IngestStatus::Committed {
                    added,
                    modified,
                    removed,
                } => {
                    println!(
                        "{}: committed {} segments (+{} ~{} -{}), graph sync scheduled",
                        report.document_id, report.segments, added, modified, removed
                    );
                }
            }
        }
        reports.push(report);
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    Ok(())
}

async fn cmd_reconcile(
    ctx: &SyncContext,
    limit: Option<usize>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let report = sync::reconcile(ctx, limit).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text if quiet => {}
        OutputFormat::Text => {
            if report.scanned == 0 && report.over_limit_documents.is_empty() {
                println!("All documents in sync.");
                return Ok(());
            }
            println!("Scanned:    {}", report.scanned);
            println!("Retried:    {}", report.retried);
            println!("Succeeded:  {}", report.succeeded);
            println!("Failing:    {}", report.still_failing);
            if report.deferred > 0 {
                println!("Deferred:   {}", report.deferred);
            }
            if report.skipped_busy > 0 {
                println!("Busy:       {}", report.skipped_busy);
            }
            if report.aborted > 0 {
                println!("Deleted:    {}", report.aborted);
            }
            if !report.over_limit_documents.is_empty() {
                println!(
                    "Over retry limit (use `graphsync resync <id>`): {}",
                    report.over_limit_documents.join(", ")
                );
            }
        }
    }
    Ok(())
}

async fn cmd_reconcile_watch(
    ctx: &SyncContext,
    interval: Duration,
    limit: Option<usize>,
    quiet: bool,
) -> anyhow::Result<()> {
    if !quiet {
        println!(
            "Reconciling every {}s, press Ctrl-C to stop.",
            interval.as_secs()
        );
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, stopping reconciliation"),
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
        on_signal.cancel();
    });

    sync::reconcile_periodically(ctx, interval, limit, cancel).await?;
    Ok(())
}

async fn cmd_resync(
    ctx: &SyncContext,
    document_id: &str,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let outcome = sync::resync(ctx, document_id).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text if quiet => {}
        OutputFormat::Text => println!("{}: {}", document_id, outcome),
    }
    Ok(())
}

async fn cmd_status(
    ctx: &SyncContext,
    document_id: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let rows = match document_id {
        Some(id) => vec![sync::document_status(ctx, id).await?],
        None => sync::status(ctx).await?,
    };

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No documents ingested yet.");
        return Ok(());
    }

    println!(
        "{:<32} {:<10} {:>8} {:>6}  MODIFIED",
        "DOCUMENT", "STATE", "ATTEMPTS", "LIVE"
    );
    for row in rows {
        let state = if row.graph_synced {
            "synced"
        } else if row.over_limit {
            "stuck"
        } else {
            "pending"
        };
        println!(
            "{:<32} {:<10} {:>8} {:>6}  {}",
            row.document_id,
            state,
            row.graph_sync_attempts,
            row.live_episodes,
            row.modified_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn cmd_episodes(
    ctx: &SyncContext,
    document_id: &str,
    all: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let episodes = sync::episodes(ctx, document_id, all).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&episodes)?);
        return Ok(());
    }

    if episodes.is_empty() {
        println!("No episodes for '{}'.", document_id);
        return Ok(());
    }

    for episode in episodes {
        let state = match episode.invalidated_at {
            Some(at) => format!("invalidated {}", at.to_rfc3339()),
            None => "live".to_string(),
        };
        println!(
            "{:<24} valid {}  [{}]  {} entities, {} relationships",
            episode.source_ref.segment_key,
            episode.valid_time.to_rfc3339(),
            state,
            episode.entities.len(),
            episode.relationships.len()
        );
    }
    Ok(())
}

async fn cmd_log(ctx: &SyncContext, document_id: &str, format: OutputFormat) -> anyhow::Result<()> {
    let entries = sync::log(ctx, document_id).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No log entries for '{}'.", document_id);
        return Ok(());
    }

    for entry in entries {
        let detail = entry
            .details
            .get("reason")
            .and_then(|v| v.as_str())
            .map(|reason| format!("  {}", reason))
            .unwrap_or_default();
        println!(
            "{}  {:<22}{}",
            entry.created_at.to_rfc3339(),
            entry.action,
            detail
        );
    }
    Ok(())
}

async fn cmd_delete(
    ctx: &SyncContext,
    document_id: &str,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let outcome = document::delete(ctx, document_id).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text if quiet => {}
        OutputFormat::Text => match outcome {
            Some(outcome) => println!("Deleted '{}': {}", document_id, outcome),
            None => println!("Document '{}' not found.", document_id),
        },
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Graphsync Health Check");
        println!("======================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            config
        }
        Err(e) => {
            println!("[!!] Configuration: Error - {}", e);
            return Ok(());
        }
    };

    match config.llm.resolved_api_key() {
        Ok(Some(_)) => {
            if !quiet {
                let redacted = config.llm.redacted_api_key()?.unwrap_or_default();
                println!("[OK] API Key: Configured ({})", redacted);
            }
        }
        Ok(None) => {
            all_ok = false;
            if !quiet {
                println!("[!!] API Key: Not configured, graph syncs will fail");
                println!("     Set GRAPHSYNC_API_KEY or OPENAI_API_KEY environment variable");
            }
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] API Key: Error - {}", e);
            }
        }
    }

    if !quiet {
        match Config::config_path() {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
    }

    let db = match config.database_path() {
        Ok(path) => Database::open(path).await,
        Err(e) => Err(e),
    };
    match db {
        Ok(db) => {
            match db.health_check().await {
                Ok(()) => {
                    if !quiet {
                        if let Some(path) = db.path() {
                            println!("[OK] Database: {}", path.display());
                        }
                        match db.migration_status().await {
                            Ok(status) => println!("[OK] Database: Schema v{}", status.current_version),
                            Err(e) => println!("[!!] Database: Migration check failed - {}", e),
                        }
                    }

                    let ctx = SyncContext::from_config(&db, &config);
                    let rows = sync::status(&ctx).await.unwrap_or_default();
                    let pending = rows.iter().filter(|r| !r.graph_synced).count();
                    let stuck = rows.iter().filter(|r| r.over_limit).count();
                    if stuck > 0 {
                        all_ok = false;
                    }
                    if !quiet {
                        println!(
                            "     Documents: {} ({} pending, {} over retry limit)",
                            rows.len(),
                            pending,
                            stuck
                        );
                    }
                }
                Err(e) => {
                    all_ok = false;
                    println!("[!!] Database: Health check failed - {}", e);
                }
            }
            db.close().await;
        }
        Err(e) => {
            all_ok = false;
            println!("[!!] Database: Failed to open - {}", e);
        }
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    Ok(())
}

#[cfg(test)]
mod main_tests;
