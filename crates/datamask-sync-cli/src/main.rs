//! datamask-sync CLI - masked production to QA database refresh.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use datamask_sync::config::validate_sample_percent;
use datamask_sync::{restore_backup, Config, EnvSecrets, RunReport, SyncEngine, SyncError};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Exit code when the run finished but at least one table failed.
const EXIT_PARTIAL: u8 = 6;

#[derive(Parser)]
#[command(name = "datamask-sync")]
#[command(about = "Refresh a QA PostgreSQL database from production with masked columns")]
#[command(version)]
#[command(after_help = "Exit codes: 0 success, 1 error, 2 configuration, \
    3 environment mismatch, 4 backup decryption, 5 database, 6 some tables failed")]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize active tables (or one table) from source to target
    Run {
        /// Only synchronize this table, even if it is inactive
        #[arg(long)]
        table: Option<String>,

        /// Override every table's sample percentage (0 < pct <= 100)
        #[arg(long, value_parser = parse_sample)]
        sample: Option<f64>,
    },

    /// Write an encrypted backup of every configured source table
    Backup,

    /// Decrypt a backup file back to its SQL script
    Restore {
        /// Backup file (backup_YYYYMMDD_HHMMSS.sql.enc)
        file: PathBuf,

        /// Write the script to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the most recent audit entries
    History {
        /// Number of entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

fn parse_sample(s: &str) -> Result<f64, String> {
    let pct: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    validate_sample_percent(pct)?;
    Ok(pct)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(SyncError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    let secrets = Arc::new(EnvSecrets);

    match cli.command {
        Commands::Run { table, sample } => {
            let engine = SyncEngine::connect(config, secrets).await?;
            let report = engine.run(table.as_deref(), sample).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if report.is_success() {
                return Ok(ExitCode::SUCCESS);
            }
            return Ok(ExitCode::from(EXIT_PARTIAL));
        }

        Commands::Backup => {
            let engine = SyncEngine::connect(config, secrets).await?;
            let path = engine.create_backup().await?;
            if cli.output_json {
                println!("{}", serde_json::json!({ "path": path }));
            } else {
                println!("Backup written to {}", path.display());
            }
        }

        Commands::Restore { file, output } => {
            let script = restore_backup(&config, secrets.as_ref(), &file)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &script)?;
                    println!("Restored script written to {}", path.display());
                }
                None => print!("{}", script),
            }
        }

        Commands::History { limit } => {
            let engine = SyncEngine::connect(config, secrets).await?;
            let history = engine.get_audit_history(limit).await?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else if history.is_empty() {
                println!("No audit entries yet.");
            } else {
                for entry in &history {
                    println!(
                        "{}  {:<24} {:<11} {:<7} migrated={:<8} failed={:<6} {}",
                        entry.ended_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.table,
                        entry.operation_mode.as_str(),
                        entry.status.as_str(),
                        entry.records_migrated,
                        entry.records_failed,
                        entry.message
                    );
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &RunReport) {
    let status_msg = if report.is_success() {
        "Synchronization completed!"
    } else if report.is_partial() {
        "Synchronization completed with errors."
    } else {
        "Synchronization failed."
    };
    println!("\n{}", status_msg);
    println!("  Execution ID: {}", report.execution_id);
    println!(
        "  Tables: {}/{}",
        report.succeeded().count(),
        report.results.len()
    );
    println!("  Rows: {}", report.records_migrated());
    for result in &report.results {
        println!(
            "  {:<7} {} ({}, {} of {} rows, {} attempt(s), {:.2}s){}",
            result.status.as_str(),
            result.table,
            result.operation_mode.as_str(),
            result.records_migrated,
            result.total_extracted,
            result.attempts,
            result.duration_seconds(),
            if result.is_success() {
                String::new()
            } else {
                format!(": {}", result.message)
            }
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("invalid verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("invalid log format '{}'", other)),
    }

    Ok(())
}
