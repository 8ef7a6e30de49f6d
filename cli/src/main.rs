//! Option pool operator binary.
//!
//! ```text
//! optionpool sweep                        expire one batch of stale grants
//! optionpool plan <PLAN_ID>               plan with live pool totals (JSON)
//! optionpool vesting <GRANT_ID> [--schedule]
//! ```
//!
//! `sweep` is the entry point an external scheduler runs once a day.
//! Results go to stdout as JSON; logs go to `~/.optionpool/logs`.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use optionpool_config::{OptionPoolConfig, data_dir};
use optionpool_engine::{EngineError, EngineResult, EngineSettings, OptionPool};
use optionpool_store::PoolStore;
use optionpool_types::{GrantId, PlanId};

#[derive(Parser)]
#[command(name = "optionpool")]
#[command(about = "Option plan pool, vesting and exercise back office", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Database file (overrides the config file)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Expire ACTIVE grants past their expiration date and print the count
    Sweep,

    /// Print a plan with totals derived from its live grants
    Plan {
        /// Plan ID (UUID)
        plan_id: PlanId,
    },

    /// Print a grant's vesting as of now
    Vesting {
        /// Grant ID (UUID)
        grant_id: GrantId,

        /// Print the full vesting schedule instead of a snapshot
        #[arg(long)]
        schedule: bool,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // stdout carries command output, so logs fall back to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.optionpool/logs/optionpool.log
    if let Some(dir) = data_dir() {
        candidates.push(dir.join("logs").join("optionpool.log"));
    }

    // Fallback: ./.optionpool/logs/optionpool.log
    candidates.push(PathBuf::from(".optionpool").join("logs").join("optionpool.log"));

    candidates
}

fn print_json(value: &impl Serialize) -> EngineResult<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn open_pool(cli: &Cli) -> EngineResult<OptionPool> {
    let config = OptionPoolConfig::load()
        .map_err(anyhow::Error::from)?
        .unwrap_or_default();
    let path = cli
        .database
        .clone()
        .or_else(|| config.database_path())
        .ok_or_else(|| anyhow!("No database path configured and no home directory found"))?;
    let store = PoolStore::open(&path, config.busy_timeout())?;
    let settings = EngineSettings {
        sweep_batch_size: config.sweep_batch_size(),
        reference_attempts: config.reference_attempts(),
        default_exercise_window_days: config.default_exercise_window_days(),
    };
    Ok(OptionPool::new(Arc::new(store), settings))
}

fn run(cli: &Cli) -> EngineResult<()> {
    let pool = open_pool(cli)?;
    match cli.command {
        Command::Sweep => {
            let expired = pool.expire_stale_grants()?;
            print_json(&serde_json::json!({ "expired": expired }))
        }
        Command::Plan { plan_id } => print_json(&pool.find_plan(plan_id)?),
        Command::Vesting { grant_id, schedule } => {
            if schedule {
                print_json(&pool.vesting_schedule(grant_id)?)
            } else {
                print_json(&pool.find_grant(grant_id)?.vesting)
            }
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(EngineError::Domain(err)) => {
            tracing::info!(code = err.code(), "Command rejected: {err}");
            match serde_json::to_string_pretty(&err.to_body()) {
                Ok(body) => println!("{body}"),
                Err(_) => eprintln!("Error: {err}"),
            }
            ExitCode::from(2)
        }
        Err(EngineError::Storage(err)) => {
            tracing::error!("Command failed: {err:#}");
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
