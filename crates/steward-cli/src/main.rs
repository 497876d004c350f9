//! steward - change-proposal workflow engine CLI
//!
//! Drives the steward engine from the command line: analysis runs,
//! review/apply/rollback, idempotent ask/links/publish operations and
//! policy introspection. Folder profiles are loaded from JSON fixture
//! files; the engine never scans disk itself.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// steward - change-proposal workflow engine
#[derive(Parser, Debug)]
#[command(name = "steward")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the engine configuration file
    #[arg(short, long, default_value = "steward.toml")]
    config: PathBuf,

    /// Path to a JSON file mapping folder paths to profiles
    #[arg(long)]
    profiles: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    // === Analysis runs ===
    /// Analyze one folder and create a run
    Analyze {
        /// Folder path (must appear in the profiles file)
        folder: String,
    },

    /// Analyze several folders as one batch with a parent run
    AnalyzeBatch {
        /// Folder paths (each must appear in the profiles file)
        folders: Vec<String>,
    },

    /// List runs
    #[command(alias = "ls")]
    Runs {
        /// Keep only runs in this state
        #[arg(long)]
        state: Option<String>,
    },

    /// Show one run
    Show {
        /// Run id
        run_id: String,
    },

    /// List a run's proposals
    Proposals {
        /// Run id
        run_id: String,
        /// Filter by risk tier (low, medium, high)
        #[arg(long)]
        risk_tier: Option<String>,
        /// Filter by action mode (auto, suggest, manual)
        #[arg(long)]
        action_mode: Option<String>,
        /// Filter by status (pending, approved, applied)
        #[arg(long)]
        status: Option<String>,
    },

    /// Approve a run's matching proposals
    Approve {
        /// Run id
        run_id: String,
        /// Restrict to these change types (comma-separated)
        #[arg(long, value_delimiter = ',')]
        change_types: Option<Vec<String>>,
    },

    /// Apply a run's matching proposals and record a snapshot
    Apply {
        /// Run id
        run_id: String,
        /// Restrict to these change types (comma-separated)
        #[arg(long, value_delimiter = ',')]
        change_types: Option<Vec<String>>,
    },

    /// Roll a run back to its latest snapshot
    Rollback {
        /// Run id
        run_id: String,
        /// Snapshot id (defaults to the run's last applied snapshot)
        #[arg(long)]
        snapshot_id: Option<String>,
    },

    // === Ask ===
    /// Ask a question against the vault
    Ask {
        /// The question
        query: String,
        /// Idempotency key
        #[arg(long)]
        event_id: Option<String>,
        /// Confidence reported by the local attempt
        #[arg(long, default_value_t = 0.85)]
        local_confidence: f64,
        /// Simulate a local timeout
        #[arg(long)]
        timed_out: bool,
        /// Simulate a grounding failure
        #[arg(long)]
        grounding_failed: bool,
        /// Disallow cloud fallback
        #[arg(long)]
        no_fallback: bool,
        /// Note path evaluated by the sensitivity gate
        #[arg(long, default_value = "")]
        path: String,
        /// Note content evaluated by the sensitivity gate
        #[arg(long, default_value = "")]
        content: String,
    },

    // === Policy introspection ===
    /// Show the sensitivity policy
    SensitivityPolicy,

    /// Check material against the sensitivity gate
    SensitivityCheck {
        /// Note path
        #[arg(long, default_value = "")]
        path: String,
        /// Note content
        #[arg(long, default_value = "")]
        content: String,
        /// Note tags (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },

    /// Show the routing policy under the current budget
    RoutingPolicy,

    // === Publish pipeline ===
    /// Publish pipeline operations
    #[command(subcommand)]
    Publish(commands::PublishCommands),

    // === Metrics ===
    /// Print engine metrics in Prometheus text format
    Metrics,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let engine = commands::build_engine(&cli.config, cli.profiles.as_deref())
        .context("failed to initialize engine")?;

    match cli.command {
        Commands::Analyze { folder } => commands::analyze(&engine, &folder),
        Commands::AnalyzeBatch { folders } => commands::analyze_batch(&engine, folders),
        Commands::Runs { state } => commands::list_runs(&engine, state.as_deref()),
        Commands::Show { run_id } => commands::show_run(&engine, &run_id),
        Commands::Proposals {
            run_id,
            risk_tier,
            action_mode,
            status,
        } => commands::list_proposals(
            &engine,
            &run_id,
            risk_tier.as_deref(),
            action_mode.as_deref(),
            status.as_deref(),
        ),
        Commands::Approve {
            run_id,
            change_types,
        } => commands::approve(&engine, &run_id, change_types),
        Commands::Apply {
            run_id,
            change_types,
        } => commands::apply(&engine, &run_id, change_types),
        Commands::Rollback {
            run_id,
            snapshot_id,
        } => commands::rollback(&engine, &run_id, snapshot_id),
        Commands::Ask {
            query,
            event_id,
            local_confidence,
            timed_out,
            grounding_failed,
            no_fallback,
            path,
            content,
        } => commands::ask(
            &engine,
            commands::AskArgs {
                query,
                event_id,
                local_confidence,
                timed_out,
                grounding_failed,
                no_fallback,
                path,
                content,
            },
        ),
        Commands::SensitivityPolicy => commands::sensitivity_policy(&engine),
        Commands::SensitivityCheck {
            path,
            content,
            tags,
        } => commands::sensitivity_check(&engine, &path, &content, tags.unwrap_or_default()),
        Commands::RoutingPolicy => commands::routing_policy(&engine),
        Commands::Publish(command) => commands::publish(&engine, command),
        Commands::Metrics => commands::metrics(&engine),
    }
}
