//! Command handlers: translate CLI arguments into typed engine
//! requests and print JSON responses.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use serde::Serialize;
use steward_core::config::EngineConfig;
use steward_core::coordinator::requests::{
    AnalyzeFolderRequest, AnalyzeFoldersRequest, ApplyRunRequest, ApproveRunRequest, AskRequest,
    ConfirmPublishRequest, ExportForPublishRequest, MarkForPublishRequest, ProposalFilter,
    PublishPrepareRequest, PublishScoreRequest, RollbackRunRequest, RunFilter,
};
use steward_core::coordinator::WorkflowEngine;
use steward_core::policy::sensitivity::SensitivityInput;
use steward_core::profile::{FolderProfile, StaticProfiler};
use steward_core::publish::ExportFormat;
use steward_core::run::RunId;

/// Publish pipeline subcommands.
#[derive(Subcommand, Debug)]
pub enum PublishCommands {
    /// Score a draft against the publish gate
    Score {
        /// Draft id
        draft_id: String,
        /// Draft content
        content: String,
    },

    /// Normalize a draft for publishing
    Prepare {
        /// Draft id
        draft_id: String,
        /// Draft content
        content: String,
        /// Publish target
        #[arg(long, default_value = "local")]
        target: String,
    },

    /// Queue a prepared draft for publishing
    Mark {
        /// Draft id
        draft_id: String,
        /// Draft title
        title: String,
        /// Prepared content
        content: String,
        /// Idempotency key
        #[arg(long)]
        event_id: Option<String>,
    },

    /// List the publish queue
    Queue,

    /// Export a queued draft
    Export {
        /// Draft id
        draft_id: String,
        /// Export format (markdown, html, json)
        #[arg(long, default_value = "markdown")]
        format: String,
        /// Idempotency key
        #[arg(long)]
        event_id: Option<String>,
    },

    /// Confirm a draft as published
    Confirm {
        /// Draft id
        draft_id: String,
        /// Published URL
        url: String,
        /// Idempotency key
        #[arg(long)]
        event_id: Option<String>,
    },

    /// List published drafts
    Published,
}

/// Arguments for the `ask` command.
pub struct AskArgs {
    /// The question.
    pub query: String,
    /// Idempotency key.
    pub event_id: Option<String>,
    /// Confidence reported by the local attempt.
    pub local_confidence: f64,
    /// Simulate a local timeout.
    pub timed_out: bool,
    /// Simulate a grounding failure.
    pub grounding_failed: bool,
    /// Disallow cloud fallback.
    pub no_fallback: bool,
    /// Note path for the sensitivity gate.
    pub path: String,
    /// Note content for the sensitivity gate.
    pub content: String,
}

/// Builds the engine from configuration and an optional profile
/// fixture file.
pub fn build_engine(config_path: &Path, profiles: Option<&Path>) -> Result<WorkflowEngine> {
    let config = if config_path.exists() {
        EngineConfig::from_file(config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        tracing::debug!(
            config = %config_path.display(),
            "no configuration file; using defaults"
        );
        EngineConfig::default()
    };

    let mut builder = WorkflowEngine::builder().config(config);
    if let Some(path) = profiles {
        builder = builder.profiler(load_profiles(path)?);
    }
    Ok(builder.build()?)
}

fn load_profiles(path: &Path) -> Result<StaticProfiler> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profiles from {}", path.display()))?;
    let profiles: BTreeMap<String, FolderProfile> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid profile fixture in {}", path.display()))?;

    let mut profiler = StaticProfiler::new();
    for (folder, profile) in profiles {
        profiler = profiler.with_profile(folder, profile);
    }
    Ok(profiler)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_enum<T: serde::de::DeserializeOwned>(what: &str, value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .with_context(|| format!("invalid {what}: {value}"))
}

fn parse_change_types(
    values: Option<Vec<String>>,
) -> Result<Option<Vec<steward_core::run::ChangeType>>> {
    values
        .map(|values| {
            values
                .iter()
                .map(|value| parse_enum("change type", value))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()
}

pub fn analyze(engine: &WorkflowEngine, folder: &str) -> Result<()> {
    let run = engine.analyze_folder(&AnalyzeFolderRequest {
        folder_path: folder.to_string(),
    })?;
    print_json(&run)
}

pub fn analyze_batch(engine: &WorkflowEngine, folders: Vec<String>) -> Result<()> {
    let run = engine.analyze_folders(&AnalyzeFoldersRequest {
        folder_paths: folders,
    })?;
    print_json(&run)
}

pub fn list_runs(engine: &WorkflowEngine, state: Option<&str>) -> Result<()> {
    let filter = RunFilter {
        state: state.map(|value| parse_enum("run state", value)).transpose()?,
    };
    print_json(&engine.list_runs(&filter))
}

pub fn show_run(engine: &WorkflowEngine, run_id: &str) -> Result<()> {
    let run = engine.get_run(&RunId::from(run_id))?;
    print_json(&run)
}

pub fn list_proposals(
    engine: &WorkflowEngine,
    run_id: &str,
    risk_tier: Option<&str>,
    action_mode: Option<&str>,
    status: Option<&str>,
) -> Result<()> {
    let filter = ProposalFilter {
        risk_tier: risk_tier
            .map(|value| parse_enum("risk tier", value))
            .transpose()?,
        action_mode: action_mode
            .map(|value| parse_enum("action mode", value))
            .transpose()?,
        status: status
            .map(|value| parse_enum("proposal status", value))
            .transpose()?,
    };
    print_json(&engine.get_run_proposals(&RunId::from(run_id), &filter)?)
}

pub fn approve(
    engine: &WorkflowEngine,
    run_id: &str,
    change_types: Option<Vec<String>>,
) -> Result<()> {
    let request = ApproveRunRequest {
        change_types: parse_change_types(change_types)?,
    };
    print_json(&engine.approve_run(&RunId::from(run_id), &request)?)
}

pub fn apply(
    engine: &WorkflowEngine,
    run_id: &str,
    change_types: Option<Vec<String>>,
) -> Result<()> {
    let request = ApplyRunRequest {
        change_types: parse_change_types(change_types)?,
    };
    print_json(&engine.apply_run(&RunId::from(run_id), &request)?)
}

pub fn rollback(engine: &WorkflowEngine, run_id: &str, snapshot_id: Option<String>) -> Result<()> {
    let request = RollbackRunRequest { snapshot_id };
    print_json(&engine.rollback_run(&RunId::from(run_id), &request)?)
}

pub fn ask(engine: &WorkflowEngine, args: AskArgs) -> Result<()> {
    let request = AskRequest {
        query: args.query,
        event_id: args.event_id,
        allow_fallback: !args.no_fallback,
        local_confidence: args.local_confidence,
        local_timed_out: args.timed_out,
        grounding_failed: args.grounding_failed,
        sensitivity: SensitivityInput {
            path: args.path,
            content: args.content,
            ..SensitivityInput::default()
        },
    };
    print_json(&engine.ask(&request)?)
}

pub fn sensitivity_policy(engine: &WorkflowEngine) -> Result<()> {
    print_json(&engine.sensitivity_policy())
}

pub fn sensitivity_check(
    engine: &WorkflowEngine,
    path: &str,
    content: &str,
    tags: Vec<String>,
) -> Result<()> {
    let input = SensitivityInput {
        tags,
        path: path.to_string(),
        content: content.to_string(),
        ..SensitivityInput::default()
    };
    print_json(&engine.check_sensitivity(&input))
}

pub fn routing_policy(engine: &WorkflowEngine) -> Result<()> {
    print_json(&engine.routing_policy()?)
}

pub fn publish(engine: &WorkflowEngine, command: PublishCommands) -> Result<()> {
    match command {
        PublishCommands::Score { draft_id, content } => {
            print_json(&engine.publish_score(&PublishScoreRequest { draft_id, content })?)
        },
        PublishCommands::Prepare {
            draft_id,
            content,
            target,
        } => print_json(&engine.publish_prepare(&PublishPrepareRequest {
            draft_id,
            content,
            target,
        })?),
        PublishCommands::Mark {
            draft_id,
            title,
            content,
            event_id,
        } => print_json(&engine.mark_for_publish(&MarkForPublishRequest {
            event_id,
            draft_id,
            title,
            prepared_content: content,
        })?),
        PublishCommands::Queue => print_json(&engine.list_publish_queue()),
        PublishCommands::Export {
            draft_id,
            format,
            event_id,
        } => {
            let Some(format) = ExportFormat::parse(&format) else {
                bail!("format must be one of: markdown, html, json");
            };
            print_json(&engine.export_for_publish(&ExportForPublishRequest {
                event_id,
                draft_id,
                format,
            })?)
        },
        PublishCommands::Confirm {
            draft_id,
            url,
            event_id,
        } => print_json(&engine.confirm_publish(&ConfirmPublishRequest {
            event_id,
            draft_id,
            published_url: url,
        })?),
        PublishCommands::Published => print_json(&engine.list_published()),
    }
}

pub fn metrics(engine: &WorkflowEngine) -> Result<()> {
    print!("{}", engine.metrics().render());
    Ok(())
}
