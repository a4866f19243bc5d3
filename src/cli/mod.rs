//! Command-line interface for gantry.
//!
//! Provides a replay harness for feeding recorded event streams through
//! the engine, a single-event submit for shape checking, and inspection
//! of the effective policy table and resolved configuration.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::LoggingExecutor;
use crate::config::CoordinatorConfig;
use crate::core::Scheduler;
use crate::domain::{EventClass, RawEvent, RunState};

/// gantry - CI trigger-coordination engine
#[derive(Parser, Debug)]
#[command(name = "gantry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (overrides discovery)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a JSONL stream of raw events through the engine
    Replay {
        /// File with one raw event JSON object per line
        file: PathBuf,
    },

    /// Submit a single raw event (from a file or stdin) and print the decision
    Submit {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Print the effective per-class policy table
    Policy,

    /// Show resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => CoordinatorConfig::from_file(path)?,
            None => CoordinatorConfig::load()?,
        };

        match self.command {
            Commands::Replay { file } => replay(config, &file).await,
            Commands::Submit { input } => submit_one(config, input).await,
            Commands::Policy => show_policy(&config),
            Commands::Config => show_config(&config),
        }
    }
}

/// Replay a recorded event stream and print every decision.
async fn replay(config: CoordinatorConfig, file: &PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read event file: {}", file.display()))?;

    let scheduler = Scheduler::new(config, Arc::new(LoggingExecutor));
    let mut admitted = 0usize;
    let mut canceled = 0usize;
    let mut rejected = 0usize;

    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let raw: RawEvent = serde_json::from_str(line)
            .with_context(|| format!("Invalid raw event on line {}", lineno + 1))?;

        match scheduler.submit(&raw).await {
            Ok(outcome) => {
                admitted += 1;
                canceled += outcome.canceled.len();
                println!(
                    "admit  {}  {}  supersedes {}",
                    outcome.admitted.id,
                    outcome.admitted.group_key,
                    outcome.canceled.len()
                );
            }
            Err(err) => {
                rejected += 1;
                eprintln!("reject line {}: {}", lineno + 1, err);
            }
        }
    }

    println!("\n{:<40} {:<10} {:<10}", "GROUP", "STATE", "CREATED");
    println!("{}", "-".repeat(62));
    for (key, runs) in scheduler.registry().snapshot().await {
        for run in runs {
            let state = match &run.state {
                RunState::Queued => "queued",
                RunState::Running => "running",
                RunState::Canceled => "canceled",
                RunState::Completed => "completed",
                RunState::Failed { .. } => "failed",
            };
            println!("{:<40} {:<10} {:<10}", key.to_string(), state, run.created_at);
        }
    }

    eprintln!(
        "\n[{} admitted, {} superseded, {} rejected]",
        admitted, canceled, rejected
    );
    Ok(())
}

/// Submit one raw event and print the admission decision as JSON.
async fn submit_one(config: CoordinatorConfig, input: Option<PathBuf>) -> Result<()> {
    let content = if let Some(path) = input {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    };

    if content.trim().is_empty() {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    }

    let raw: RawEvent = serde_json::from_str(&content).context("Invalid raw event JSON")?;
    let scheduler = Scheduler::new(config, Arc::new(LoggingExecutor));
    let outcome = scheduler.submit(&raw).await?;

    println!("{}", serde_json::to_string_pretty(&outcome.admitted)?);
    Ok(())
}

/// Print the effective discriminant/cancellation policy for every class.
fn show_policy(config: &CoordinatorConfig) -> Result<()> {
    const CLASSES: [EventClass; 16] = [
        EventClass::Push,
        EventClass::PullRequestOpened,
        EventClass::PullRequestSynchronize,
        EventClass::PullRequestEdited,
        EventClass::PullRequestEnqueued,
        EventClass::PullRequestDequeued,
        EventClass::PullRequestClosed,
        EventClass::PullRequestTargetOpened,
        EventClass::PullRequestTargetSynchronize,
        EventClass::PullRequestTargetEdited,
        EventClass::PullRequestTargetClosed,
        EventClass::MergeGroupChecksRequested,
        EventClass::BranchCreated,
        EventClass::BranchDeleted,
        EventClass::IssueOpened,
        EventClass::ManualDispatch,
    ];

    println!(
        "{:<34} {:<22} {:<12} {:<10}",
        "CLASS", "DISCRIMINANT", "IN-PROGRESS", "PROTECTED"
    );
    println!("{}", "-".repeat(80));

    for class in CLASSES {
        let policy = config.policy_for(class);
        println!(
            "{:<34} {:<22} {:<12} {:<10}",
            class.to_string(),
            format!("{:?}", policy.discriminant),
            if policy.cancel_in_progress { "cancel" } else { "keep" },
            if class.is_protected() || policy.protected {
                "yes"
            } else {
                "no"
            },
        );
    }

    Ok(())
}

/// Show the resolved configuration.
fn show_config(config: &CoordinatorConfig) -> Result<()> {
    println!("Workflow:             {}", config.workflow);
    println!("Dispatch timeout:     {}s", config.dispatch_timeout_seconds);
    println!("Eviction grace:       {}s", config.eviction_grace_seconds);
    println!("Registry retries:     {}", config.registry_retry_attempts);
    println!(
        "Class overrides:      {}",
        if config.classes.is_empty() {
            "(none - using defaults)".to_string()
        } else {
            config.classes.len().to_string()
        }
    );
    Ok(())
}
