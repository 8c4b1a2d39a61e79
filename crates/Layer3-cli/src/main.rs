//! Waymark CLI - Main entry point

mod cli;
mod hooks;
mod output;

use anyhow::{Context as _, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use cli::{Args, Command, HookEvent};
use waymark_core::{strategy_for, GitOps, InsightsExtractor, InvocationContext, RewindEngine};
use waymark_foundation::{CheckpointId, SessionId, StrategyKind, WaymarkConfig};

fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    // Hard errors print one diagnostic and exit non-zero; soft failures
    // have already warned and continued further down.
    if let Err(e) = run(args) {
        eprintln!("waymark: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Init { strategy } => init_repo(strategy),
        Command::Hook { event } => match event {
            HookEvent::UserPrompt => hooks::user_prompt(),
            HookEvent::TurnEnd => hooks::turn_end(),
            HookEvent::TaskCheckpoint => hooks::task_checkpoint(),
            HookEvent::PrepareCommitMsg { message_file, .. } => {
                hooks::prepare_commit_msg(&message_file)
            }
            HookEvent::PostCommit => hooks::post_commit(),
            HookEvent::SessionEnd => hooks::session_end(),
        },
        Command::Rewind { id } => rewind(&id),
        Command::Points { limit } => points(limit),
        Command::Sessions { limit } => sessions(limit),
        Command::Insights => insights(),
        Command::Cleanup => cleanup(),
        Command::ReviewWorker => hooks::run_review_worker(),
    }
}

/// Open the repository and load config for a read-side command
fn open() -> Result<(Arc<GitOps>, WaymarkConfig)> {
    let git = GitOps::new(std::env::current_dir().context("resolving working directory")?)
        .context("locating the git repository")?;
    let config = WaymarkConfig::load(git.root());
    Ok((Arc::new(git), config))
}

fn init_repo(strategy: Option<String>) -> Result<()> {
    let (git, mut config) = open()?;
    if let Some(name) = strategy {
        config.strategy = match name.as_str() {
            "manual-commit" | "manual" => StrategyKind::ManualCommit,
            "auto-commit" | "auto" => StrategyKind::AutoCommit,
            other => anyhow::bail!("unknown strategy '{}'", other),
        };
        config.save(git.root())?;
    }

    let strategy = strategy_for(config.strategy);
    let ctx = InvocationContext::new(git, config, SessionId::new());
    match strategy.ensure_setup(&ctx) {
        Ok(()) => println!("Waymark ready ({} strategy).", strategy.kind()),
        // Setup problems must not block unrelated steps; report and go on.
        Err(e) => eprintln!("waymark: setup incomplete: {}", e),
    }
    Ok(())
}

fn rewind(id: &str) -> Result<()> {
    let (git, config) = open()?;
    let engine = RewindEngine::new(git, config);
    let report = engine.rewind(&CheckpointId::from_string(id))?;
    println!(
        "Rewound to {}: {} file(s) restored, {} removed.",
        report.target,
        report.restored.len(),
        report.deleted.len()
    );
    Ok(())
}

fn points(limit: usize) -> Result<()> {
    let (git, config) = open()?;
    let engine = RewindEngine::new(git, config);
    output::print_points(&engine.rewind_points(limit)?);
    Ok(())
}

fn sessions(limit: usize) -> Result<()> {
    let (git, _config) = open()?;
    let store = waymark_core::CheckpointStore::new(git);
    let mut sessions = store.list_sessions()?;
    sessions.reverse(); // newest first
    sessions.truncate(limit);
    output::print_sessions(&sessions);
    Ok(())
}

fn insights() -> Result<()> {
    let (git, config) = open()?;
    let store = waymark_core::CheckpointStore::new(git);
    let extractor = InsightsExtractor::new(store, &config);
    output::print_insights(&extractor.collect()?);
    Ok(())
}

/// Drop shadow branches and state files for sessions that have ended
///
/// Deletion is per-branch: a failure is reported and skipped, never a
/// blocker for the remaining sessions.
fn cleanup() -> Result<()> {
    let (git, _config) = open()?;
    let machine = waymark_core::SessionStateMachine::new(git.root());
    let ended: Vec<SessionId> = machine
        .list()
        .into_iter()
        .filter(|id| machine.load(id).phase.is_terminal())
        .collect();

    if ended.is_empty() {
        println!("Nothing to clean up.");
        return Ok(());
    }

    let shadow = waymark_core::ShadowBranchManager::new(git.clone());
    let report = shadow.delete_all(&ended);
    for session_id in &ended {
        if let Err(e) = machine.remove(session_id) {
            eprintln!("waymark: could not remove state for {}: {}", session_id, e);
        }
    }

    println!(
        "Cleaned up {} session(s); {} shadow branch(es) removed.",
        ended.len(),
        report.deleted.len()
    );
    for (branch, error) in &report.failures {
        eprintln!("waymark: could not delete {}: {}", branch, error);
    }
    Ok(())
}
