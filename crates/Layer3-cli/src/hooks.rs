//! Hook dispatch
//!
//! Every agent adapter normalizes its payload into the shared `HookInput`
//! JSON shape and pipes it on stdin; git's own commit hooks arrive with no
//! payload at all. Each invocation builds one `InvocationContext` at this
//! edge and passes it down; nothing below holds process-wide state.

use anyhow::{Context as _, Result};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use waymark_core::{
    strategy_for, GitOps, InvocationContext, Repository, ReviewItem, ReviewQueue, Strategy,
};
use waymark_foundation::{HookInput, SessionId, WaymarkConfig};

/// Parse the adapter payload from stdin; git hooks legitimately send none
pub fn read_hook_input() -> Result<HookInput> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("reading hook input")?;
    if raw.trim().is_empty() {
        return Ok(HookInput::default());
    }
    HookInput::from_json(&raw).context("parsing hook input")
}

/// Build the per-invocation context for the current repository
pub fn build_context(input: &HookInput) -> Result<(InvocationContext, Box<dyn Strategy>)> {
    let git = GitOps::new(std::env::current_dir().context("resolving working directory")?)
        .context("locating the git repository")?;
    let config = WaymarkConfig::load(git.root());
    let git = Arc::new(git.with_author(config.author.clone(), format!("{}@localhost", config.author)));

    let session_id = input.session().unwrap_or_else(|| {
        // Git's own hooks carry no session payload; bind to the newest
        // session that has not ended.
        active_session(&git).unwrap_or_default()
    });

    let strategy = strategy_for(config.strategy);
    let ctx = InvocationContext::new(git, config, session_id).with_agent(input.agent.clone());
    Ok((ctx, strategy))
}

/// Newest session with a non-terminal state file
fn active_session(git: &Arc<GitOps>) -> Option<SessionId> {
    let machine = waymark_core::SessionStateMachine::new(git.root());
    machine
        .list()
        .into_iter()
        .filter(|id| !machine.load(id).phase.is_terminal())
        .max()
}

// ============================================================================
// Hook handlers
// ============================================================================

pub fn user_prompt() -> Result<()> {
    let input = read_hook_input()?;
    let (ctx, strategy) = build_context(&input)?;
    strategy.begin_turn(&ctx, &input)?;
    debug!("Session {} active", ctx.session_id);
    Ok(())
}

pub fn turn_end() -> Result<()> {
    let input = read_hook_input()?;
    let (ctx, strategy) = build_context(&input)?;
    let outcome = strategy.save_changes(&ctx, &input)?;

    if outcome.nothing_persisted() {
        info!("No changes to persist for session {}", ctx.session_id);
    } else if let Some(id) = &outcome.checkpoint {
        info!("Saved checkpoint {}", id);
        schedule_review(&ctx, id.clone());
    }
    Ok(())
}

pub fn task_checkpoint() -> Result<()> {
    let input = read_hook_input()?;
    let (ctx, strategy) = build_context(&input)?;
    let outcome = strategy.save_task_checkpoint(&ctx, &input)?;
    if let Some(id) = outcome.checkpoint {
        info!("Saved task checkpoint {}", id);
    }
    Ok(())
}

pub fn prepare_commit_msg(message_file: &PathBuf) -> Result<()> {
    let input = HookInput::default();
    let (ctx, strategy) = build_context(&input)?;

    let message = std::fs::read_to_string(message_file)
        .with_context(|| format!("reading commit message {}", message_file.display()))?;
    let amended = strategy.prepare_commit_message(&ctx, &message)?;
    if amended != message {
        std::fs::write(message_file, amended)
            .with_context(|| format!("writing commit message {}", message_file.display()))?;
        debug!("Bound commit message to a reserved checkpoint");
    }
    Ok(())
}

pub fn post_commit() -> Result<()> {
    let input = HookInput::default();
    let (ctx, strategy) = build_context(&input)?;
    strategy.observe_commit(&ctx)?;
    Ok(())
}

pub fn session_end() -> Result<()> {
    let input = read_hook_input()?;
    let (ctx, strategy) = build_context(&input)?;
    strategy.end_session(&ctx)?;
    info!("Session {} ended", ctx.session_id);
    Ok(())
}

// ============================================================================
// Review handoff
// ============================================================================

/// Queue best-effort review work and kick the detached worker
///
/// Failures here never fail the hook: review only enriches history.
fn schedule_review(ctx: &InvocationContext, checkpoint: waymark_foundation::CheckpointId) {
    if !ctx.config.review_enabled {
        return;
    }
    let queue = ReviewQueue::new(ctx.repo.root(), ctx.config.review_lock_stale_secs);
    let item = ReviewItem::new(ctx.session_id.clone(), checkpoint);
    match queue.enqueue(&item) {
        Ok(_) => queue.spawn_worker(),
        Err(e) => warn!("Could not queue review work: {}", e),
    }
}

/// Detached worker entry point: drain queued review items
///
/// The automated reviewer itself is an external collaborator; the worker
/// owns only the durable handoff and the single-worker lock.
pub fn run_review_worker() -> Result<()> {
    let git = GitOps::new(std::env::current_dir()?)?;
    let config = WaymarkConfig::load(git.root());
    let queue = ReviewQueue::new(git.root(), config.review_lock_stale_secs);

    let processed = queue.run_worker(|item| {
        info!(
            "Review pass over checkpoint {} (session {})",
            item.checkpoint_id, item.session_id
        );
        Ok(())
    })?;
    debug!("Review worker done ({} items)", processed);
    Ok(())
}
