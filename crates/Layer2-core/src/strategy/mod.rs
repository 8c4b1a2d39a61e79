//! Persistence strategies
//!
//! A strategy decides when a checkpoint enters visible git history. Both
//! strategies share the same surface: per-turn saves, incremental task
//! checkpoints, idempotent setup, and rewind-point listing. Hook processes
//! may be re-run at any point, so every operation here is idempotent keyed
//! by (session id, logical step).

pub mod auto;
pub mod manual;

use crate::git::{GitError, Repository};
use crate::rewind::{RewindEngine, RewindError};
use crate::state::{SessionEvent, SessionStateMachine, StateError};
use crate::store::{CheckpointStore, StoreError};

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use waymark_foundation::{
    AgentKind, Checkpoint, CheckpointId, HookInput, RewindPoint, SessionDir, SessionId,
    SessionPhase, StrategyKind, WaymarkConfig,
};

pub use auto::AutoCommitStrategy;
pub use manual::ManualCommitStrategy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Transcript unreadable at {0}: {1}")]
    TranscriptUnreadable(String, String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Rewind error: {0}")]
    Rewind(#[from] RewindError),

    #[error("Storage error: {0}")]
    Foundation(#[from] waymark_foundation::Error),
}

// ============================================================================
// InvocationContext
// ============================================================================

/// Everything one hook invocation needs, constructed once at the edge
///
/// Replaces any notion of a process-wide "current strategy"/"current
/// agent": the context is built per invocation and passed through every
/// core operation.
pub struct InvocationContext {
    pub repo: Arc<dyn Repository>,
    pub config: WaymarkConfig,
    pub session_id: SessionId,
    pub agent: AgentKind,
}

impl InvocationContext {
    pub fn new(repo: Arc<dyn Repository>, config: WaymarkConfig, session_id: SessionId) -> Self {
        Self {
            repo,
            config,
            session_id,
            agent: AgentKind::default(),
        }
    }

    pub fn with_agent(mut self, agent: AgentKind) -> Self {
        self.agent = agent;
        self
    }

    pub fn store(&self) -> CheckpointStore {
        CheckpointStore::new(self.repo.clone())
    }

    pub fn machine(&self) -> SessionStateMachine {
        SessionStateMachine::new(self.repo.root())
    }

    pub fn engine(&self) -> RewindEngine {
        RewindEngine::new(self.repo.clone(), self.config.clone())
    }

    pub fn session_dir(&self) -> SessionDir {
        SessionDir::new(self.repo.root(), &self.session_id)
    }
}

// ============================================================================
// Strategy trait
// ============================================================================

/// What one save accomplished
#[derive(Debug, Clone, Default)]
pub struct SaveOutcome {
    /// Checkpoint written this turn, if any
    pub checkpoint: Option<CheckpointId>,

    /// Code commit produced this turn, if any
    pub commit: Option<String>,

    /// Session phase after the turn-end transition
    pub phase: Option<SessionPhase>,
}

impl SaveOutcome {
    pub fn nothing_persisted(&self) -> bool {
        self.checkpoint.is_none() && self.commit.is_none()
    }
}

/// Per-turn orchestration policy
pub trait Strategy {
    fn kind(&self) -> StrategyKind;

    /// Prepare the repository for this strategy; idempotent
    fn ensure_setup(&self, ctx: &InvocationContext) -> Result<(), StrategyError>;

    /// First-prompt entry point: create session scaffolding and activate
    /// the session. Shared behavior; strategies rarely override it.
    fn begin_turn(&self, ctx: &InvocationContext, input: &HookInput) -> Result<(), StrategyError> {
        ctx.session_dir().ensure()?;
        ctx.machine().handle_event(
            &ctx.session_id,
            &SessionEvent::Prompt {
                first_prompt: input.user_prompt.clone(),
            },
        )?;
        Ok(())
    }

    /// Turn-end entry point: persist the turn and advance the phase
    fn save_changes(
        &self,
        ctx: &InvocationContext,
        input: &HookInput,
    ) -> Result<SaveOutcome, StrategyError>;

    /// Mid-turn incremental checkpoint (sub-agent / task boundary);
    /// persists without driving the turn-end transition
    fn save_task_checkpoint(
        &self,
        ctx: &InvocationContext,
        input: &HookInput,
    ) -> Result<SaveOutcome, StrategyError>;

    /// Commit-message hook: amend the message before the commit lands.
    /// Default: leave it alone.
    fn prepare_commit_message(
        &self,
        _ctx: &InvocationContext,
        message: &str,
    ) -> Result<String, StrategyError> {
        Ok(message.to_string())
    }

    /// Post-commit hook: react to a commit the user just made.
    /// Default: nothing to do.
    fn observe_commit(&self, _ctx: &InvocationContext) -> Result<(), StrategyError> {
        Ok(())
    }

    /// Session-stop entry point
    fn end_session(&self, ctx: &InvocationContext) -> Result<(), StrategyError> {
        ctx.machine()
            .handle_event(&ctx.session_id, &SessionEvent::Stop)?;
        Ok(())
    }

    /// Restore candidates, newest first
    fn rewind_points(
        &self,
        ctx: &InvocationContext,
        limit: usize,
    ) -> Result<Vec<RewindPoint>, StrategyError> {
        Ok(ctx.engine().rewind_points(limit)?)
    }
}

/// Construct the strategy for a configured kind
pub fn strategy_for(kind: StrategyKind) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::ManualCommit => Box::new(ManualCommitStrategy),
        StrategyKind::AutoCommit => Box::new(AutoCommitStrategy),
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Files from the adapter that actually differ in the working tree
///
/// An adapter may report files the agent touched and reverted; the shared
/// zero-changes policy treats those turns as "nothing to persist", which
/// is not an error.
pub(crate) fn verified_changes(
    ctx: &InvocationContext,
    input: &HookInput,
) -> Result<Vec<String>, StrategyError> {
    if input.modified_files.is_empty() {
        return Ok(Vec::new());
    }
    let status = ctx.repo.status(Some(&input.modified_files))?;
    let changed: std::collections::HashSet<String> = status
        .files
        .iter()
        .map(|(path, _)| path.to_string_lossy().to_string())
        .collect();
    Ok(input
        .modified_files
        .iter()
        .filter(|path| changed.contains(*path))
        .cloned()
        .collect())
}

/// Read the transcript the adapter pointed at
///
/// An unreadable transcript aborts the save: it is the only record of the
/// turn. An adapter that supplies no transcript ref yields empty bytes.
pub(crate) fn read_transcript(input: &HookInput) -> Result<Vec<u8>, StrategyError> {
    if input.transcript_ref.is_empty() {
        return Ok(Vec::new());
    }
    std::fs::read(&input.transcript_ref)
        .map_err(|e| StrategyError::TranscriptUnreadable(input.transcript_ref.clone(), e.to_string()))
}

/// Assemble a checkpoint from a hook payload
pub(crate) fn checkpoint_from_input(
    ctx: &InvocationContext,
    input: &HookInput,
    files: Vec<String>,
    transcript: Vec<u8>,
) -> Checkpoint {
    let branch = ctx.repo.current_branch().unwrap_or_default();
    let mut prompts = input.prompts.clone();
    if prompts.is_empty() && !input.user_prompt.is_empty() {
        prompts.push(input.user_prompt.clone());
    }
    Checkpoint::new(ctx.session_id.clone())
        .with_branch(branch)
        .with_files(files)
        .with_transcript(transcript)
        .with_prompts(prompts)
        .with_agent(input.agent.clone())
        .with_token_usage(input.token_usage)
        .with_author(ctx.config.author.clone())
}

/// Install a hook script under `.git/hooks`, idempotently
///
/// An existing foreign hook is left untouched and reported; losing our
/// hook degrades checkpoint coverage but must not break the user's setup.
pub(crate) fn install_hook_script(
    git_hooks_dir: &Path,
    name: &str,
    command: &str,
) -> Result<(), StrategyError> {
    const MARKER: &str = "# installed by waymark";

    let path = git_hooks_dir.join(name);
    if path.exists() {
        let existing = std::fs::read_to_string(&path).unwrap_or_default();
        if existing.contains(MARKER) {
            debug!("Hook {} already installed", name);
            return Ok(());
        }
        return Err(StrategyError::Setup(format!(
            "existing {} hook is not waymark-managed; leaving it alone",
            name
        )));
    }

    std::fs::create_dir_all(git_hooks_dir)
        .map_err(|e| StrategyError::Setup(format!("cannot create hooks dir: {}", e)))?;
    let script = format!("#!/bin/sh\n{}\n{} \"$@\"\n", MARKER, command);
    std::fs::write(&path, script)
        .map_err(|e| StrategyError::Setup(format!("cannot write {} hook: {}", name, e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| StrategyError::Setup(format!("cannot mark {} executable: {}", name, e)))?;
    }

    debug!("Installed {} hook", name);
    Ok(())
}

/// Shared `.waymark` scaffolding; idempotent
pub(crate) fn ensure_layout(ctx: &InvocationContext) -> Result<(), StrategyError> {
    if !crate::git::GitOps::git_available() {
        return Err(StrategyError::Setup("git binary not found on PATH".into()));
    }
    let root = ctx.repo.root().join(".waymark");
    for sub in ["sessions", "state", "cache", "review"] {
        std::fs::create_dir_all(root.join(sub))
            .map_err(|e| StrategyError::Setup(format!("cannot create {} dir: {}", sub, e)))?;
    }
    Ok(())
}

/// Zero-change turn: nothing persisted, but the turn-end transition still
/// runs (including any pending condensation) and transient per-turn state
/// is cleared
pub(crate) fn finish_empty_turn<F, E>(
    ctx: &InvocationContext,
    input: &HookInput,
    condense: F,
) -> Result<SaveOutcome, StrategyError>
where
    F: FnOnce() -> Result<(), E>,
    E: std::fmt::Display,
{
    debug!(
        "No file changes for session {}; advancing phase only",
        ctx.session_id
    );
    let state = ctx.machine().handle_turn_end(
        &ctx.session_id,
        false,
        Some(&input.token_usage),
        condense,
    )?;
    Ok(SaveOutcome {
        checkpoint: None,
        commit: None,
        phase: Some(state.phase),
    })
}
