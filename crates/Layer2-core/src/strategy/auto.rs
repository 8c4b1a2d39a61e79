//! AutoCommit strategy
//!
//! Each turn commits the touched files directly to the active branch with
//! a generated message carrying the checkpoint trailer, then writes a
//! committed checkpoint bound to that commit. The transcript offset
//! advances with every save so the next turn re-parses only new lines.

use super::{
    checkpoint_from_input, ensure_layout, finish_empty_turn, read_transcript, verified_changes,
    InvocationContext, SaveOutcome, Strategy, StrategyError,
};
use crate::git::{GitError, Repository};
use crate::state::SessionEvent;
use crate::trailer;

use std::path::Path;
use tracing::{debug, info};
use waymark_foundation::{HookInput, StrategyKind};

pub struct AutoCommitStrategy;

/// Commit subject generated from the touched files
///
/// Mirrors what a human would type: name the file for small turns, count
/// them for big ones.
fn turn_commit_subject(files: &[String]) -> String {
    match files {
        [] => "agent turn".to_string(),
        [only] => {
            let name = Path::new(only)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| only.clone());
            format!("update {}", name)
        }
        few if few.len() <= 3 => {
            let names: Vec<String> = few
                .iter()
                .filter_map(|f| Path::new(f).file_name())
                .map(|f| f.to_string_lossy().to_string())
                .collect();
            format!("update {}", names.join(", "))
        }
        many => format!("update {} files", many.len()),
    }
}

impl AutoCommitStrategy {
    /// Commit the files and write the linked checkpoint; shared between
    /// turn-end saves and mid-turn task checkpoints
    fn persist_turn(
        &self,
        ctx: &InvocationContext,
        input: &HookInput,
        files: Vec<String>,
    ) -> Result<SaveOutcome, StrategyError> {
        ctx.session_dir().ensure()?;
        let transcript_full = read_transcript(input)?;

        let machine = ctx.machine();
        let mut state = machine.load(&ctx.session_id);

        // A resumed session points at a new transcript; only then does the
        // offset restart from zero.
        if state.transcript_leaf_id != input.transcript_ref {
            debug!(
                "Transcript for {} changed ({} -> {}); resetting offset",
                ctx.session_id, state.transcript_leaf_id, input.transcript_ref
            );
            state.transcript_offset = 0;
            state.transcript_leaf_id = input.transcript_ref.clone();
        }

        let offset = (state.transcript_offset as usize).min(transcript_full.len());
        let new_lines = transcript_full[offset..].to_vec();

        let mut cp = checkpoint_from_input(ctx, input, files.clone(), new_lines)
            .with_strategy(StrategyKind::AutoCommit);

        let message = trailer::append(&turn_commit_subject(&files), &cp.id);
        let commit = match ctx.repo.commit_paths(&message, &files) {
            Ok(commit) => Some(commit),
            // The adapter-reported files can race with user edits; an
            // empty stage is the zero-changes policy, not a failure.
            Err(GitError::NothingToCommit) => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(commit) = &commit {
            cp.linked_commit = Some(commit.clone());
            info!("Auto-committed {} for checkpoint {}", commit, cp.id);
        }

        let id = ctx.store().write_committed(&cp)?;

        state.advance_offset(transcript_full.len() as u64);
        machine.save(&state)?;

        Ok(SaveOutcome {
            checkpoint: Some(id),
            commit,
            phase: None,
        })
    }
}

impl Strategy for AutoCommitStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AutoCommit
    }

    fn ensure_setup(&self, ctx: &InvocationContext) -> Result<(), StrategyError> {
        ensure_layout(ctx)
    }

    fn save_changes(
        &self,
        ctx: &InvocationContext,
        input: &HookInput,
    ) -> Result<SaveOutcome, StrategyError> {
        let files = verified_changes(ctx, input)?;
        if files.is_empty() {
            return finish_empty_turn(ctx, input, || Ok::<(), String>(()));
        }

        let mut outcome = self.persist_turn(ctx, input, files)?;

        // The checkpoint is already committed, so the pending-condensation
        // phase settles immediately.
        let machine = ctx.machine();
        let state = machine.handle_turn_end(
            &ctx.session_id,
            outcome.commit.is_some(),
            Some(&input.token_usage),
            || Ok::<(), String>(()),
        )?;
        let state = if outcome.commit.is_some() {
            machine
                .handle_event(&ctx.session_id, &SessionEvent::CondensationComplete)?
                .0
        } else {
            state
        };

        outcome.phase = Some(state.phase);
        Ok(outcome)
    }

    fn save_task_checkpoint(
        &self,
        ctx: &InvocationContext,
        input: &HookInput,
    ) -> Result<SaveOutcome, StrategyError> {
        let files = verified_changes(ctx, input)?;
        if files.is_empty() {
            debug!("Task checkpoint with no changes for {}; skipping", ctx.session_id);
            return Ok(SaveOutcome::default());
        }
        self.persist_turn(ctx, input, files)
    }
}
