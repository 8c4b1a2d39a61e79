//! ManualCommit strategy
//!
//! Checkpoints accumulate as shadow-branch snapshots until the user makes
//! a real commit. The prepare-commit-msg hook reserves a checkpoint id and
//! binds it into the message trailer; after the commit, pending shadow
//! state is condensed into one committed checkpoint linked to that commit.
//! A checkpoint's commit linkage is therefore only known after the user
//! commits.

use super::{
    checkpoint_from_input, ensure_layout, finish_empty_turn, install_hook_script, read_transcript,
    verified_changes, InvocationContext, SaveOutcome, Strategy, StrategyError,
};
use crate::git::Repository;
use crate::state::SessionEvent;
use crate::trailer;

use tracing::{debug, info};
use waymark_foundation::{CheckpointId, HookInput, StrategyKind};

pub struct ManualCommitStrategy;

impl ManualCommitStrategy {
    /// Fold the session's pending shadow state into one committed
    /// checkpoint bound to the current HEAD commit
    ///
    /// Idempotent: with no shadow branch there is nothing to condense, and
    /// a replayed condensation of an already-written id is a store no-op.
    pub fn condense(&self, ctx: &InvocationContext) -> Result<Option<CheckpointId>, StrategyError> {
        let store = ctx.store();
        let Some(shadow_tip) = store.shadow_tip(&ctx.session_id)? else {
            debug!("No shadow state for {}; nothing to condense", ctx.session_id);
            return Ok(None);
        };

        let machine = ctx.machine();
        let state = machine.load(&ctx.session_id);
        let id = state
            .reserved_checkpoint
            .clone()
            .unwrap_or_else(CheckpointId::new);

        let mut cp = match store.live_temporary(&ctx.session_id)? {
            Some(temp) => temp,
            None => waymark_foundation::Checkpoint::new(ctx.session_id.clone()),
        };
        cp.id = id.clone();
        cp.strategy = StrategyKind::ManualCommit;
        cp.author = ctx.config.author.clone();
        cp.condensed_from = Some(shadow_tip.clone());
        if let Some(head) = ctx.repo.resolve("HEAD")? {
            cp.linked_commit = Some(head);
        }

        store.write_committed(&cp)?;

        // The shadow branch has been folded in; drop it so the next turn
        // starts a fresh snapshot. If another hook superseded the snapshot
        // while we condensed, the tip we folded is no longer reachable and
        // the branch must survive for the next condensation.
        let shadow = crate::shadow::ShadowBranchManager::new(ctx.repo.clone());
        if shadow.is_reachable(&shadow_tip, &ctx.session_id, ctx.config.ancestry_depth_limit)? {
            shadow.delete(&ctx.session_id)?;
        } else {
            debug!(
                "Shadow branch for {} moved during condensation; keeping it",
                ctx.session_id
            );
        }

        info!("Condensed session {} into checkpoint {}", ctx.session_id, id);
        Ok(Some(id))
    }
}

impl Strategy for ManualCommitStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ManualCommit
    }

    fn ensure_setup(&self, ctx: &InvocationContext) -> Result<(), StrategyError> {
        ensure_layout(ctx)?;
        let hooks_dir = ctx.repo.root().join(".git").join("hooks");
        install_hook_script(
            &hooks_dir,
            "prepare-commit-msg",
            "waymark hook prepare-commit-msg",
        )?;
        install_hook_script(&hooks_dir, "post-commit", "waymark hook post-commit")?;
        Ok(())
    }

    fn save_changes(
        &self,
        ctx: &InvocationContext,
        input: &HookInput,
    ) -> Result<SaveOutcome, StrategyError> {
        let files = verified_changes(ctx, input)?;
        if files.is_empty() {
            return finish_empty_turn(ctx, input, || self.condense(ctx).map(|_| ()));
        }

        ctx.session_dir().ensure()?;
        let transcript = read_transcript(input)?;
        let cp = checkpoint_from_input(ctx, input, files, transcript)
            .with_strategy(StrategyKind::ManualCommit);
        let id = ctx.store().write_temporary(&cp)?;

        let state = ctx.machine().handle_turn_end(
            &ctx.session_id,
            false,
            Some(&input.token_usage),
            || self.condense(ctx).map(|_| ()),
        )?;

        Ok(SaveOutcome {
            checkpoint: Some(id),
            commit: None,
            phase: Some(state.phase),
        })
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

        ctx.session_dir().ensure()?;
        let transcript = read_transcript(input)?;
        let cp = checkpoint_from_input(ctx, input, files, transcript)
            .with_strategy(StrategyKind::ManualCommit);
        let id = ctx.store().write_temporary(&cp)?;

        Ok(SaveOutcome {
            checkpoint: Some(id),
            commit: None,
            phase: None,
        })
    }

    /// Reserve a checkpoint id for the in-flight commit and bind it into
    /// the message; a commit with no pending shadow state is left alone
    fn prepare_commit_message(
        &self,
        ctx: &InvocationContext,
        message: &str,
    ) -> Result<String, StrategyError> {
        if ctx.store().shadow_tip(&ctx.session_id)?.is_none() {
            return Ok(message.to_string());
        }

        let machine = ctx.machine();
        let mut state = machine.load(&ctx.session_id);
        let id = state
            .reserved_checkpoint
            .get_or_insert_with(CheckpointId::new)
            .clone();
        machine.save(&state)?;

        Ok(trailer::append(message, &id))
    }

    /// The user committed: mark condensation pending and attempt it right
    /// away. Failure leaves the phase at active-committed, and the next
    /// turn-end re-dispatches condensation for whatever shadow state
    /// remains.
    fn observe_commit(&self, ctx: &InvocationContext) -> Result<(), StrategyError> {
        if ctx.store().shadow_tip(&ctx.session_id)?.is_none() {
            debug!("Commit without shadow state for {}; ignoring", ctx.session_id);
            return Ok(());
        }

        let machine = ctx.machine();
        machine.handle_event(&ctx.session_id, &SessionEvent::Commit)?;

        match self.condense(ctx) {
            Ok(_) => {
                machine.handle_event(&ctx.session_id, &SessionEvent::CondensationComplete)?;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "Condensation at commit time failed for {} (will retry at turn end): {}",
                    ctx.session_id,
                    e
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind() {
        assert_eq!(ManualCommitStrategy.kind(), StrategyKind::ManualCommit);
    }
}
