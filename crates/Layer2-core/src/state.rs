//! Session State Machine
//!
//! One ephemeral record per active session, persisted as a JSON file and
//! mutated at turn boundaries. Hook processes race and get replayed, so
//! the transition table is total: an event with no matching transition for
//! the current phase is a logged no-op, never an error. A malformed or
//! missing state file is treated as "no state" and never blocks a session.

use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use waymark_foundation::{JsonStore, SessionId, SessionPhase, SessionState, TokenUsage};

// ============================================================================
// Events and effects
// ============================================================================

/// Events delivered by hook invocations
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A user prompt arrived
    Prompt { first_prompt: String },

    /// A turn finished; `committed` is true when the turn produced a commit
    TurnEnd { committed: bool },

    /// The user made a code commit (observed post-commit)
    Commit,

    /// Shadow state was condensed into a committed checkpoint
    CondensationComplete,

    /// The session stopped
    Stop,
}

/// Strategy-specific work dispatched by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Fold the session's shadow checkpoints into one committed checkpoint
    Condense,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to persist session state: {0}")]
    Storage(String),
}

impl From<waymark_foundation::Error> for StateError {
    fn from(e: waymark_foundation::Error) -> Self {
        StateError::Storage(e.to_string())
    }
}

// ============================================================================
// SessionStateMachine
// ============================================================================

/// Coordinates session phases across concurrent hook callbacks
pub struct SessionStateMachine {
    store: JsonStore,
}

impl SessionStateMachine {
    pub fn new(repo_root: &Path) -> Self {
        Self {
            store: JsonStore::project(repo_root).subdir("state"),
        }
    }

    fn file_name(session_id: &SessionId) -> String {
        format!("{}.json", session_id)
    }

    /// Load a session's state; anything unreadable degrades to a fresh
    /// default so orphaned records from crashed processes never block
    pub fn load(&self, session_id: &SessionId) -> SessionState {
        match self
            .store
            .load_optional::<SessionState>(&Self::file_name(session_id))
        {
            Ok(Some(state)) => state,
            Ok(None) => SessionState::new(session_id.clone()),
            Err(e) => {
                warn!(
                    "Unreadable state for {}; starting fresh: {}",
                    session_id, e
                );
                SessionState::new(session_id.clone())
            }
        }
    }

    pub fn exists(&self, session_id: &SessionId) -> bool {
        self.store.exists(&Self::file_name(session_id))
    }

    pub fn save(&self, state: &SessionState) -> Result<(), StateError> {
        self.store
            .save(&Self::file_name(&state.session_id), state)
            .map_err(StateError::from)
    }

    /// Remove a session's state file; missing is fine
    pub fn remove(&self, session_id: &SessionId) -> Result<(), StateError> {
        self.store
            .remove(&Self::file_name(session_id))
            .map_err(StateError::from)
    }

    /// Apply one event to a state, returning any side effect to dispatch
    ///
    /// The table is total. Defined no-ops: `TurnEnd`/`CondensationComplete`
    /// in `Idle`, `Prompt` in `ActiveCommitted` (condensation stays
    /// pending), `Commit` in `ActiveCommitted`, and everything in `Ended`.
    pub fn apply(state: &mut SessionState, event: &SessionEvent) -> Option<SideEffect> {
        use SessionEvent::*;
        use SessionPhase::*;

        let phase = state.phase;
        if phase.is_terminal() {
            debug!(
                "Ignoring {:?} for ended session {}",
                event, state.session_id
            );
            return None;
        }

        let (next, effect) = match (phase, event) {
            (Idle, Prompt { .. }) | (Active, Prompt { .. }) => (Active, None),
            (ActiveCommitted, Prompt { .. }) => {
                debug!(
                    "Prompt while condensation pending for {}; staying put",
                    state.session_id
                );
                (ActiveCommitted, None)
            }

            (Active, TurnEnd { committed: false }) => (Idle, None),
            (Active, TurnEnd { committed: true }) => (ActiveCommitted, None),
            (ActiveCommitted, TurnEnd { .. }) => (Idle, Some(SideEffect::Condense)),
            (Idle, TurnEnd { .. }) => {
                debug!("Turn end for idle session {}; no-op", state.session_id);
                (Idle, None)
            }

            (Active, Commit) | (Idle, Commit) => (ActiveCommitted, None),
            (ActiveCommitted, Commit) => (ActiveCommitted, None),

            (ActiveCommitted, CondensationComplete) => (Idle, None),
            (Active, CondensationComplete) | (Idle, CondensationComplete) => {
                debug!(
                    "Condensation complete without pending commit for {}; no-op",
                    state.session_id
                );
                (phase, None)
            }

            (_, Stop) => {
                state.ended_at = Some(chrono::Utc::now());
                (Ended, None)
            }

            // Ended is handled above; keep the match total anyway.
            (Ended, _) => (Ended, None),
        };

        match event {
            Prompt { first_prompt } if state.first_prompt.is_empty() => {
                state.first_prompt = first_prompt.clone();
            }
            // Replayed turn-ends in Idle must not inflate the step count.
            TurnEnd { .. } if phase != Idle => {
                state.step_count += 1;
            }
            CondensationComplete => {
                state.reserved_checkpoint = None;
            }
            _ => {}
        }

        if next != phase {
            debug!(
                "Session {} phase {} -> {}",
                state.session_id, phase, next
            );
        }
        state.phase = next;
        effect
    }

    /// Load, apply, persist; returns the new state and any side effect
    pub fn handle_event(
        &self,
        session_id: &SessionId,
        event: &SessionEvent,
    ) -> Result<(SessionState, Option<SideEffect>), StateError> {
        let mut state = self.load(session_id);
        let effect = Self::apply(&mut state, event);
        self.save(&state)?;
        Ok((state, effect))
    }

    /// Turn-end entry point: advances the phase, then dispatches the
    /// condensation side effect when one is due
    ///
    /// A failed dispatch only degrades explain/rewind fidelity, never the
    /// underlying commits, so it is downgraded to a warning and the phase
    /// advance stands; there is no compensating rollback.
    pub fn handle_turn_end<F, E>(
        &self,
        session_id: &SessionId,
        committed: bool,
        usage: Option<&TokenUsage>,
        condense: F,
    ) -> Result<SessionState, StateError>
    where
        F: FnOnce() -> Result<(), E>,
        E: std::fmt::Display,
    {
        let mut state = self.load(session_id);
        if let Some(usage) = usage {
            state.token_usage.add(usage);
        }
        let effect = Self::apply(&mut state, &SessionEvent::TurnEnd { committed });
        self.save(&state)?;

        if effect == Some(SideEffect::Condense) {
            if let Err(e) = condense() {
                warn!(
                    "Condensation for {} failed (explain/rewind fidelity degraded): {}",
                    session_id, e
                );
            } else {
                let effect = Self::apply(&mut state, &SessionEvent::CondensationComplete);
                debug_assert!(effect.is_none());
                self.save(&state)?;
            }
        }

        Ok(state)
    }

    /// Sessions with a state file on disk
    pub fn list(&self) -> Vec<SessionId> {
        match self.store.list() {
            Ok(names) => names
                .iter()
                .filter_map(|name| name.strip_suffix(".json"))
                .map(SessionId::from_string)
                .collect(),
            Err(e) => {
                warn!("Failed to list session state: {}", e);
                Vec::new()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> SessionState {
        SessionState::new(SessionId::from_string("20260101-000000-abc123"))
    }

    fn machine() -> (tempfile::TempDir, SessionStateMachine) {
        let dir = tempfile::tempdir().unwrap();
        let machine = SessionStateMachine::new(dir.path());
        (dir, machine)
    }

    #[test]
    fn test_turn_end_without_commit_goes_idle() {
        let mut state = fresh();
        let effect =
            SessionStateMachine::apply(&mut state, &SessionEvent::TurnEnd { committed: false });
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(effect, None);
        assert_eq!(state.step_count, 1);
    }

    #[test]
    fn test_turn_end_with_commit_pends_condensation() {
        let mut state = fresh();
        SessionStateMachine::apply(&mut state, &SessionEvent::TurnEnd { committed: true });
        assert_eq!(state.phase, SessionPhase::ActiveCommitted);

        let effect =
            SessionStateMachine::apply(&mut state, &SessionEvent::TurnEnd { committed: false });
        assert_eq!(state.phase, SessionPhase::Idle);
        assert_eq!(effect, Some(SideEffect::Condense));
    }

    #[test]
    fn test_condensation_complete_goes_idle() {
        let mut state = fresh();
        SessionStateMachine::apply(&mut state, &SessionEvent::Commit);
        assert_eq!(state.phase, SessionPhase::ActiveCommitted);
        SessionStateMachine::apply(&mut state, &SessionEvent::CondensationComplete);
        assert_eq!(state.phase, SessionPhase::Idle);
    }

    #[test]
    fn test_stop_is_terminal_and_records_end() {
        let mut state = fresh();
        SessionStateMachine::apply(&mut state, &SessionEvent::Stop);
        assert_eq!(state.phase, SessionPhase::Ended);
        assert!(state.ended_at.is_some());

        // Replayed events after the end are swallowed.
        let effect =
            SessionStateMachine::apply(&mut state, &SessionEvent::TurnEnd { committed: true });
        assert_eq!(state.phase, SessionPhase::Ended);
        assert_eq!(effect, None);
    }

    #[test]
    fn test_every_pair_is_total() {
        let phases = [
            SessionPhase::Active,
            SessionPhase::ActiveCommitted,
            SessionPhase::Idle,
            SessionPhase::Ended,
        ];
        let events = [
            SessionEvent::Prompt {
                first_prompt: "p".into(),
            },
            SessionEvent::TurnEnd { committed: false },
            SessionEvent::TurnEnd { committed: true },
            SessionEvent::Commit,
            SessionEvent::CondensationComplete,
            SessionEvent::Stop,
        ];
        for phase in phases {
            for event in &events {
                let mut state = fresh();
                state.phase = phase;
                // Must neither panic nor corrupt the phase.
                SessionStateMachine::apply(&mut state, event);
                assert!(matches!(
                    state.phase,
                    SessionPhase::Active
                        | SessionPhase::ActiveCommitted
                        | SessionPhase::Idle
                        | SessionPhase::Ended
                ));
            }
        }
    }

    #[test]
    fn test_first_prompt_kept() {
        let mut state = fresh();
        SessionStateMachine::apply(
            &mut state,
            &SessionEvent::Prompt {
                first_prompt: "build the thing".into(),
            },
        );
        SessionStateMachine::apply(
            &mut state,
            &SessionEvent::Prompt {
                first_prompt: "now change it".into(),
            },
        );
        assert_eq!(state.first_prompt, "build the thing");
    }

    #[test]
    fn test_corrupt_state_file_degrades_to_fresh() {
        let (dir, machine) = machine();
        let session_id = SessionId::from_string("20260101-000000-abc123");

        let state_dir = dir.path().join(".waymark").join("state");
        std::fs::create_dir_all(&state_dir).unwrap();
        std::fs::write(state_dir.join(format!("{}.json", session_id)), "{broken").unwrap();

        let state = machine.load(&session_id);
        assert_eq!(state.phase, SessionPhase::Active);
        assert_eq!(state.step_count, 0);
    }

    #[test]
    fn test_handle_turn_end_condense_failure_still_advances() {
        let (_dir, machine) = machine();
        let session_id = SessionId::from_string("20260101-000000-abc123");

        let mut state = machine.load(&session_id);
        SessionStateMachine::apply(&mut state, &SessionEvent::Commit);
        machine.save(&state).unwrap();

        let state = machine
            .handle_turn_end(&session_id, false, None, || {
                Err::<(), _>("shadow branch vanished")
            })
            .unwrap();
        assert_eq!(state.phase, SessionPhase::Idle);
    }

    #[test]
    fn test_handle_turn_end_accumulates_usage() {
        let (_dir, machine) = machine();
        let session_id = SessionId::from_string("20260101-000000-abc123");

        let usage = TokenUsage {
            input: 5,
            output: 7,
            ..Default::default()
        };
        machine
            .handle_turn_end(&session_id, false, Some(&usage), || Ok::<(), String>(()))
            .unwrap();
        let state = machine
            .handle_turn_end(&session_id, false, Some(&usage), || Ok::<(), String>(()))
            .unwrap();
        assert_eq!(state.token_usage.input, 10);
        assert_eq!(state.token_usage.output, 14);
    }
}
