//! Session records and ephemeral session state

use crate::id::{CheckpointId, SessionId};
use crate::types::{StrategyKind, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// SessionRecord
// ============================================================================

/// Durable record of a session, stored alongside its checkpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Date-prefixed session id, fixed at first prompt
    pub id: SessionId,

    /// When the session started
    pub start_time: DateTime<Utc>,

    /// Strategy the session runs under
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Short description (usually the first prompt)
    #[serde(default)]
    pub description: String,

    /// Checkpoints owned by this session, in creation order
    #[serde(default)]
    pub checkpoints: Vec<CheckpointId>,
}

impl SessionRecord {
    pub fn new(id: SessionId, strategy: StrategyKind) -> Self {
        Self {
            id,
            start_time: Utc::now(),
            strategy,
            description: String::new(),
            checkpoints: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a checkpoint id, keeping the list duplicate-free
    pub fn record_checkpoint(&mut self, id: CheckpointId) {
        if !self.checkpoints.contains(&id) {
            self.checkpoints.push(id);
        }
    }
}

// ============================================================================
// SessionPhase
// ============================================================================

/// Phase of an active session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    /// A turn is in flight
    #[default]
    Active,

    /// A turn ended with a commit; condensation is pending
    ActiveCommitted,

    /// Between turns, nothing pending
    Idle,

    /// Session stopped; terminal
    Ended,
}

impl SessionPhase {
    /// Terminal phases accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Ended)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SessionPhase::Active => "active",
            SessionPhase::ActiveCommitted => "active-committed",
            SessionPhase::Idle => "idle",
            SessionPhase::Ended => "ended",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// SessionState
// ============================================================================

/// Ephemeral per-session state, mutated at turn boundaries
///
/// Lives in `.waymark/state/<session-id>.json`. An orphaned or corrupt file
/// left by a crashed process must never block future sessions: loading
/// failures degrade to a fresh default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,

    #[serde(default)]
    pub phase: SessionPhase,

    /// Byte offset into the transcript already persisted; monotonic, reset
    /// only on a genuine first turn of a (resumed) session
    #[serde(default)]
    pub transcript_offset: u64,

    /// Last transcript leaf entry persisted, for resumed-session dedup
    #[serde(default)]
    pub transcript_leaf_id: String,

    /// Turns observed so far
    #[serde(default)]
    pub step_count: u64,

    /// First prompt of the session
    #[serde(default)]
    pub first_prompt: String,

    /// Token usage accumulated across turns
    #[serde(default)]
    pub token_usage: TokenUsage,

    /// Checkpoint id reserved at prepare-commit-msg time, consumed by
    /// post-commit condensation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_checkpoint: Option<CheckpointId>,

    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            phase: SessionPhase::Active,
            transcript_offset: 0,
            transcript_leaf_id: String::new(),
            step_count: 0,
            first_prompt: String::new(),
            token_usage: TokenUsage::default(),
            reserved_checkpoint: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Advance the transcript offset; a smaller value is ignored so replayed
    /// hooks cannot move the cursor backwards
    pub fn advance_offset(&mut self, offset: u64) {
        if offset > self.transcript_offset {
            self.transcript_offset = offset;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
