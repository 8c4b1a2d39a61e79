//! Checkpoint data model

use crate::id::{CheckpointId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// StrategyKind / AgentKind
// ============================================================================

/// Persistence strategy governing when checkpoints enter visible history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Checkpoints accumulate on a shadow branch until the user commits
    #[default]
    ManualCommit,

    /// Each turn commits directly to the active branch
    AutoCommit,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManualCommit => write!(f, "manual-commit"),
            Self::AutoCommit => write!(f, "auto-commit"),
        }
    }
}

/// Originating agent for a session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    #[default]
    ClaudeCode,
    Codex,
    Gemini,
    Other(String),
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClaudeCode => write!(f, "claude-code"),
            Self::Codex => write!(f, "codex"),
            Self::Gemini => write!(f, "gemini"),
            Self::Other(name) => write!(f, "{}", name),
        }
    }
}

// ============================================================================
// TokenUsage
// ============================================================================

/// Token counts for one turn or accumulated across a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,

    #[serde(default)]
    pub output: u64,

    #[serde(default)]
    pub cache_read: u64,

    #[serde(default)]
    pub cache_creation: u64,
}

impl TokenUsage {
    /// Accumulate another turn's usage
    pub fn add(&mut self, other: &TokenUsage) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
        self.cache_read = self.cache_read.saturating_add(other.cache_read);
        self.cache_creation = self.cache_creation.saturating_add(other.cache_creation);
    }

    pub fn total(&self) -> u64 {
        self.input
            .saturating_add(self.output)
            .saturating_add(self.cache_read)
            .saturating_add(self.cache_creation)
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

// ============================================================================
// CheckpointSummary
// ============================================================================

/// Post-hoc summary attached to a committed checkpoint
///
/// The only part of a committed checkpoint that may be amended after write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    #[serde(default)]
    pub intent: String,

    #[serde(default)]
    pub outcome: String,

    #[serde(default)]
    pub learnings: String,

    #[serde(default)]
    pub friction: String,
}

impl CheckpointSummary {
    pub fn is_empty(&self) -> bool {
        self.intent.is_empty()
            && self.outcome.is_empty()
            && self.learnings.is_empty()
            && self.friction.is_empty()
    }
}

// ============================================================================
// Checkpoint
// ============================================================================

/// A snapshot of one agent turn: transcript, prompts, and file changes
///
/// Committed checkpoints are append-only once written; temporary checkpoints
/// are mutable until superseded or condensed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique, creation-sortable checkpoint id
    pub id: CheckpointId,

    /// Owning session
    pub session_id: SessionId,

    /// Strategy that produced this checkpoint
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Branch the session was on when the checkpoint was written
    #[serde(default)]
    pub branch: String,

    /// Repo-relative paths touched this turn, in adapter order
    #[serde(default)]
    pub files_touched: Vec<String>,

    /// Raw transcript bytes for the turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<u8>,

    /// User prompts for the turn, in order
    #[serde(default)]
    pub prompts: Vec<String>,

    /// Free-form context payload supplied by the adapter
    #[serde(default)]
    pub context: String,

    /// Originating agent
    #[serde(default)]
    pub agent: AgentKind,

    /// Token usage for the turn
    #[serde(default)]
    pub token_usage: TokenUsage,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Author recorded on the backing commit
    #[serde(default)]
    pub author: String,

    /// Optional post-hoc summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CheckpointSummary>,

    /// Code commit this checkpoint is bound to, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_commit: Option<String>,

    /// Snapshot commit the checkpoint was condensed from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condensed_from: Option<String>,
}

impl Checkpoint {
    /// Create a checkpoint shell for a session; fill in with `with_*`
    pub fn new(session_id: SessionId) -> Self {
        Self {
            id: CheckpointId::new(),
            session_id,
            strategy: StrategyKind::default(),
            branch: String::new(),
            files_touched: Vec::new(),
            transcript: Vec::new(),
            prompts: Vec::new(),
            context: String::new(),
            agent: AgentKind::default(),
            token_usage: TokenUsage::default(),
            created_at: Utc::now(),
            author: String::new(),
            summary: None,
            linked_commit: None,
            condensed_from: None,
        }
    }

    pub fn with_id(mut self, id: CheckpointId) -> Self {
        self.id = id;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_touched = files;
        self
    }

    pub fn with_transcript(mut self, transcript: Vec<u8>) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn with_prompts(mut self, prompts: Vec<String>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_agent(mut self, agent: AgentKind) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = usage;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_linked_commit(mut self, commit: impl Into<String>) -> Self {
        self.linked_commit = Some(commit.into());
        self
    }

    pub fn with_condensed_from(mut self, commit: impl Into<String>) -> Self {
        self.condensed_from = Some(commit.into());
        self
    }
}

// ============================================================================
// RewindPoint
// ============================================================================

/// Display/restore projection of a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewindPoint {
    /// Stable identifier shown to the user
    pub id: String,

    /// Originating checkpoint
    pub checkpoint_id: CheckpointId,

    /// Owning session
    pub session_id: SessionId,

    /// When the checkpoint was created
    pub date: DateTime<Utc>,

    /// True exactly when the file snapshot is unreachable from current
    /// history; such a point can only replay logs, not code
    pub is_logs_only: bool,

    /// Condensation the checkpoint was folded into, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condensation_id: Option<CheckpointId>,
}

// ============================================================================
// Tests
// ============================================================================
