//! On-ref layout of the checkpoint store
//!
//! The committed ref points at a chain of commits; the tip tree is the
//! whole table. One write = one commit = one atomic ref update:
//!
//! ```text
//! refs/waymark/checkpoints        committed chain (append-only)
//!   checkpoints/<id>/metadata.json
//!   checkpoints/<id>/transcript.jsonl
//!   checkpoints/<id>/prompts.json
//!   checkpoints/<id>/context.md
//!   checkpoints/<id>/summary.json
//!   sessions/<session-id>.json
//!
//! refs/waymark/shadow/<session-id>   one mutable snapshot per session
//! ```

use waymark_foundation::types::{AgentKind, StrategyKind, TokenUsage};
use waymark_foundation::{Checkpoint, CheckpointId, SessionId};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ref holding the committed checkpoint chain
pub const COMMITTED_REF: &str = "refs/waymark/checkpoints";

/// Prefix for per-session shadow branches
pub const SHADOW_REF_PREFIX: &str = "refs/waymark/shadow/";

/// Deterministic shadow ref for a session
pub fn shadow_ref(session_id: &SessionId) -> String {
    format!("{}{}", SHADOW_REF_PREFIX, session_id)
}

pub fn metadata_path(id: &CheckpointId) -> String {
    format!("checkpoints/{}/metadata.json", id)
}

pub fn transcript_path(id: &CheckpointId) -> String {
    format!("checkpoints/{}/transcript.jsonl", id)
}

pub fn prompts_path(id: &CheckpointId) -> String {
    format!("checkpoints/{}/prompts.json", id)
}

pub fn context_path(id: &CheckpointId) -> String {
    format!("checkpoints/{}/context.md", id)
}

pub fn summary_path(id: &CheckpointId) -> String {
    format!("checkpoints/{}/summary.json", id)
}

pub fn session_path(session_id: &SessionId) -> String {
    format!("sessions/{}.json", session_id)
}

// ============================================================================
// CheckpointMetadata
// ============================================================================

/// The persisted slice of a checkpoint, minus the bulky payload blobs
///
/// Every field except the identifiers is defaulted so partially-written or
/// legacy metadata still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub id: CheckpointId,

    pub session_id: SessionId,

    #[serde(default)]
    pub strategy: StrategyKind,

    #[serde(default)]
    pub branch: String,

    #[serde(default)]
    pub files_touched: Vec<String>,

    #[serde(default)]
    pub agent: AgentKind,

    #[serde(default)]
    pub token_usage: TokenUsage,

    #[serde(default = "default_created_at")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_commit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condensed_from: Option<String>,
}

fn default_created_at() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl From<&Checkpoint> for CheckpointMetadata {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            id: cp.id.clone(),
            session_id: cp.session_id.clone(),
            strategy: cp.strategy,
            branch: cp.branch.clone(),
            files_touched: cp.files_touched.clone(),
            agent: cp.agent.clone(),
            token_usage: cp.token_usage,
            created_at: cp.created_at,
            author: cp.author.clone(),
            linked_commit: cp.linked_commit.clone(),
            condensed_from: cp.condensed_from.clone(),
        }
    }
}

impl CheckpointMetadata {
    /// Rehydrate a full checkpoint from metadata plus payload blobs
    pub fn into_checkpoint(
        self,
        transcript: Vec<u8>,
        prompts: Vec<String>,
        context: String,
        summary: Option<waymark_foundation::CheckpointSummary>,
    ) -> Checkpoint {
        Checkpoint {
            id: self.id,
            session_id: self.session_id,
            strategy: self.strategy,
            branch: self.branch,
            files_touched: self.files_touched,
            transcript,
            prompts,
            context,
            agent: self.agent,
            token_usage: self.token_usage,
            created_at: self.created_at,
            author: self.author,
            summary,
            linked_commit: self.linked_commit,
            condensed_from: self.condensed_from,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_ref_deterministic() {
        let id = SessionId::from_string("20260101-090000-abc123");
        assert_eq!(shadow_ref(&id), shadow_ref(&id));
        assert_eq!(
            shadow_ref(&id),
            "refs/waymark/shadow/20260101-090000-abc123"
        );
    }

    #[test]
    fn test_paths_are_namespaced_by_id() {
        let id = CheckpointId::from_string("ck-0000000001000-abcd1234");
        assert_eq!(
            metadata_path(&id),
            "checkpoints/ck-0000000001000-abcd1234/metadata.json"
        );
        assert!(summary_path(&id).ends_with("summary.json"));
    }

    #[test]
    fn test_metadata_tolerates_minimal_json() {
        let json = r#"{"id": "ck-0000000001000-abcd1234", "session_id": "20250101-000000-aaaaaa"}"#;
        let meta: CheckpointMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.files_touched.is_empty());
        assert_eq!(meta.created_at, DateTime::<Utc>::UNIX_EPOCH);
    }
}
