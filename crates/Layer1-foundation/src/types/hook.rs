//! Agent-adapter hook input contract
//!
//! Every agent adapter normalizes its payload into this shape before the
//! core sees it. Adapters pre-extract modified files, prompts, and token
//! usage; the core never parses agent-specific transcript formats.

use crate::id::SessionId;
use crate::types::{AgentKind, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized hook invocation payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookInput {
    /// Session the hook fires for; empty means the adapter could not tell
    #[serde(default, alias = "sessionId")]
    pub session_id: String,

    /// Path or handle of the transcript the adapter read
    #[serde(default, alias = "transcriptRef", alias = "transcript_path")]
    pub transcript_ref: String,

    /// Prompt that started the turn
    #[serde(default, alias = "userPrompt", alias = "prompt")]
    pub user_prompt: String,

    /// Tool-use id for sub-agent / task checkpoints
    #[serde(default, alias = "toolUseId")]
    pub tool_use_id: String,

    /// Raw agent payload, passed through untouched
    #[serde(default, alias = "rawData")]
    pub raw_data: Value,

    /// Repo-relative files the turn modified, pre-extracted by the adapter
    #[serde(default, alias = "modifiedFiles")]
    pub modified_files: Vec<String>,

    /// Prompts for the turn, pre-extracted by the adapter
    #[serde(default)]
    pub prompts: Vec<String>,

    /// Token usage for the turn, pre-extracted by the adapter
    #[serde(default, alias = "tokenUsage")]
    pub token_usage: TokenUsage,

    /// Originating agent
    #[serde(default)]
    pub agent: AgentKind,
}

impl HookInput {
    /// Parse adapter output from a JSON string
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Session id as a typed value, if present
    pub fn session(&self) -> Option<SessionId> {
        if self.session_id.is_empty() {
            None
        } else {
            Some(SessionId::from_string(self.session_id.clone()))
        }
    }

    /// Whether the turn touched any files
    pub fn has_changes(&self) -> bool {
        !self.modified_files.is_empty()
    }
}
