//! Checkpoint Store
//!
//! Reads and writes checkpoints as git objects under dedicated refs. A
//! "transaction" is one atomic compare-and-swap ref update; durability is
//! the git object database. Readers always resolve through the ref and
//! never cache an object id across invocations.

pub mod layout;

use crate::git::{GitError, Repository, TreeEdit};
use crate::trailer;
use layout::CheckpointMetadata;

use waymark_foundation::storage::{CONTEXT_FILE, TRANSCRIPT_FILE};
use waymark_foundation::{
    Checkpoint, CheckpointId, CheckpointSummary, SessionDir, SessionId, SessionRecord,
};

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Ref contention on {0} persisted across retry")]
    RefContention(String),

    #[error("Session metadata directory missing: {0}")]
    MetadataDirMissing(PathBuf),

    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    #[error("Malformed checkpoint metadata: {0}")]
    Corrupt(String),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Storage error: {0}")]
    Foundation(#[from] waymark_foundation::Error),
}

impl StoreError {
    /// Whether re-running the whole write may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Git(e) if e.is_retryable())
    }
}

/// Payload blobs of the newest checkpoint visible for a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContent {
    pub transcript: Vec<u8>,
    pub prompts: Vec<String>,
    pub context: String,
    pub summary: Option<CheckpointSummary>,
}

// ============================================================================
// CheckpointStore
// ============================================================================

/// Git-native checkpoint storage
pub struct CheckpointStore {
    repo: Arc<dyn Repository>,
}

impl CheckpointStore {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Tip of the committed chain, `None` on a checkpoint-free repository
    fn committed_tip(&self) -> Result<Option<String>, StoreError> {
        Ok(self.repo.resolve(layout::COMMITTED_REF)?)
    }

    // ------------------------------------------------------------------------
    // Committed checkpoints
    // ------------------------------------------------------------------------

    /// Append an immutable checkpoint to the committed index
    ///
    /// Replayed writes of an id already present are a no-op. A lost ref
    /// race is retried once internally before surfacing as retryable
    /// contention.
    pub fn write_committed(&self, cp: &Checkpoint) -> Result<CheckpointId, StoreError> {
        match self.try_append(cp) {
            Err(e) if e.is_retryable() => {
                warn!(
                    "Committed ref moved during write of {}; retrying once",
                    cp.id
                );
                self.try_append(cp).map_err(|e| {
                    if e.is_retryable() {
                        StoreError::RefContention(layout::COMMITTED_REF.to_string())
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }

    fn try_append(&self, cp: &Checkpoint) -> Result<CheckpointId, StoreError> {
        let tip = self.committed_tip()?;

        // Hook processes may be replayed; an id already in the index is done.
        if let Some(tip) = tip.as_deref() {
            if self
                .repo
                .show_file(tip, &layout::metadata_path(&cp.id))?
                .is_some()
            {
                debug!("Checkpoint {} already written; skipping", cp.id);
                return Ok(cp.id.clone());
            }
        }

        let metadata = CheckpointMetadata::from(cp);
        let mut edits = vec![
            TreeEdit::put(
                layout::metadata_path(&cp.id),
                serde_json::to_vec_pretty(&metadata)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            ),
            TreeEdit::put(layout::transcript_path(&cp.id), cp.transcript.clone()),
            TreeEdit::put(
                layout::prompts_path(&cp.id),
                serde_json::to_vec_pretty(&cp.prompts)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            ),
        ];
        if !cp.context.is_empty() {
            edits.push(TreeEdit::put(
                layout::context_path(&cp.id),
                cp.context.as_bytes().to_vec(),
            ));
        }
        if let Some(summary) = &cp.summary {
            edits.push(TreeEdit::put(
                layout::summary_path(&cp.id),
                serde_json::to_vec_pretty(summary)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            ));
        }

        // Upsert the owning session record in the same transaction.
        let mut session = self
            .read_session_at(tip.as_deref(), &cp.session_id)?
            .unwrap_or_else(|| {
                let mut record = SessionRecord::new(cp.session_id.clone(), cp.strategy);
                record.start_time = cp.created_at;
                record
            });
        if session.description.is_empty() {
            if let Some(first) = cp.prompts.first() {
                session.description = first.clone();
            }
        }
        session.record_checkpoint(cp.id.clone());
        edits.push(TreeEdit::put(
            layout::session_path(&cp.session_id),
            serde_json::to_vec_pretty(&session).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        ));

        let message = format!("waymark: checkpoint {}", cp.id);
        let parents: Vec<&str> = tip.as_deref().into_iter().collect();
        let commit = self
            .repo
            .commit_edited_tree(tip.as_deref(), &edits, &parents, &message)?;

        self.repo
            .update_ref_cas(layout::COMMITTED_REF, &commit, tip.as_deref())?;

        debug!("Wrote committed checkpoint {} at {}", cp.id, commit);
        Ok(cp.id.clone())
    }

    /// Read one committed checkpoint by id
    pub fn read_committed(&self, id: &CheckpointId) -> Result<Checkpoint, StoreError> {
        let tip = self
            .committed_tip()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.read_committed_at(&tip, id)
    }

    fn read_committed_at(&self, tip: &str, id: &CheckpointId) -> Result<Checkpoint, StoreError> {
        let raw = self
            .repo
            .show_file(tip, &layout::metadata_path(id))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let metadata: CheckpointMetadata =
            serde_json::from_slice(&raw).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        // Payload blobs default to zero values when absent or unreadable.
        let transcript = self
            .repo
            .show_file(tip, &layout::transcript_path(id))?
            .unwrap_or_default();
        let prompts = self
            .repo
            .show_file(tip, &layout::prompts_path(id))?
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .unwrap_or_default();
        let context = self
            .repo
            .show_file(tip, &layout::context_path(id))?
            .map(|raw| String::from_utf8_lossy(&raw).to_string())
            .unwrap_or_default();
        let summary = self
            .repo
            .show_file(tip, &layout::summary_path(id))?
            .and_then(|raw| serde_json::from_slice(&raw).ok());

        Ok(metadata.into_checkpoint(transcript, prompts, context, summary))
    }

    /// All committed checkpoints, oldest first
    ///
    /// A repository with zero checkpoints yields an empty list. Entries
    /// whose metadata no longer parses are skipped with a warning rather
    /// than failing the scan.
    pub fn list_committed(&self) -> Result<Vec<Checkpoint>, StoreError> {
        let Some(tip) = self.committed_tip()? else {
            return Ok(Vec::new());
        };

        let mut ids = self.repo.ls_tree_names(&tip, "checkpoints")?;
        ids.sort();

        let mut checkpoints = Vec::with_capacity(ids.len());
        for id in ids {
            let id = CheckpointId::from_string(id);
            match self.read_committed_at(&tip, &id) {
                Ok(cp) => checkpoints.push(cp),
                Err(e) => warn!("Skipping unreadable checkpoint {}: {}", id, e),
            }
        }
        Ok(checkpoints)
    }

    /// The only post-write mutation: amend a committed checkpoint's summary
    ///
    /// Idempotent; an identical summary produces no new commit. Transcript
    /// and files-touched are never touched.
    pub fn update_summary(
        &self,
        id: &CheckpointId,
        summary: &CheckpointSummary,
    ) -> Result<(), StoreError> {
        match self.try_update_summary(id, summary) {
            Err(e) if e.is_retryable() => {
                warn!("Committed ref moved during summary update; retrying once");
                self.try_update_summary(id, summary).map_err(|e| {
                    if e.is_retryable() {
                        StoreError::RefContention(layout::COMMITTED_REF.to_string())
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }

    fn try_update_summary(
        &self,
        id: &CheckpointId,
        summary: &CheckpointSummary,
    ) -> Result<(), StoreError> {
        let tip = self
            .committed_tip()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if self
            .repo
            .show_file(&tip, &layout::metadata_path(id))?
            .is_none()
        {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let existing: Option<CheckpointSummary> = self
            .repo
            .show_file(&tip, &layout::summary_path(id))?
            .and_then(|raw| serde_json::from_slice(&raw).ok());
        if existing.as_ref() == Some(summary) {
            debug!("Summary for {} unchanged; skipping write", id);
            return Ok(());
        }

        let edits = vec![TreeEdit::put(
            layout::summary_path(id),
            serde_json::to_vec_pretty(summary).map_err(|e| StoreError::Corrupt(e.to_string()))?,
        )];
        let message = format!("waymark: update summary {}", id);
        let commit = self
            .repo
            .commit_edited_tree(Some(&tip), &edits, &[&tip], &message)?;
        self.repo
            .update_ref_cas(layout::COMMITTED_REF, &commit, Some(&tip))?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Session records
    // ------------------------------------------------------------------------

    fn read_session_at(
        &self,
        tip: Option<&str>,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>, StoreError> {
        let Some(tip) = tip else {
            return Ok(None);
        };
        let Some(raw) = self.repo.show_file(tip, &layout::session_path(session_id))? else {
            return Ok(None);
        };
        match serde_json::from_slice(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Malformed session record {}: {}", session_id, e);
                Ok(None)
            }
        }
    }

    /// Durable record of a session, if the session has committed anything
    pub fn read_session(&self, session_id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let tip = self.committed_tip()?;
        self.read_session_at(tip.as_deref(), session_id)
    }

    /// All session records, oldest first
    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let Some(tip) = self.committed_tip()? else {
            return Ok(Vec::new());
        };
        let mut names = self.repo.ls_tree_names(&tip, "sessions")?;
        names.sort();

        let mut sessions = Vec::with_capacity(names.len());
        for name in names {
            let id = SessionId::from_string(name.trim_end_matches(".json"));
            if let Some(record) = self.read_session_at(Some(&tip), &id)? {
                sessions.push(record);
            }
        }
        Ok(sessions)
    }

    /// Newest content visible for a session, with zero-value defaults
    ///
    /// Prefers the live temporary checkpoint, then the newest committed
    /// checkpoint. A session with nothing persisted yields the default.
    pub fn read_latest_session_content(
        &self,
        session_id: &SessionId,
    ) -> Result<SessionContent, StoreError> {
        if let Some(cp) = self.live_temporary(session_id)? {
            return Ok(SessionContent {
                transcript: cp.transcript,
                prompts: cp.prompts,
                context: cp.context,
                summary: cp.summary,
            });
        }

        let Some(record) = self.read_session(session_id)? else {
            return Ok(SessionContent::default());
        };
        let Some(newest) = record.checkpoints.last() else {
            return Ok(SessionContent::default());
        };
        match self.read_committed(newest) {
            Ok(cp) => Ok(SessionContent {
                transcript: cp.transcript,
                prompts: cp.prompts,
                context: cp.context,
                summary: cp.summary,
            }),
            Err(StoreError::NotFound(_)) => Ok(SessionContent::default()),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------------
    // Temporary checkpoints
    // ------------------------------------------------------------------------

    /// Create or overwrite the single live temporary checkpoint for a session
    ///
    /// The session metadata directory must already exist; strategies create
    /// it at first prompt. The snapshot supersedes any previous one on the
    /// shadow branch rather than stacking onto it.
    pub fn write_temporary(&self, cp: &Checkpoint) -> Result<CheckpointId, StoreError> {
        let dir = SessionDir::new(self.repo.root(), &cp.session_id);
        if !dir.exists() {
            return Err(StoreError::MetadataDirMissing(dir.path().to_path_buf()));
        }

        // Metadata files land in the working tree first so the snapshot
        // carries its own description.
        dir.write(TRANSCRIPT_FILE, &cp.transcript)?;
        dir.write(
            waymark_foundation::storage::PROMPT_FILE,
            cp.prompts.join("\n\n").as_bytes(),
        )?;
        if !cp.context.is_empty() {
            dir.write(CONTEXT_FILE, cp.context.as_bytes())?;
        }
        let mut described = cp.clone();
        described.transcript = Vec::new();
        dir.write(
            "checkpoint.json",
            &serde_json::to_vec_pretty(&described)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        )?;

        match self.try_snapshot(cp) {
            Err(e) if e.is_retryable() => {
                warn!("Shadow ref moved during snapshot of {}; retrying once", cp.id);
                self.try_snapshot(cp).map_err(|e| {
                    if e.is_retryable() {
                        StoreError::RefContention(layout::shadow_ref(&cp.session_id))
                    } else {
                        e
                    }
                })
            }
            other => other,
        }
    }

    fn try_snapshot(&self, cp: &Checkpoint) -> Result<CheckpointId, StoreError> {
        let shadow = layout::shadow_ref(&cp.session_id);
        let old_tip = self.repo.resolve(&shadow)?;

        // Supersede: reuse the previous snapshot's parent instead of
        // chaining, so the branch never grows past one live snapshot.
        let parent = match old_tip.as_deref() {
            Some(tip) => self.repo.resolve(&format!("{}^", tip))?,
            None => self.repo.resolve("HEAD")?,
        };

        let message = format!(
            "waymark: temporary checkpoint for {}\n\n{}: {}",
            cp.session_id,
            trailer::CHECKPOINT_TRAILER,
            cp.id
        );
        let parents: Vec<&str> = parent.as_deref().into_iter().collect();
        let commit = self.repo.snapshot_worktree(&parents, &message)?;

        self.repo
            .update_ref_cas(&shadow, &commit, old_tip.as_deref())?;

        debug!(
            "Wrote temporary checkpoint {} for {} at {}",
            cp.id, cp.session_id, commit
        );
        Ok(cp.id.clone())
    }

    /// Commit id of a session's live shadow snapshot
    pub fn shadow_tip(&self, session_id: &SessionId) -> Result<Option<String>, StoreError> {
        Ok(self.repo.resolve(&layout::shadow_ref(session_id))?)
    }

    /// The live temporary checkpoint for a session, if one exists
    pub fn live_temporary(&self, session_id: &SessionId) -> Result<Option<Checkpoint>, StoreError> {
        let Some(tip) = self.shadow_tip(session_id)? else {
            return Ok(None);
        };

        let dir_prefix = format!(".waymark/sessions/{}", session_id);
        let described = self
            .repo
            .show_file(&tip, &format!("{}/checkpoint.json", dir_prefix))?;

        let mut cp = match described.and_then(|raw| serde_json::from_slice::<Checkpoint>(&raw).ok())
        {
            Some(cp) => cp,
            None => {
                // Snapshot predates the sidecar or the dir was ignored; fall
                // back to the id carried in the commit message.
                let message = self.repo.commit_message(&tip)?;
                let Some(id) = trailer::parse(&message) else {
                    return Ok(None);
                };
                Checkpoint::new(session_id.clone()).with_id(id)
            }
        };

        if let Some(transcript) = self
            .repo
            .show_file(&tip, &format!("{}/{}", dir_prefix, TRANSCRIPT_FILE))?
        {
            cp.transcript = transcript;
        }
        Ok(Some(cp))
    }
}
