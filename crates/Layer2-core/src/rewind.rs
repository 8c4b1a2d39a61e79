//! Rewind Engine
//!
//! Restores working-tree (and session log) state to a prior checkpoint,
//! file by file: files created after the target are deleted, files deleted
//! after it are recreated, modified files are restored byte-for-byte. A
//! target whose file snapshot is no longer reachable is logs-only and
//! fails with `NotRestorable` before anything is touched. A restore that
//! fails partway is reported as an explicit inconsistent state, never
//! silently partial and never auto-rolled-back (rollback would itself need
//! a second restorable snapshot).

use crate::git::{GitError, Repository};
use crate::shadow::ShadowBranchManager;
use crate::store::{CheckpointStore, StoreError};
use crate::trailer;

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use waymark_foundation::{Checkpoint, CheckpointId, RewindPoint, WaymarkConfig};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum RewindError {
    #[error("Rewind target not found: {0}")]
    TargetNotFound(String),

    #[error("Checkpoint {0} is logs-only; its file snapshot is no longer reachable")]
    NotRestorable(String),

    #[error(
        "Rewind to {target} left the working tree inconsistent: \
         {restored} file(s) changed before the first failure ({first_error})"
    )]
    PartialFailure {
        target: String,
        restored: usize,
        failed: Vec<(String, String)>,
        first_error: String,
    },

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What a successful rewind did
#[derive(Debug, Clone)]
pub struct RewindReport {
    pub target: CheckpointId,

    /// Snapshot commit the tree was restored from
    pub snapshot: String,

    /// Files written (recreated or reverted)
    pub restored: Vec<String>,

    /// Files removed because they postdate the target
    pub deleted: Vec<String>,
}

// Ephemeral bookkeeping that a rewind must not clobber.
const SKIP_PREFIXES: &[&str] = &[".waymark/state/", ".waymark/cache/", ".waymark/review/"];

fn skip_path(path: &str) -> bool {
    SKIP_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

// ============================================================================
// RewindEngine
// ============================================================================

pub struct RewindEngine {
    repo: Arc<dyn Repository>,
    config: WaymarkConfig,
}

impl RewindEngine {
    pub fn new(repo: Arc<dyn Repository>, config: WaymarkConfig) -> Self {
        Self { repo, config }
    }

    fn store(&self) -> CheckpointStore {
        CheckpointStore::new(self.repo.clone())
    }

    fn shadow(&self) -> ShadowBranchManager {
        ShadowBranchManager::new(self.repo.clone())
    }

    /// First snapshot commit of a checkpoint that still exists
    fn snapshot_commit(&self, cp: &Checkpoint) -> Option<String> {
        [cp.linked_commit.as_deref(), cp.condensed_from.as_deref()]
            .into_iter()
            .flatten()
            .find(|commit| self.repo.commit_exists(commit))
            .map(|commit| commit.to_string())
    }

    /// Resolve a target id to its checkpoint and (maybe) snapshot commit
    fn resolve_target(
        &self,
        id: &CheckpointId,
    ) -> Result<(Checkpoint, Option<String>), RewindError> {
        let store = self.store();

        // Live temporary checkpoints win: they are newer than anything
        // committed for their session.
        for session_id in self.shadow().list()? {
            if let Some(temp) = store.live_temporary(&session_id)? {
                if temp.id == *id {
                    let snapshot = store.shadow_tip(&session_id)?;
                    return Ok((temp, snapshot));
                }
            }
        }

        match store.read_committed(id) {
            Ok(cp) => {
                let snapshot = self.snapshot_commit(&cp);
                Ok((cp, snapshot))
            }
            Err(StoreError::NotFound(_)) => Err(RewindError::TargetNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Restore working-tree and session-log state to the target checkpoint
    pub fn rewind(&self, id: &CheckpointId) -> Result<RewindReport, RewindError> {
        let (cp, snapshot) = self.resolve_target(id)?;
        let Some(snapshot) = snapshot else {
            return Err(RewindError::NotRestorable(id.to_string()));
        };

        info!("Rewinding to checkpoint {} (snapshot {})", cp.id, snapshot);

        let target_files: Vec<String> = self
            .repo
            .ls_files(&snapshot)?
            .into_iter()
            .filter(|path| !skip_path(path))
            .collect();
        let target_set: HashSet<&str> = target_files.iter().map(|s| s.as_str()).collect();

        let mut restored = Vec::new();
        let mut deleted = Vec::new();
        let mut failed: Vec<(String, String)> = Vec::new();

        // Files that postdate the target go away first.
        for path in self.repo.worktree_files()? {
            if skip_path(&path) || target_set.contains(path.as_str()) {
                continue;
            }
            let absolute = self.repo.root().join(&path);
            match std::fs::remove_file(&absolute) {
                Ok(()) => deleted.push(path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => failed.push((path, e.to_string())),
            }
        }

        // Then every file the target knew about comes back byte-for-byte.
        for path in &target_files {
            match self.restore_file(&snapshot, path) {
                Ok(true) => restored.push(path.clone()),
                Ok(false) => {}
                Err(e) => failed.push((path.clone(), e)),
            }
        }

        if !failed.is_empty() {
            let first_error = format!("{}: {}", failed[0].0, failed[0].1);
            warn!(
                "Rewind to {} failed on {} file(s); tree is inconsistent",
                id,
                failed.len()
            );
            return Err(RewindError::PartialFailure {
                target: id.to_string(),
                restored: restored.len() + deleted.len(),
                failed,
                first_error,
            });
        }

        Ok(RewindReport {
            target: cp.id,
            snapshot,
            restored,
            deleted,
        })
    }

    /// Write one file from the snapshot if the working copy differs;
    /// returns whether anything was written
    fn restore_file(&self, snapshot: &str, path: &str) -> Result<bool, String> {
        let content = self
            .repo
            .show_file(snapshot, path)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "blob missing from snapshot".to_string())?;

        let absolute = self.repo.root().join(path);
        if let Ok(current) = std::fs::read(&absolute) {
            if current == content {
                return Ok(false);
            }
        }

        if let Some(parent) = absolute.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&absolute, content).map_err(|e| e.to_string())?;
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Rewind points
    // ------------------------------------------------------------------------

    /// Restore candidates: live temporaries merged with committed
    /// checkpoints reachable from HEAD back to the default-branch
    /// merge-base (or the last N commits without one), de-duplicated by
    /// checkpoint id, newest first
    pub fn rewind_points(&self, limit: usize) -> Result<Vec<RewindPoint>, RewindError> {
        let store = self.store();
        let mut points = Vec::new();

        for session_id in self.shadow().list()? {
            let Some(temp) = store.live_temporary(&session_id)? else {
                continue;
            };
            points.push(RewindPoint {
                id: temp.id.to_string(),
                checkpoint_id: temp.id.clone(),
                session_id,
                date: temp.created_at,
                is_logs_only: false,
                condensation_id: None,
            });
        }

        for commit in self.reachable_window()? {
            let message = self.repo.commit_message(&commit)?;
            let Some(checkpoint_id) = trailer::parse(&message) else {
                continue;
            };
            match store.read_committed(&checkpoint_id) {
                Ok(cp) => {
                    // The trailer-bearing commit itself is a valid snapshot
                    // even when the recorded ones have been rebased away.
                    let is_logs_only =
                        self.snapshot_commit(&cp).is_none() && !self.repo.commit_exists(&commit);
                    let condensation_id = cp.condensed_from.as_ref().map(|_| cp.id.clone());
                    points.push(RewindPoint {
                        id: cp.id.to_string(),
                        checkpoint_id: cp.id,
                        session_id: cp.session_id,
                        date: cp.created_at,
                        is_logs_only,
                        condensation_id,
                    });
                }
                Err(StoreError::NotFound(_)) => {
                    debug!(
                        "Commit {} references unknown checkpoint {}; skipping",
                        commit, checkpoint_id
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        points.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| b.id.cmp(&a.id)));
        let mut seen = HashSet::new();
        points.retain(|point| seen.insert(point.checkpoint_id.clone()));
        points.truncate(limit);
        Ok(points)
    }

    /// Commits considered when scanning for committed rewind points
    fn reachable_window(&self) -> Result<Vec<String>, RewindError> {
        let Some(head) = self.repo.resolve("HEAD")? else {
            return Ok(Vec::new());
        };

        let base = self
            .repo
            .default_branch()
            .and_then(|branch| self.repo.merge_base("HEAD", &branch).ok().flatten())
            .filter(|base| *base != head);

        let window = match base {
            Some(base) => self.repo.rev_list(&format!("{}..HEAD", base), None)?,
            None => self
                .repo
                .rev_list("HEAD", Some(self.config.rewind_scan_limit))?,
        };
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_paths() {
        assert!(skip_path(".waymark/state/20260101-000000-aaaaaa.json"));
        assert!(skip_path(".waymark/cache/insights/x.json"));
        assert!(!skip_path(".waymark/sessions/20260101-000000-aaaaaa/transcript.jsonl"));
        assert!(!skip_path("src/main.rs"));
    }
}
