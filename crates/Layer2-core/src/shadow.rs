//! Shadow Branch Manager
//!
//! One ephemeral, tool-owned branch per session holds the session's
//! pre-commit snapshots, invisible in normal history. Naming is
//! deterministic so repeated invocations land on the same branch; the
//! branch is created lazily by the first temporary checkpoint and holds at
//! most one live snapshot at a time.

use crate::git::{GitError, Repository};
use crate::store::layout::{shadow_ref, SHADOW_REF_PREFIX};

use std::sync::Arc;
use tracing::{debug, warn};
use waymark_foundation::SessionId;

/// Outcome of a bulk shadow-branch deletion
///
/// Deletion is per-branch transactional: one branch failing never blocks
/// the others, and the caller always learns exactly what happened.
#[derive(Debug, Default)]
pub struct DeletionReport {
    /// Refs that were deleted (or already gone)
    pub deleted: Vec<String>,

    /// Refs that could not be deleted, with the error text
    pub failures: Vec<(String, String)>,
}

impl DeletionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Manages per-session shadow branches
pub struct ShadowBranchManager {
    repo: Arc<dyn Repository>,
}

impl ShadowBranchManager {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Deterministic ref name for a session's shadow branch
    pub fn branch_for(session_id: &SessionId) -> String {
        shadow_ref(session_id)
    }

    /// Commit at the tip of a session's shadow branch
    pub fn tip(&self, session_id: &SessionId) -> Result<Option<String>, GitError> {
        self.repo.resolve(&Self::branch_for(session_id))
    }

    pub fn exists(&self, session_id: &SessionId) -> bool {
        self.repo.ref_exists(&Self::branch_for(session_id))
    }

    /// Sessions that currently have a shadow branch
    pub fn list(&self) -> Result<Vec<SessionId>, GitError> {
        let refs = self.repo.list_refs(SHADOW_REF_PREFIX)?;
        Ok(refs
            .iter()
            .filter_map(|name| name.strip_prefix(SHADOW_REF_PREFIX))
            .map(SessionId::from_string)
            .collect())
    }

    /// Whether `commit` is an ancestor of (or at) the shadow tip
    ///
    /// The scan is bounded by `depth_limit` commits so reachability checks
    /// stay tractable against long histories; a commit buried deeper than
    /// the limit reports as unreachable.
    pub fn is_reachable(
        &self,
        commit: &str,
        session_id: &SessionId,
        depth_limit: usize,
    ) -> Result<bool, GitError> {
        let branch = Self::branch_for(session_id);
        if !self.repo.ref_exists(&branch) {
            return Ok(false);
        }
        let ancestors = self.repo.rev_list(&branch, Some(depth_limit))?;
        Ok(ancestors.iter().any(|oid| oid == commit))
    }

    /// Delete one session's shadow branch; already-gone is success
    pub fn delete(&self, session_id: &SessionId) -> Result<(), GitError> {
        let branch = Self::branch_for(session_id);
        self.repo.delete_ref(&branch)?;
        debug!("Deleted shadow branch {}", branch);
        Ok(())
    }

    /// Delete shadow branches for many sessions, reporting partial success
    pub fn delete_all(&self, session_ids: &[SessionId]) -> DeletionReport {
        let mut report = DeletionReport::default();
        for session_id in session_ids {
            let branch = Self::branch_for(session_id);
            match self.repo.delete_ref(&branch) {
                Ok(()) => report.deleted.push(branch),
                Err(e) => {
                    warn!("Failed to delete shadow branch {}: {}", branch, e);
                    report.failures.push((branch, e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_naming_deterministic() {
        let id = SessionId::from_string("20260101-090000-abc123");
        assert_eq!(
            ShadowBranchManager::branch_for(&id),
            ShadowBranchManager::branch_for(&id)
        );
        assert!(ShadowBranchManager::branch_for(&id).starts_with(SHADOW_REF_PREFIX));
    }

    #[test]
    fn test_deletion_report_complete() {
        let mut report = DeletionReport::default();
        report.deleted.push("refs/waymark/shadow/a".into());
        assert!(report.is_complete());
        report
            .failures
            .push(("refs/waymark/shadow/b".into(), "locked".into()));
        assert!(!report.is_complete());
    }
}
