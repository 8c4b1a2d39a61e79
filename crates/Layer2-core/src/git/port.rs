//! Repository port
//!
//! The narrow seam between logical checkpoint operations and the
//! version-control substrate. The store, shadow-branch manager, and rewind
//! engine only ever talk to this trait, so the substrate can be swapped
//! without touching the state machine or strategies.

use super::ops::{GitError, GitOps, GitStatus};
use std::path::Path;

/// A content edit applied on top of a base tree
#[derive(Debug, Clone)]
pub enum TreeEdit {
    /// Write `content` at `path`, replacing any existing entry
    Put { path: String, content: Vec<u8> },

    /// Remove `path` (recursively for directories)
    Delete { path: String },
}

impl TreeEdit {
    pub fn put(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        TreeEdit::Put {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        TreeEdit::Delete { path: path.into() }
    }
}

/// Object/ref primitives the checkpoint engine consumes
pub trait Repository: Send + Sync {
    /// Top of the working tree
    fn root(&self) -> &Path;

    fn current_branch(&self) -> Result<String, GitError>;

    /// Resolve a rev to a commit id; `None` when it does not resolve
    fn resolve(&self, rev: &str) -> Result<Option<String>, GitError>;

    fn ref_exists(&self, name: &str) -> bool;

    /// Atomic compare-and-swap ref update; `None` means "must not exist"
    fn update_ref_cas(
        &self,
        name: &str,
        new: &str,
        expected_old: Option<&str>,
    ) -> Result<(), GitError>;

    fn delete_ref(&self, name: &str) -> Result<(), GitError>;

    /// Full names of refs under a prefix
    fn list_refs(&self, prefix: &str) -> Result<Vec<String>, GitError>;

    /// Commits reachable from `rev`, newest first, optionally bounded
    fn rev_list(&self, rev: &str, max: Option<usize>) -> Result<Vec<String>, GitError>;

    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, GitError>;

    fn commit_exists(&self, commit: &str) -> bool;

    /// Read `commit:path`; `None` when the path is absent
    fn show_file(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, GitError>;

    /// Immediate child names under `commit:path`
    fn ls_tree_names(&self, commit: &str, path: &str) -> Result<Vec<String>, GitError>;

    /// Every file path in a commit's tree
    fn ls_files(&self, commit: &str) -> Result<Vec<String>, GitError>;

    /// Every file in the working tree: tracked plus untracked, minus ignored
    fn worktree_files(&self) -> Result<Vec<String>, GitError>;

    /// `(status, path)` changes between a commit's tree and the working tree
    fn diff_worktree(&self, commit: &str) -> Result<Vec<(char, String)>, GitError>;

    /// Build a tree from `base`'s tree plus `edits` and wrap it in a commit
    /// object, without touching HEAD or the working tree
    fn commit_edited_tree(
        &self,
        base: Option<&str>,
        edits: &[TreeEdit],
        parents: &[&str],
        message: &str,
    ) -> Result<String, GitError>;

    /// Snapshot the entire working tree (respecting ignores) as a commit
    /// object, without touching HEAD or the real index
    fn snapshot_worktree(&self, parents: &[&str], message: &str) -> Result<String, GitError>;

    /// Stage `paths` and commit them on the active branch
    fn commit_paths(&self, message: &str, paths: &[String]) -> Result<String, GitError>;

    fn commit_message(&self, commit: &str) -> Result<String, GitError>;

    fn status(&self, paths: Option<&[String]>) -> Result<GitStatus, GitError>;

    fn default_branch(&self) -> Option<String>;
}

impl Repository for GitOps {
    fn root(&self) -> &Path {
        GitOps::root(self)
    }

    fn current_branch(&self) -> Result<String, GitError> {
        GitOps::current_branch(self)
    }

    fn resolve(&self, rev: &str) -> Result<Option<String>, GitError> {
        GitOps::resolve(self, rev)
    }

    fn ref_exists(&self, name: &str) -> bool {
        GitOps::ref_exists(self, name)
    }

    fn update_ref_cas(
        &self,
        name: &str,
        new: &str,
        expected_old: Option<&str>,
    ) -> Result<(), GitError> {
        GitOps::update_ref_cas(self, name, new, expected_old)
    }

    fn delete_ref(&self, name: &str) -> Result<(), GitError> {
        GitOps::delete_ref(self, name)
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<String>, GitError> {
        GitOps::list_refs(self, prefix)
    }

    fn rev_list(&self, rev: &str, max: Option<usize>) -> Result<Vec<String>, GitError> {
        GitOps::rev_list(self, rev, max)
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, GitError> {
        GitOps::merge_base(self, a, b)
    }

    fn commit_exists(&self, commit: &str) -> bool {
        GitOps::commit_exists(self, commit)
    }

    fn show_file(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, GitError> {
        GitOps::show_file(self, commit, path)
    }

    fn ls_tree_names(&self, commit: &str, path: &str) -> Result<Vec<String>, GitError> {
        GitOps::ls_tree_names(self, commit, path)
    }

    fn ls_files(&self, commit: &str) -> Result<Vec<String>, GitError> {
        GitOps::ls_files(self, commit)
    }

    fn worktree_files(&self) -> Result<Vec<String>, GitError> {
        GitOps::worktree_files(self)
    }

    fn diff_worktree(&self, commit: &str) -> Result<Vec<(char, String)>, GitError> {
        GitOps::diff_worktree(self, commit)
    }

    fn commit_edited_tree(
        &self,
        base: Option<&str>,
        edits: &[TreeEdit],
        parents: &[&str],
        message: &str,
    ) -> Result<String, GitError> {
        let index = self.temp_index();
        match base {
            Some(commit) => index.read_tree(Some(&format!("{}^{{tree}}", commit)))?,
            None => index.read_tree(None)?,
        }
        for edit in edits {
            match edit {
                TreeEdit::Put { path, content } => {
                    let oid = self.hash_object(content)?;
                    index.add_blob(&oid, path)?;
                }
                TreeEdit::Delete { path } => {
                    index.remove(path)?;
                }
            }
        }
        let tree = index.write_tree()?;
        self.commit_tree(&tree, parents, message)
    }

    fn snapshot_worktree(&self, parents: &[&str], message: &str) -> Result<String, GitError> {
        let index = self.temp_index();
        index.read_tree(None)?;
        index.add_all_worktree()?;
        let tree = index.write_tree()?;
        self.commit_tree(&tree, parents, message)
    }

    fn commit_paths(&self, message: &str, paths: &[String]) -> Result<String, GitError> {
        GitOps::commit_paths(self, message, paths)
    }

    fn commit_message(&self, commit: &str) -> Result<String, GitError> {
        GitOps::commit_message(self, commit)
    }

    fn status(&self, paths: Option<&[String]>) -> Result<GitStatus, GitError> {
        GitOps::status(self, paths)
    }

    fn default_branch(&self) -> Option<String> {
        GitOps::default_branch(self)
    }
}
