//! Git Operations
//!
//! All access to the host repository goes through shell commands against
//! the `git` binary. Porcelain verbs cover status and commits; plumbing
//! verbs (hash-object, write-tree, commit-tree, update-ref) realize the
//! checkpoint store's object writes. Every ref write is a single
//! compare-and-swap `update-ref`; a lost race surfaces as the retryable
//! `GitError::RefConflict`, never as a partial write.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Not a git repository: {0}")]
    NotARepository(PathBuf),

    #[error("Git command failed: {0}")]
    CommandFailed(String),

    #[error("Ref update lost a race: {0}")]
    RefConflict(String),

    #[error("No changes to commit")]
    NothingToCommit,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Whether re-running the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, GitError::RefConflict(_))
    }
}

/// The all-zero object id git uses for "must not exist" in update-ref
pub const ZERO_OID: &str = "0000000000000000000000000000000000000000";

// ============================================================================
// Git Status Types
// ============================================================================

/// Status of a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    New,
    Modified,
    Deleted,
    Untracked,
}

/// Working-tree status snapshot
#[derive(Debug, Clone, Default)]
pub struct GitStatus {
    /// Current branch name
    pub branch: Option<String>,

    /// Files with their status
    pub files: Vec<(PathBuf, FileStatus)>,
}

// ============================================================================
// Git Operations
// ============================================================================

/// Git operations handler rooted at a repository
pub struct GitOps {
    /// Repository root directory (top of the working tree)
    root: PathBuf,

    /// Resolved `.git` directory
    git_dir: PathBuf,

    /// Author/committer identity for checkpoint objects
    author_name: String,
    author_email: String,
}

impl GitOps {
    /// Open the repository containing `path`
    pub fn new(path: impl AsRef<Path>) -> Result<Self, GitError> {
        let path = path.as_ref();
        let root = Self::find_git_root(path)?;
        let git_dir = Self::resolve_git_dir(&root)?;

        Ok(Self {
            root,
            git_dir,
            author_name: "waymark".to_string(),
            author_email: "waymark@localhost".to_string(),
        })
    }

    /// Set the identity stamped on checkpoint commits
    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    /// Find the repository root by walking up from `path`
    fn find_git_root(path: &Path) -> Result<PathBuf, GitError> {
        let mut current = if path.is_file() {
            path.parent().unwrap_or(path).to_path_buf()
        } else {
            path.to_path_buf()
        };

        loop {
            if current.join(".git").exists() {
                return Ok(current);
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                return Err(GitError::NotARepository(path.to_path_buf()));
            }
        }
    }

    fn resolve_git_dir(root: &Path) -> Result<PathBuf, GitError> {
        let output = Command::new("git")
            .args(["rev-parse", "--absolute-git-dir"])
            .current_dir(root)
            .output()?;
        if !output.status.success() {
            return Err(GitError::NotARepository(root.to_path_buf()));
        }
        Ok(PathBuf::from(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    /// Repository root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if a directory is inside a git repository
    pub fn is_repo(path: impl AsRef<Path>) -> bool {
        Self::find_git_root(path.as_ref()).is_ok()
    }

    /// Whether the `git` binary is available at all
    pub fn git_available() -> bool {
        which::which("git").is_ok()
    }

    // ------------------------------------------------------------------------
    // Subprocess plumbing
    // ------------------------------------------------------------------------

    fn run_git_raw(
        &self,
        args: &[&str],
        envs: &[(&str, OsString)],
        stdin: Option<&[u8]>,
    ) -> Result<Vec<u8>, GitError> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.root);
        for (key, value) in envs {
            cmd.env(key, value);
        }

        debug!("git {}", args.join(" "));

        let output = if let Some(bytes) = stdin {
            cmd.stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
            let mut child = cmd.spawn()?;
            child
                .stdin
                .as_mut()
                .expect("piped stdin")
                .write_all(bytes)?;
            child.wait_with_output()?
        } else {
            cmd.output()?
        };

        if output.status.success() {
            Ok(output.stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("cannot lock ref") || stderr.contains("but expected") {
                Err(GitError::RefConflict(stderr))
            } else {
                Err(GitError::CommandFailed(stderr))
            }
        }
    }

    /// Run a git command, returning trimmed stdout
    fn run_git(&self, args: &[&str]) -> Result<String, GitError> {
        let out = self.run_git_raw(args, &[], None)?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    fn author_envs(&self) -> Vec<(&'static str, OsString)> {
        vec![
            ("GIT_AUTHOR_NAME", OsString::from(&self.author_name)),
            ("GIT_AUTHOR_EMAIL", OsString::from(&self.author_email)),
            ("GIT_COMMITTER_NAME", OsString::from(&self.author_name)),
            ("GIT_COMMITTER_EMAIL", OsString::from(&self.author_email)),
        ]
    }

    // ------------------------------------------------------------------------
    // Porcelain
    // ------------------------------------------------------------------------

    /// Current branch name
    pub fn current_branch(&self) -> Result<String, GitError> {
        self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Working-tree status, optionally narrowed to specific paths
    pub fn status(&self, paths: Option<&[String]>) -> Result<GitStatus, GitError> {
        let branch = self.current_branch().ok();

        let mut args = vec!["status", "--porcelain=v1", "--untracked-files=all"];
        if let Some(paths) = paths {
            args.push("--");
            args.extend(paths.iter().map(|p| p.as_str()));
        }

        let output = self.run_git(&args)?;
        let mut status = GitStatus {
            branch,
            ..Default::default()
        };

        for line in output.lines() {
            if line.len() < 3 {
                continue;
            }
            let index_status = line.chars().next().unwrap_or(' ');
            let worktree_status = line.chars().nth(1).unwrap_or(' ');
            let file_path = PathBuf::from(line[3..].trim_matches('"'));

            let file_status = match (index_status, worktree_status) {
                ('?', '?') => FileStatus::Untracked,
                ('A', _) | (_, 'A') => FileStatus::New,
                ('D', _) | (_, 'D') => FileStatus::Deleted,
                _ => FileStatus::Modified,
            };
            status.files.push((file_path, file_status));
        }

        Ok(status)
    }

    /// Current HEAD commit hash
    pub fn head(&self) -> Result<String, GitError> {
        self.run_git(&["rev-parse", "HEAD"])
    }

    /// Stage the given paths and commit them on the active branch
    pub fn commit_paths(&self, message: &str, paths: &[String]) -> Result<String, GitError> {
        if paths.is_empty() {
            return Err(GitError::NothingToCommit);
        }
        let mut add_args = vec!["add", "--"];
        add_args.extend(paths.iter().map(|p| p.as_str()));
        self.run_git(&add_args)?;

        let staged = self.run_git(&["diff", "--cached", "--name-only"])?;
        if staged.is_empty() {
            return Err(GitError::NothingToCommit);
        }

        let envs = self.author_envs();
        self.run_git_raw(&["commit", "-m", message], &envs, None)?;
        self.head()
    }

    /// Full commit message of a commit
    pub fn commit_message(&self, commit: &str) -> Result<String, GitError> {
        let out = self.run_git_raw(&["show", "-s", "--format=%B", commit], &[], None)?;
        Ok(String::from_utf8_lossy(&out).to_string())
    }

    // ------------------------------------------------------------------------
    // Object plumbing
    // ------------------------------------------------------------------------

    /// Write a blob into the object database, returning its id
    pub fn hash_object(&self, content: &[u8]) -> Result<String, GitError> {
        let out = self.run_git_raw(&["hash-object", "-w", "--stdin"], &[], Some(content))?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    /// Read a file out of a commit's tree; `None` when the path is absent
    pub fn show_file(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, GitError> {
        let spec = format!("{}:{}", commit, path);
        match self.run_git_raw(&["cat-file", "blob", &spec], &[], None) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(GitError::CommandFailed(msg))
                if msg.contains("does not exist")
                    || msg.contains("Not a valid object name")
                    || msg.contains("bad file") =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Immediate child entry names under `commit:path`
    pub fn ls_tree_names(&self, commit: &str, path: &str) -> Result<Vec<String>, GitError> {
        let spec = if path.is_empty() {
            commit.to_string()
        } else {
            format!("{}:{}", commit, path)
        };
        match self.run_git(&["ls-tree", "--name-only", &spec]) {
            Ok(output) => Ok(output.lines().map(|l| l.to_string()).collect()),
            Err(GitError::CommandFailed(msg)) if msg.contains("Not a valid object name") => {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Every file path in a commit's tree
    pub fn ls_files(&self, commit: &str) -> Result<Vec<String>, GitError> {
        let output = self.run_git(&["ls-tree", "-r", "--name-only", commit])?;
        Ok(output.lines().map(|l| l.to_string()).collect())
    }

    /// Create a commit object without touching HEAD or the working tree
    pub fn commit_tree(
        &self,
        tree: &str,
        parents: &[&str],
        message: &str,
    ) -> Result<String, GitError> {
        let mut args = vec!["commit-tree", tree];
        for parent in parents {
            args.push("-p");
            args.push(parent);
        }
        args.push("-m");
        args.push(message);

        let envs = self.author_envs();
        let out = self.run_git_raw(&args, &envs, None)?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    // ------------------------------------------------------------------------
    // Temp-index tree building
    // ------------------------------------------------------------------------

    /// Scratch index for building trees without touching the real index
    pub fn temp_index(&self) -> TempIndex<'_> {
        let path = self
            .git_dir
            .join(format!("waymark-index-{}", uuid::Uuid::new_v4().simple()));
        TempIndex { git: self, path }
    }

    // ------------------------------------------------------------------------
    // Refs
    // ------------------------------------------------------------------------

    /// Resolve a rev to a commit id; `None` when it does not resolve
    pub fn resolve(&self, rev: &str) -> Result<Option<String>, GitError> {
        match self.run_git(&["rev-parse", "--verify", "--quiet", &format!("{}^{{commit}}", rev)]) {
            Ok(oid) if !oid.is_empty() => Ok(Some(oid)),
            Ok(_) => Ok(None),
            // --quiet exits non-zero with empty stderr on a miss
            Err(GitError::CommandFailed(msg)) if msg.is_empty() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn ref_exists(&self, name: &str) -> bool {
        self.run_git(&["show-ref", "--verify", "--quiet", name])
            .is_ok()
    }

    /// Atomically move a ref from `expected_old` to `new`
    ///
    /// `expected_old = None` requires the ref to not exist yet. A concurrent
    /// writer shows up as `GitError::RefConflict`; the caller re-reads and
    /// retries the whole write.
    pub fn update_ref_cas(
        &self,
        name: &str,
        new: &str,
        expected_old: Option<&str>,
    ) -> Result<(), GitError> {
        let old = expected_old.unwrap_or(ZERO_OID);
        self.run_git(&["update-ref", name, new, old])?;
        Ok(())
    }

    /// Delete a ref; missing refs are not an error
    pub fn delete_ref(&self, name: &str) -> Result<(), GitError> {
        match self.run_git(&["update-ref", "-d", name]) {
            Ok(_) => Ok(()),
            Err(GitError::CommandFailed(msg))
                if msg.contains("not exist") || msg.contains("unable to deref") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Commits reachable from `rev`, newest first, optionally bounded
    pub fn rev_list(&self, rev: &str, max: Option<usize>) -> Result<Vec<String>, GitError> {
        let max_arg;
        let mut args = vec!["rev-list"];
        if let Some(max) = max {
            max_arg = format!("--max-count={}", max);
            args.push(&max_arg);
        }
        args.push(rev);
        let output = self.run_git(&args)?;
        Ok(output.lines().map(|l| l.to_string()).collect())
    }

    /// Merge base of two revs, `None` when the histories are unrelated
    pub fn merge_base(&self, a: &str, b: &str) -> Result<Option<String>, GitError> {
        match self.run_git(&["merge-base", a, b]) {
            Ok(oid) if !oid.is_empty() => Ok(Some(oid)),
            Ok(_) => Ok(None),
            Err(GitError::CommandFailed(msg)) if msg.is_empty() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether a commit object exists in the object database
    pub fn commit_exists(&self, commit: &str) -> bool {
        self.run_git(&["cat-file", "-e", &format!("{}^{{commit}}", commit)])
            .is_ok()
    }

    /// Changes between a commit's tree and the working tree
    ///
    /// Returned as `(status, path)` where status is `A` (added since the
    /// commit), `D` (deleted since), or `M` (modified since).
    pub fn diff_worktree(&self, commit: &str) -> Result<Vec<(char, String)>, GitError> {
        let output = self.run_git(&["diff", "--name-status", commit])?;
        let mut changes = Vec::new();
        for line in output.lines() {
            let mut parts = line.splitn(2, '\t');
            let status = parts.next().and_then(|s| s.chars().next());
            let path = parts.next();
            if let (Some(status), Some(path)) = (status, path) {
                changes.push((status, path.to_string()));
            }
        }
        Ok(changes)
    }

    /// Every file currently in the working tree: tracked plus untracked,
    /// minus ignored
    pub fn worktree_files(&self) -> Result<Vec<String>, GitError> {
        let output = self.run_git(&["ls-files", "--cached", "--others", "--exclude-standard"])?;
        Ok(output.lines().map(|l| l.to_string()).collect())
    }

    /// Full names of refs under a prefix
    pub fn list_refs(&self, prefix: &str) -> Result<Vec<String>, GitError> {
        let output = self.run_git(&["for-each-ref", "--format=%(refname)", prefix])?;
        Ok(output.lines().map(|l| l.to_string()).collect())
    }

    /// Default branch of the repository, when one can be determined
    pub fn default_branch(&self) -> Option<String> {
        if let Ok(symref) = self.run_git(&["symbolic-ref", "refs/remotes/origin/HEAD"]) {
            if let Some(name) = symref.strip_prefix("refs/remotes/") {
                return Some(name.to_string());
            }
        }
        for candidate in ["main", "master"] {
            if self.ref_exists(&format!("refs/heads/{}", candidate)) {
                return Some(candidate.to_string());
            }
        }
        None
    }
}

// ============================================================================
// TempIndex
// ============================================================================

/// A scratch `GIT_INDEX_FILE` for plumbing tree builds
///
/// Removed from disk on drop, so an interrupted build leaves no state.
pub struct TempIndex<'a> {
    git: &'a GitOps,
    path: PathBuf,
}

impl TempIndex<'_> {
    fn envs(&self) -> Vec<(&'static str, OsString)> {
        vec![("GIT_INDEX_FILE", OsString::from(&self.path))]
    }

    /// Load a tree into the index, or start empty with `None`
    pub fn read_tree(&self, tree: Option<&str>) -> Result<(), GitError> {
        let envs = self.envs();
        match tree {
            Some(tree) => self.git.run_git_raw(&["read-tree", tree], &envs, None)?,
            None => self.git.run_git_raw(&["read-tree", "--empty"], &envs, None)?,
        };
        Ok(())
    }

    /// Stage a blob at a path
    pub fn add_blob(&self, oid: &str, path: &str) -> Result<(), GitError> {
        let cacheinfo = format!("100644,{},{}", oid, path);
        self.git.run_git_raw(
            &["update-index", "--add", "--cacheinfo", &cacheinfo],
            &self.envs(),
            None,
        )?;
        Ok(())
    }

    /// Remove a path (recursively for directories) from the index
    pub fn remove(&self, path: &str) -> Result<(), GitError> {
        let entries = self.git.run_git_raw(
            &["ls-files", "--", path],
            &self.envs(),
            None,
        )?;
        let listing = String::from_utf8_lossy(&entries);
        for entry in listing.lines() {
            self.git.run_git_raw(
                &["update-index", "--force-remove", "--", entry],
                &self.envs(),
                None,
            )?;
        }
        Ok(())
    }

    /// Stage the entire working tree (respecting ignores)
    pub fn add_all_worktree(&self) -> Result<(), GitError> {
        self.git
            .run_git_raw(&["add", "-A", "."], &self.envs(), None)?;
        Ok(())
    }

    /// Write the staged state out as a tree object
    pub fn write_tree(&self) -> Result<String, GitError> {
        let out = self.git.run_git_raw(&["write-tree"], &self.envs(), None)?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }
}

impl Drop for TempIndex<'_> {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ============================================================================
// Tests
// ============================================================================
