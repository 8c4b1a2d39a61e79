//! Session metadata directories
//!
//! Working-tree-visible per-session files under `.waymark/sessions/<id>/`.
//! Strategies write these before a checkpoint is finalized; rewind and
//! explain read them back. Temporary checkpoint writes require the
//! directory to already exist.

use crate::id::SessionId;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

pub const TRANSCRIPT_FILE: &str = "transcript.jsonl";
pub const PROMPT_FILE: &str = "prompt.md";
pub const SUMMARY_FILE: &str = "summary.json";
pub const CONTEXT_FILE: &str = "context.md";

/// Accessor for one session's metadata directory
#[derive(Debug, Clone)]
pub struct SessionDir {
    dir: PathBuf,
}

impl SessionDir {
    pub fn new(repo_root: &Path, session_id: &SessionId) -> Self {
        Self {
            dir: repo_root
                .join(".waymark")
                .join("sessions")
                .join(session_id.as_str()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Create the directory tree; idempotent
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Storage(format!("Failed to create {}: {}", self.dir.display(), e)))?;
        Ok(())
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write a metadata file, creating the directory if needed
    pub fn write(&self, name: &str, content: &[u8]) -> Result<()> {
        self.ensure()?;
        let path = self.file(name);
        std::fs::write(&path, content)
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", path.display(), e)))
    }

    /// Read a metadata file; missing file reads as empty
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.file(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        std::fs::read(&path)
            .map_err(|e| Error::Storage(format!("Failed to read {}: {}", path.display(), e)))
    }

    /// Remove the whole directory; missing directory is fine
    pub fn remove(&self) -> Result<()> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).map_err(|e| {
                Error::Storage(format!("Failed to remove {}: {}", self.dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// All session directories under a repository, sorted by session id
    pub fn list_all(repo_root: &Path) -> Result<Vec<SessionId>> {
        let sessions_root = repo_root.join(".waymark").join("sessions");
        if !sessions_root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&sessions_root)
            .map_err(|e| Error::Storage(format!("Failed to list sessions: {}", e)))?
        {
            let entry = entry.map_err(|e| Error::Storage(e.to_string()))?;
            if entry.path().is_dir() {
                ids.push(SessionId::from_string(
                    entry.file_name().to_string_lossy().to_string(),
                ));
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let id = SessionId::from_string("20260101-000000-abc123");
        let dir = SessionDir::new(root.path(), &id);

        assert!(!dir.exists());
        dir.write(TRANSCRIPT_FILE, b"line one\n").unwrap();
        assert!(dir.exists());
        assert_eq!(dir.read(TRANSCRIPT_FILE).unwrap(), b"line one\n");
    }

    #[test]
    fn test_read_missing_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let id = SessionId::from_string("20260101-000000-abc123");
        let dir = SessionDir::new(root.path(), &id);
        assert!(dir.read(CONTEXT_FILE).unwrap().is_empty());
    }

    #[test]
    fn test_list_all_sorted() {
        let root = tempfile::tempdir().unwrap();
        for name in ["20260102-000000-bbbbbb", "20260101-000000-aaaaaa"] {
            SessionDir::new(root.path(), &SessionId::from_string(name))
                .ensure()
                .unwrap();
        }
        let ids = SessionDir::list_all(root.path()).unwrap();
        assert_eq!(
            ids,
            vec![
                SessionId::from_string("20260101-000000-aaaaaa"),
                SessionId::from_string("20260102-000000-bbbbbb"),
            ]
        );
    }

    #[test]
    fn test_remove_missing_ok() {
        let root = tempfile::tempdir().unwrap();
        let id = SessionId::from_string("20260101-000000-abc123");
        SessionDir::new(root.path(), &id).remove().unwrap();
    }
}
