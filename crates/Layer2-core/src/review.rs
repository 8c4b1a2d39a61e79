//! Background review queue
//!
//! Best-effort review work runs as a detached process outside the hook's
//! lifetime. The handoff is durable: the hook writes a work file, a
//! separate worker consumes it. At most one worker runs at a time,
//! enforced by a lock file taken with an atomic create-exclusive open
//! (never stat-then-write); a lock older than the staleness threshold is
//! reclaimed as abandoned. Coordination is local-filesystem-only: one
//! clone, one developer, no cross-host locking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use waymark_foundation::{CheckpointId, SessionId};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Review queue IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed work item {}: {}", .0.display(), .1)]
    Malformed(PathBuf, String),
}

/// One unit of review work handed to the detached worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub id: String,

    pub session_id: SessionId,

    pub checkpoint_id: CheckpointId,

    pub created_at: DateTime<Utc>,
}

impl ReviewItem {
    pub fn new(session_id: SessionId, checkpoint_id: CheckpointId) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            session_id,
            checkpoint_id,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// WorkerLock
// ============================================================================

/// Exclusive worker lock backed by an atomically-created file
pub struct WorkerLock {
    path: PathBuf,
}

impl WorkerLock {
    /// Try to take the lock; `None` means another worker holds a fresh one
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Option<Self>, ReviewError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        for attempt in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{} {}", std::process::id(), Utc::now().to_rfc3339());
                    return Ok(Some(Self {
                        path: path.to_path_buf(),
                    }));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt > 0 {
                        return Ok(None);
                    }
                    // Reclaim only a lock whose holder looks long dead.
                    let age = std::fs::metadata(path)
                        .and_then(|meta| meta.modified())
                        .ok()
                        .and_then(|modified| modified.elapsed().ok());
                    match age {
                        Some(age) if age > stale_after => {
                            warn!(
                                "Reclaiming stale review lock {} (age {:?})",
                                path.display(),
                                age
                            );
                            let _ = std::fs::remove_file(path);
                        }
                        _ => return Ok(None),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }
}

impl Drop for WorkerLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

// ============================================================================
// ReviewQueue
// ============================================================================

/// Durable work-item queue under `.waymark/review/`
pub struct ReviewQueue {
    dir: PathBuf,
    stale_after: Duration,
}

impl ReviewQueue {
    pub fn new(repo_root: &Path, stale_after_secs: u64) -> Self {
        Self {
            dir: repo_root.join(".waymark").join("review"),
            stale_after: Duration::from_secs(stale_after_secs),
        }
    }

    fn queue_dir(&self) -> PathBuf {
        self.dir.join("queue")
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join("worker.lock")
    }

    /// Persist a work item for the detached worker
    pub fn enqueue(&self, item: &ReviewItem) -> Result<PathBuf, ReviewError> {
        let dir = self.queue_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", item.id));
        let payload = serde_json::to_vec_pretty(item)
            .map_err(|e| ReviewError::Malformed(path.clone(), e.to_string()))?;
        std::fs::write(&path, payload)?;
        debug!("Enqueued review item {} for {}", item.id, item.checkpoint_id);
        Ok(path)
    }

    /// Launch the detached worker process; fire-and-forget by design
    ///
    /// The worker outlives the hook. If no binary can be resolved or the
    /// spawn fails, the queued items simply wait for the next trigger.
    pub fn spawn_worker(&self) {
        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                warn!("Cannot resolve worker binary; leaving queue for later: {}", e);
                return;
            }
        };
        let spawned = std::process::Command::new(exe)
            .arg("review-worker")
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => debug!("Spawned detached review worker (pid {})", child.id()),
            Err(e) => warn!("Failed to spawn review worker: {}", e),
        }
    }

    /// Worker entry point: drain the queue under the exclusive lock
    ///
    /// Returns the number of items processed; zero when another worker
    /// already holds a fresh lock. Items that fail to process are kept for
    /// the next worker; items that fail to parse are dropped.
    pub fn run_worker<F>(&self, mut process: F) -> Result<usize, ReviewError>
    where
        F: FnMut(&ReviewItem) -> Result<(), String>,
    {
        let Some(_lock) = WorkerLock::acquire(&self.lock_path(), self.stale_after)? else {
            debug!("Another review worker is active; yielding");
            return Ok(0);
        };

        let dir = self.queue_dir();
        if !dir.exists() {
            return Ok(0);
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();

        let mut processed = 0;
        for path in entries {
            let item: ReviewItem = match std::fs::read(&path)
                .map_err(ReviewError::from)
                .and_then(|raw| {
                    serde_json::from_slice(&raw)
                        .map_err(|e| ReviewError::Malformed(path.clone(), e.to_string()))
                }) {
                Ok(item) => item,
                Err(e) => {
                    warn!("Dropping unreadable review item: {}", e);
                    let _ = std::fs::remove_file(&path);
                    continue;
                }
            };

            match process(&item) {
                Ok(()) => {
                    let _ = std::fs::remove_file(&path);
                    processed += 1;
                }
                Err(e) => warn!("Review of {} failed; keeping item: {}", item.checkpoint_id, e),
            }
        }

        info!("Review worker processed {} item(s)", processed);
        Ok(processed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> ReviewItem {
        ReviewItem::new(
            SessionId::from_string("20260101-000000-aaaaaa"),
            CheckpointId::from_string("ck-0000000001000-abcd1234"),
        )
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.lock");

        let first = WorkerLock::acquire(&path, Duration::from_secs(600)).unwrap();
        assert!(first.is_some());
        let second = WorkerLock::acquire(&path, Duration::from_secs(600)).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.lock");

        drop(WorkerLock::acquire(&path, Duration::from_secs(600)).unwrap());
        assert!(!path.exists());
        assert!(WorkerLock::acquire(&path, Duration::from_secs(600))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_stale_lock_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.lock");
        std::fs::write(&path, "12345 long ago").unwrap();

        // Zero threshold: any existing lock counts as abandoned.
        let lock = WorkerLock::acquire(&path, Duration::from_secs(0)).unwrap();
        assert!(lock.is_some());
    }

    #[test]
    fn test_enqueue_and_drain() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ReviewQueue::new(dir.path(), 600);

        let a = item();
        let b = item();
        queue.enqueue(&a).unwrap();
        queue.enqueue(&b).unwrap();

        let mut seen = Vec::new();
        let processed = queue
            .run_worker(|item| {
                seen.push(item.id.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(processed, 2);
        assert_eq!(seen.len(), 2);

        // Queue is empty afterwards.
        assert_eq!(queue.run_worker(|_| Ok(())).unwrap(), 0);
    }

    #[test]
    fn test_failed_item_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let queue = ReviewQueue::new(dir.path(), 600);
        queue.enqueue(&item()).unwrap();

        let processed = queue
            .run_worker(|_| Err("reviewer unavailable".to_string()))
            .unwrap();
        assert_eq!(processed, 0);

        // Still there for the next worker.
        let processed = queue.run_worker(|_| Ok(())).unwrap();
        assert_eq!(processed, 1);
    }
}
