//! Rewind engine behavior against real repositories

mod common;

use common::{git, init_repo, read_file, write_file};
use std::sync::Arc;
use waymark_core::{
    trailer, CheckpointStore, GitOps, RewindEngine, RewindError, StoreError,
};
use waymark_foundation::{Checkpoint, CheckpointId, SessionDir, SessionId, WaymarkConfig};

fn engine_for(root: &std::path::Path) -> RewindEngine {
    let git = GitOps::new(root).unwrap();
    RewindEngine::new(Arc::new(git), WaymarkConfig::default())
}

fn store_for(root: &std::path::Path) -> CheckpointStore {
    let git = GitOps::new(root).unwrap();
    CheckpointStore::new(Arc::new(git))
}

/// Commit `files` with a trailer binding them to a fresh checkpoint
fn committed_turn(
    root: &std::path::Path,
    store: &CheckpointStore,
    session: &SessionId,
    files: &[&str],
) -> CheckpointId {
    for rel in files {
        git(root, &["add", rel]);
    }
    let cp = Checkpoint::new(session.clone())
        .with_files(files.iter().map(|f| f.to_string()).collect());
    let message = trailer::append(&format!("turn touching {} file(s)", files.len()), &cp.id);
    git(root, &["commit", "-m", &message]);
    let head = git(root, &["rev-parse", "HEAD"]);

    let cp = cp.with_linked_commit(head);
    store.write_committed(&cp).unwrap();
    cp.id
}

#[test]
fn rewind_removes_later_files_and_keeps_target_files() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    write_file(repo.path(), "a.txt", "from the first turn\n");
    let c1 = committed_turn(repo.path(), &store, &session, &["a.txt"]);

    write_file(repo.path(), "b.txt", "from the second turn\n");
    committed_turn(repo.path(), &store, &session, &["b.txt"]);

    let report = engine_for(repo.path()).rewind(&c1).unwrap();

    assert_eq!(read_file(repo.path(), "a.txt").unwrap(), "from the first turn\n");
    assert!(read_file(repo.path(), "b.txt").is_none());
    assert!(report.deleted.contains(&"b.txt".to_string()));
}

#[test]
fn rewind_recreates_files_deleted_after_target() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    write_file(repo.path(), "doomed.txt", "still here\n");
    let c1 = committed_turn(repo.path(), &store, &session, &["doomed.txt"]);

    std::fs::remove_file(repo.path().join("doomed.txt")).unwrap();
    git(repo.path(), &["add", "-A"]);
    git(repo.path(), &["commit", "-m", "remove doomed"]);

    engine_for(repo.path()).rewind(&c1).unwrap();
    assert_eq!(read_file(repo.path(), "doomed.txt").unwrap(), "still here\n");
}

#[test]
fn rewind_restores_modified_files_byte_for_byte() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    write_file(repo.path(), "code.rs", "fn original() {}\n");
    let c1 = committed_turn(repo.path(), &store, &session, &["code.rs"]);

    write_file(repo.path(), "code.rs", "fn rewritten() {}\n");
    committed_turn(repo.path(), &store, &session, &["code.rs"]);

    let report = engine_for(repo.path()).rewind(&c1).unwrap();
    assert_eq!(read_file(repo.path(), "code.rs").unwrap(), "fn original() {}\n");
    assert!(report.restored.contains(&"code.rs".to_string()));
}

#[test]
fn rewind_to_logs_only_checkpoint_fails_and_mutates_nothing() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    // A checkpoint whose snapshot commits no longer exist anywhere.
    let cp = Checkpoint::new(session.clone())
        .with_files(vec!["ghost.txt".into()])
        .with_linked_commit("0123456789abcdef0123456789abcdef01234567");
    store.write_committed(&cp).unwrap();

    write_file(repo.path(), "survivor.txt", "untouched\n");

    let err = engine_for(repo.path()).rewind(&cp.id).unwrap_err();
    assert!(matches!(err, RewindError::NotRestorable(_)));
    assert_eq!(read_file(repo.path(), "survivor.txt").unwrap(), "untouched\n");
}

#[test]
fn rewind_unknown_target_is_not_found() {
    let repo = init_repo();
    let missing = CheckpointId::from_string("ck-0000000000001-ffffffff");
    let err = engine_for(repo.path()).rewind(&missing).unwrap_err();
    assert!(matches!(err, RewindError::TargetNotFound(_)));
}

#[test]
fn rewind_reaches_temporary_checkpoints_via_shadow() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");
    SessionDir::new(repo.path(), &session).ensure().unwrap();

    write_file(repo.path(), "draft.txt", "snapshot me\n");
    let temp = Checkpoint::new(session.clone()).with_files(vec!["draft.txt".into()]);
    store.write_temporary(&temp).unwrap();

    // Later work that the rewind should erase.
    write_file(repo.path(), "draft.txt", "overwritten\n");
    write_file(repo.path(), "later.txt", "postdates the snapshot\n");

    engine_for(repo.path()).rewind(&temp.id).unwrap();
    assert_eq!(read_file(repo.path(), "draft.txt").unwrap(), "snapshot me\n");
    assert!(read_file(repo.path(), "later.txt").is_none());
}

#[test]
fn rewind_points_merge_dedupe_and_order_newest_first() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    write_file(repo.path(), "a.txt", "one\n");
    let c1 = committed_turn(repo.path(), &store, &session, &["a.txt"]);
    std::thread::sleep(std::time::Duration::from_millis(5));
    write_file(repo.path(), "b.txt", "two\n");
    let c2 = committed_turn(repo.path(), &store, &session, &["b.txt"]);

    // A live temporary for another session joins the merge.
    let other = SessionId::from_string("20260102-090000-bbbbbb");
    SessionDir::new(repo.path(), &other).ensure().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    write_file(repo.path(), "wip.txt", "draft\n");
    let temp = Checkpoint::new(other.clone()).with_files(vec!["wip.txt".into()]);
    store.write_temporary(&temp).unwrap();

    let points = engine_for(repo.path()).rewind_points(10).unwrap();
    let ids: Vec<&str> = points.iter().map(|p| p.id.as_str()).collect();

    assert_eq!(ids, vec![temp.id.as_str(), c2.as_str(), c1.as_str()]);
    assert!(points.iter().all(|p| !p.is_logs_only));
}

#[test]
fn rewind_points_dedupe_amended_commits_by_checkpoint_id() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    write_file(repo.path(), "a.txt", "one\n");
    let c1 = committed_turn(repo.path(), &store, &session, &["a.txt"]);

    // Amending preserves the trailer, yielding two commits that name the
    // same checkpoint; the projection must carry it once.
    write_file(repo.path(), "a.txt", "one, amended\n");
    git(repo.path(), &["add", "a.txt"]);
    git(repo.path(), &["commit", "--amend", "--no-edit"]);

    let points = engine_for(repo.path()).rewind_points(10).unwrap();
    let matching: Vec<_> = points
        .iter()
        .filter(|p| p.checkpoint_id == c1)
        .collect();
    assert_eq!(matching.len(), 1);
}

#[test]
fn rewind_points_respect_limit() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    for n in 0..5 {
        write_file(repo.path(), &format!("f{}.txt", n), "content\n");
        committed_turn(repo.path(), &store, &session, &[&format!("f{}.txt", n)]);
    }

    let points = engine_for(repo.path()).rewind_points(3).unwrap();
    assert_eq!(points.len(), 3);
}

#[test]
fn rewind_points_empty_repo_is_empty() {
    let repo = init_repo();
    let points = engine_for(repo.path()).rewind_points(10).unwrap();
    assert!(points.is_empty());
}

#[test]
fn store_errors_do_not_masquerade_as_rewind_errors() {
    // Sanity: NotFound from the store surfaces as TargetNotFound upstream.
    let repo = init_repo();
    let store = store_for(repo.path());
    let missing = CheckpointId::from_string("ck-0000000000001-ffffffff");
    assert!(matches!(
        store.read_committed(&missing),
        Err(StoreError::NotFound(_))
    ));
}
