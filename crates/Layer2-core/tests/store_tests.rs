//! Checkpoint store behavior against real repositories

mod common;

use common::{git, init_repo, write_file};
use std::sync::Arc;
use waymark_core::store::layout;
use waymark_core::{CheckpointStore, GitOps, ShadowBranchManager, StoreError};
use waymark_foundation::{
    Checkpoint, CheckpointId, CheckpointSummary, SessionDir, SessionId, StrategyKind, TokenUsage,
};

fn store_for(root: &std::path::Path) -> CheckpointStore {
    let git = GitOps::new(root).unwrap();
    CheckpointStore::new(Arc::new(git))
}

fn sample_checkpoint(session: &SessionId) -> Checkpoint {
    Checkpoint::new(session.clone())
        .with_strategy(StrategyKind::AutoCommit)
        .with_branch("main")
        .with_files(vec!["src/lib.rs".into(), "src/main.rs".into()])
        .with_transcript(b"{\"role\":\"assistant\"}\n".to_vec())
        .with_prompts(vec!["add the parser".into(), "now test it".into()])
        .with_context("long-lived refactor")
        .with_token_usage(TokenUsage {
            input: 120,
            output: 80,
            ..Default::default()
        })
        .with_author("waymark")
}

#[test]
fn write_then_read_round_trips_structurally() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    let cp = sample_checkpoint(&session);
    let id = store.write_committed(&cp).unwrap();
    assert_eq!(id, cp.id);

    let loaded = store.read_committed(&id).unwrap();
    assert_eq!(loaded, cp);
}

#[test]
fn list_committed_on_empty_repo_is_empty_not_error() {
    let repo = init_repo();
    let store = store_for(repo.path());
    assert!(store.list_committed().unwrap().is_empty());
    assert!(store.list_sessions().unwrap().is_empty());
}

#[test]
fn read_committed_missing_id_is_not_found() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let missing = CheckpointId::from_string("ck-0000000000001-ffffffff");
    assert!(matches!(
        store.read_committed(&missing),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn list_committed_is_ordered_and_complete() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    let first = sample_checkpoint(&session);
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = sample_checkpoint(&session);
    store.write_committed(&first).unwrap();
    store.write_committed(&second).unwrap();

    let listed = store.list_committed().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, first.id);
    assert_eq!(listed[1].id, second.id);
}

#[test]
fn write_committed_is_idempotent_per_id() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    let cp = sample_checkpoint(&session);
    store.write_committed(&cp).unwrap();
    let tip_after_first = git(repo.path(), &["rev-parse", layout::COMMITTED_REF]);

    store.write_committed(&cp).unwrap();
    let tip_after_second = git(repo.path(), &["rev-parse", layout::COMMITTED_REF]);

    assert_eq!(tip_after_first, tip_after_second);
    assert_eq!(store.list_committed().unwrap().len(), 1);
}

#[test]
fn update_summary_is_idempotent_and_touches_nothing_else() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    let cp = sample_checkpoint(&session);
    store.write_committed(&cp).unwrap();

    let summary = CheckpointSummary {
        intent: "add a parser".into(),
        outcome: "parser added with tests".into(),
        learnings: "grammar was trickier than expected".into(),
        friction: "flaky test runner".into(),
    };
    store.update_summary(&cp.id, &summary).unwrap();
    let tip_after_first = git(repo.path(), &["rev-parse", layout::COMMITTED_REF]);

    // Second identical update must not create a new commit.
    store.update_summary(&cp.id, &summary).unwrap();
    let tip_after_second = git(repo.path(), &["rev-parse", layout::COMMITTED_REF]);
    assert_eq!(tip_after_first, tip_after_second);

    let loaded = store.read_committed(&cp.id).unwrap();
    assert_eq!(loaded.summary.as_ref(), Some(&summary));
    assert_eq!(loaded.transcript, cp.transcript);
    assert_eq!(loaded.files_touched, cp.files_touched);
}

#[test]
fn update_summary_on_missing_checkpoint_fails() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let missing = CheckpointId::from_string("ck-0000000000001-ffffffff");
    assert!(matches!(
        store.update_summary(&missing, &CheckpointSummary::default()),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn session_record_tracks_checkpoints_and_first_prompt() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    let first = sample_checkpoint(&session);
    let second = sample_checkpoint(&session);
    store.write_committed(&first).unwrap();
    store.write_committed(&second).unwrap();

    let record = store.read_session(&session).unwrap().unwrap();
    assert_eq!(record.checkpoints, vec![first.id.clone(), second.id.clone()]);
    assert_eq!(record.description, "add the parser");
    assert_eq!(record.strategy, StrategyKind::AutoCommit);
}

#[test]
fn temporary_write_requires_metadata_dir() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    let cp = Checkpoint::new(session).with_files(vec!["a.txt".into()]);
    assert!(matches!(
        store.write_temporary(&cp),
        Err(StoreError::MetadataDirMissing(_))
    ));
}

#[test]
fn two_temporary_writes_leave_exactly_one_live_snapshot() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");
    SessionDir::new(repo.path(), &session).ensure().unwrap();

    write_file(repo.path(), "a.txt", "first draft\n");
    let first = Checkpoint::new(session.clone())
        .with_files(vec!["a.txt".into()])
        .with_transcript(b"turn one\n".to_vec());
    store.write_temporary(&first).unwrap();

    write_file(repo.path(), "a.txt", "second draft\n");
    let second = Checkpoint::new(session.clone())
        .with_files(vec!["a.txt".into()])
        .with_transcript(b"turn one\nturn two\n".to_vec());
    store.write_temporary(&second).unwrap();

    // The branch holds one snapshot on top of the session's base commit;
    // superseding replaced the first snapshot instead of stacking.
    let shadow = layout::shadow_ref(&session);
    let count = git(repo.path(), &["rev-list", "--count", &shadow]);
    assert_eq!(count, "2"); // snapshot + initial commit

    let live = store.live_temporary(&session).unwrap().unwrap();
    assert_eq!(live.id, second.id);
    assert_eq!(live.transcript, second.transcript);
}

#[test]
fn live_temporary_snapshot_contains_working_tree() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");
    SessionDir::new(repo.path(), &session).ensure().unwrap();

    write_file(repo.path(), "src/new.rs", "pub fn hello() {}\n");
    let cp = Checkpoint::new(session.clone()).with_files(vec!["src/new.rs".into()]);
    store.write_temporary(&cp).unwrap();

    let tip = store.shadow_tip(&session).unwrap().unwrap();
    let git_ops = GitOps::new(repo.path()).unwrap();
    let snapshot_file = git_ops.show_file(&tip, "src/new.rs").unwrap().unwrap();
    assert_eq!(snapshot_file, b"pub fn hello() {}\n");
}

#[test]
fn concurrent_committed_writes_both_survive() {
    let repo = init_repo();
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    let mut handles = Vec::new();
    for n in 0..2 {
        let root = repo.path().to_path_buf();
        let session = session.clone();
        handles.push(std::thread::spawn(move || {
            let store = store_for(&root);
            let cp = Checkpoint::new(session)
                .with_files(vec![format!("file{}.rs", n)])
                .with_prompts(vec![format!("writer {}", n)]);
            store.write_committed(&cp).map(|_| cp.id)
        }));
    }

    let ids: Vec<CheckpointId> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().expect("write survives the race"))
        .collect();
    assert_ne!(ids[0], ids[1]);

    let store = store_for(repo.path());
    let listed = store.list_committed().unwrap();
    assert_eq!(listed.len(), 2, "no write may be lost");
}

#[test]
fn latest_session_content_prefers_live_temporary() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");

    // Nothing persisted yet: zero-value defaults, not an error.
    let empty = store.read_latest_session_content(&session).unwrap();
    assert!(empty.transcript.is_empty());
    assert!(empty.prompts.is_empty());

    let committed = sample_checkpoint(&session);
    store.write_committed(&committed).unwrap();
    let content = store.read_latest_session_content(&session).unwrap();
    assert_eq!(content.transcript, committed.transcript);

    SessionDir::new(repo.path(), &session).ensure().unwrap();
    write_file(repo.path(), "wip.txt", "work in progress\n");
    let temp = Checkpoint::new(session.clone())
        .with_files(vec!["wip.txt".into()])
        .with_transcript(b"newer transcript\n".to_vec());
    store.write_temporary(&temp).unwrap();

    let content = store.read_latest_session_content(&session).unwrap();
    assert_eq!(content.transcript, b"newer transcript\n".to_vec());
}

#[test]
fn shadow_bulk_deletion_never_blocks_on_missing_branches() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let with_branch = SessionId::from_string("20260101-090000-aaaaaa");
    let without_branch = SessionId::from_string("20260102-090000-bbbbbb");

    SessionDir::new(repo.path(), &with_branch).ensure().unwrap();
    write_file(repo.path(), "a.txt", "content\n");
    let cp = Checkpoint::new(with_branch.clone()).with_files(vec!["a.txt".into()]);
    store.write_temporary(&cp).unwrap();

    let manager = ShadowBranchManager::new(Arc::new(GitOps::new(repo.path()).unwrap()));
    assert!(manager.exists(&with_branch));

    // Deleting a mix of existing and missing branches: both count as
    // deleted, nothing blocks anything.
    let report = manager.delete_all(&[with_branch.clone(), without_branch]);
    assert!(report.is_complete());
    assert_eq!(report.deleted.len(), 2);
    assert!(!manager.exists(&with_branch));
}

#[test]
fn shadow_reachability_is_depth_bounded() {
    let repo = init_repo();
    let store = store_for(repo.path());
    let session = SessionId::from_string("20260101-090000-aaaaaa");
    SessionDir::new(repo.path(), &session).ensure().unwrap();

    write_file(repo.path(), "a.txt", "content\n");
    let cp = Checkpoint::new(session.clone()).with_files(vec!["a.txt".into()]);
    store.write_temporary(&cp).unwrap();

    let manager = ShadowBranchManager::new(Arc::new(GitOps::new(repo.path()).unwrap()));
    let tip = store.shadow_tip(&session).unwrap().unwrap();

    assert!(manager.is_reachable(&tip, &session, 10).unwrap());
    // The initial commit sits one past the tip; a depth of one misses it.
    let base = git(repo.path(), &["rev-parse", &format!("{}^", tip)]);
    assert!(manager.is_reachable(&base, &session, 10).unwrap());
    assert!(!manager.is_reachable(&base, &session, 1).unwrap());
}
