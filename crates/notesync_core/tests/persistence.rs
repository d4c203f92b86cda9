//! Repository behaviour across restarts, faults and arbitrary edit sequences.

use notesync_core::{NoteDraft, NoteId, NoteStore, StorageError, SyncQueue};
use notesync_testkit::{note_ops_strategy, NoteOp, TestDatabase};
use proptest::prelude::*;
use std::collections::BTreeMap;

#[tokio::test]
async fn saved_note_survives_restart() {
    let test_db = TestDatabase::file();
    let repo = test_db.repository();
    let saved = repo
        .save(NoteDraft::new("remember the milk").with_title("Groceries"))
        .await
        .unwrap();
    drop(repo);

    let test_db = test_db.reopen();
    let repo = test_db.repository();
    let loaded = repo.load_all().await.unwrap();

    assert_eq!(loaded, vec![saved.clone()]);
    assert_eq!(repo.pending().await.unwrap(), vec![saved]);
}

#[tokio::test]
async fn one_pending_entry_per_id() {
    let test_db = TestDatabase::memory();
    let repo = test_db.repository();

    let first = repo.save(NoteDraft::new("draft")).await.unwrap();
    let second = repo
        .save(NoteDraft::new("final").with_title("T").with_id(first.id))
        .await
        .unwrap();

    let pending = repo.pending().await.unwrap();
    assert_eq!(pending, vec![second]);
}

#[tokio::test]
async fn delete_removes_from_both_stores() {
    let test_db = TestDatabase::file();
    let repo = test_db.repository();
    let keep = repo.save(NoteDraft::new("keep")).await.unwrap();
    let gone = repo.save(NoteDraft::new("gone")).await.unwrap();

    repo.remove(gone.id).await.unwrap();
    drop(repo);

    let test_db = test_db.reopen();
    let notes = NoteStore::open(&test_db).unwrap();
    let queue = SyncQueue::open(&test_db).unwrap();
    assert!(notes.get(gone.id).unwrap().is_none());
    assert!(!queue.contains(gone.id));
    assert!(queue.contains(keep.id));
}

#[tokio::test]
async fn queue_failure_after_durable_write_is_reported() {
    let (test_db, switch) = TestDatabase::with_faulty_queue();
    let repo = test_db.repository();

    switch.fail();
    let err = repo.save(NoteDraft::new("stranded")).await.unwrap_err();

    let id = match err {
        StorageError::NotQueued { id, .. } => id,
        other => panic!("expected NotQueued, got {other:?}"),
    };
    switch.heal();

    assert!(repo.get(id).await.unwrap().is_some());
    assert_eq!(repo.pending_count().await.unwrap(), 0);

    // Saving again queues it.
    let note = repo.get(id).await.unwrap().unwrap();
    repo.save(note.into()).await.unwrap();
    assert_eq!(repo.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn partial_write_does_not_damage_the_log() {
    let (test_db, switch) = TestDatabase::file_with_faulty_notes();
    let repo = test_db.repository();
    let first = repo.save(NoteDraft::new("before the fault")).await.unwrap();

    switch.tear_appends();
    assert!(repo.save(NoteDraft::new("half written")).await.is_err());
    switch.heal();

    let second = repo.save(NoteDraft::new("after the fault")).await.unwrap();
    assert_eq!(repo.get(second.id).await.unwrap(), Some(second.clone()));
    drop(repo);

    let test_db = test_db.reopen();
    let repo = test_db.repository();
    let mut ids: Vec<NoteId> = repo.load_all().await.unwrap().iter().map(|n| n.id).collect();
    ids.sort();
    assert_eq!(ids, vec![first.id, second.id]);
    assert_eq!(repo.pending_count().await.unwrap(), 2);
}

#[tokio::test]
async fn failed_flush_is_not_replayed() {
    let (test_db, switch) = TestDatabase::file_with_faulty_notes();
    let repo = test_db.repository();

    switch.fail_durability();
    assert!(repo.save(NoteDraft::new("never acknowledged")).await.is_err());
    switch.heal();
    assert!(repo.load_all().await.unwrap().is_empty());
    drop(repo);

    let test_db = test_db.reopen();
    let repo = test_db.repository();
    assert!(repo.load_all().await.unwrap().is_empty());
    assert_eq!(repo.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn torn_tail_is_dropped_on_restart() {
    let test_db = TestDatabase::file();
    let path = test_db.path().unwrap();
    let repo = test_db.repository();
    let saved = repo.save(NoteDraft::new("intact")).await.unwrap();
    drop(repo);
    test_db.close().unwrap();

    let log = path.join("stores").join("notes.log");
    let mut bytes = std::fs::read(&log).unwrap();
    bytes.extend_from_slice(&[40, 0, 0, 0, 0, 1, 2]);
    std::fs::write(&log, bytes).unwrap();

    let test_db = test_db.reopen();
    let loaded = test_db.repository().load_all().await.unwrap();
    assert_eq!(loaded, vec![saved]);
}

#[test]
fn ids_are_unique_under_concurrent_saves() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap();
    runtime.block_on(async {
        let test_db = TestDatabase::memory();
        let repo = test_db.repository();

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.save(NoteDraft::new(format!("n{i}"))).await })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 32);
        assert_eq!(repo.pending_count().await.unwrap(), 32);
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn store_and_queue_follow_last_write(ops in note_ops_strategy(24)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let test_db = TestDatabase::memory();
            let repo = test_db.repository();
            let mut model: BTreeMap<NoteId, (Option<String>, String)> = BTreeMap::new();

            for op in ops {
                match op {
                    NoteOp::Save(draft) => {
                        let id = draft.id.unwrap();
                        model.insert(id, (draft.title.clone(), draft.content.clone()));
                        repo.save(draft).await.unwrap();
                    }
                    NoteOp::Remove(id) => {
                        model.remove(&id);
                        repo.remove(id).await.unwrap();
                    }
                }
            }

            let stored: BTreeMap<_, _> = repo
                .load_all()
                .await
                .unwrap()
                .into_iter()
                .map(|note| (note.id, (note.title, note.content)))
                .collect();
            assert_eq!(stored, model);

            let pending: Vec<NoteId> = repo.pending().await.unwrap().iter().map(|n| n.id).collect();
            let expected: Vec<NoteId> = model.keys().copied().collect();
            assert_eq!(pending, expected);
        });
    }
}
