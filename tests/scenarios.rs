//! End-to-end scenarios over the public API: fork isolation, PITR,
//! search ranking, relationship constraints, crash recovery, and
//! snapshot restore.

use engram::testing::BagOfWordsEmbedder;
use engram::{Engram, ListFilter, MemoryDraft, MemoryPatch, StoreId};
use std::sync::Arc;

fn open(dir: &std::path::Path) -> Engram {
    Engram::open(dir, Arc::new(BagOfWordsEmbedder::default())).unwrap()
}

fn main_id() -> StoreId {
    StoreId::main()
}

fn draft(content: &str) -> MemoryDraft {
    MemoryDraft::new("x", "fact", content)
}

#[test]
fn fork_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let engram = open(dir.path());

    let memory = engram.add_memory(&main_id(), draft("A")).unwrap();
    assert_eq!(memory.version, 1);

    let fork = engram
        .create_fork(&main_id(), Some("F".into()), None)
        .unwrap();

    engram
        .update_memory(
            &fork.store_id,
            &memory.id,
            MemoryPatch {
                content: Some("B".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let in_main = engram.get_memory(&main_id(), &memory.id).unwrap().unwrap();
    assert_eq!(in_main.content, "A");
    assert_eq!(in_main.version, 1);

    let in_fork = engram
        .get_memory(&fork.store_id, &memory.id)
        .unwrap()
        .unwrap();
    assert_eq!(in_fork.content, "B");
    assert_eq!(in_fork.version, 2);
}

#[test]
fn point_in_time_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let engram = open(dir.path());

    let before = engram.add_memory(&main_id(), draft("before")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));
    engram.add_memory(&main_id(), draft("after")).unwrap();

    // Cut between the two writes
    let cut = before.updated_at.plus_millis(5);
    let fork = engram
        .create_fork_at_time(&main_id(), None, None, cut)
        .unwrap();

    let listed = engram
        .list_memories(&fork.store_id, ListFilter::default())
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].memory.content, "before");
    assert_eq!(listed[0].memory.id, before.id);

    // Main still has both
    let in_main = engram.list_memories(&main_id(), ListFilter::default()).unwrap();
    assert_eq!(in_main.len(), 2);
}

#[test]
fn hybrid_search_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let engram = open(dir.path());

    let elephant = engram
        .add_memory(&main_id(), draft("Elephant migration patterns in Africa"))
        .unwrap();
    engram
        .add_memory(&main_id(), draft("Penguin colonies in Antarctica"))
        .unwrap();
    let pizza = engram
        .add_memory(&main_id(), draft("Pizza is Italian"))
        .unwrap();

    let hits = engram
        .search_memories(&main_id(), "elephant migration", "hybrid", None, None)
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].memory.id, elephant.id);
    if let Some(pizza_hit) = hits.iter().find(|h| h.memory.id == pizza.id) {
        assert!(pizza_hit.score < hits[0].score);
    }

    // Text and semantic agree on the winner here
    for mode in ["text", "semantic"] {
        let hits = engram
            .search_memories(&main_id(), "elephant migration", mode, None, None)
            .unwrap();
        assert_eq!(hits[0].memory.id, elephant.id, "mode {}", mode);
    }
}

#[test]
fn duplicate_relationship_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    let engram = open(dir.path());

    let a = engram.add_memory(&main_id(), draft("A")).unwrap();
    let b = engram.add_memory(&main_id(), draft("B")).unwrap();

    engram
        .add_relationship(&main_id(), &a.id, &b.id, "related_to")
        .unwrap();
    let stats_before = engram.get_stats(&main_id()).unwrap();

    let err = engram
        .add_relationship(&main_id(), &a.id, &b.id, "related_to")
        .unwrap_err();
    assert!(err.is_conflict());

    let neighborhood = engram.get_relationships(&main_id(), &a.id).unwrap();
    assert_eq!(neighborhood.outgoing.len(), 1);

    // The failed attempt wrote nothing
    let stats_after = engram.get_stats(&main_id()).unwrap();
    assert_eq!(stats_after.total_records, stats_before.total_records);
    assert_eq!(stats_after.merkle_root, stats_before.merkle_root);
}

#[test]
fn version_chain_after_crash() {
    let dir = tempfile::tempdir().unwrap();

    let (first_id, second_id) = {
        let engram = open(dir.path());
        let first = engram.add_memory(&main_id(), draft("survives")).unwrap();
        let second = engram.add_memory(&main_id(), draft("torn away")).unwrap();
        (first.id, second.id)
    };

    // Corrupt the last byte of the open WAL tail
    let wal_path = dir.path().join("main").join("wal.log");
    let mut bytes = std::fs::read(&wal_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&wal_path, &bytes).unwrap();

    // Reopen: the corrupt frame is truncated away
    let engram = open(dir.path());
    assert!(engram.get_memory(&main_id(), &first_id).unwrap().is_some());
    assert!(engram.get_memory(&main_id(), &second_id).unwrap().is_none());

    let report = engram.verify_integrity(&main_id()).unwrap();
    assert!(report.valid);
    assert_eq!(report.records_verified, 1);
}

#[test]
fn tampering_detected_by_verify() {
    let dir = tempfile::tempdir().unwrap();
    let engram = open(dir.path());
    for i in 0..3 {
        engram
            .add_memory(&main_id(), draft(&format!("record {}", i)))
            .unwrap();
    }
    assert!(engram.verify_integrity(&main_id()).unwrap().valid);

    // Flip one byte inside an early frame while the store is open:
    // the live indexes now disagree with the disk
    let wal_path = dir.path().join("main").join("wal.log");
    let mut bytes = std::fs::read(&wal_path).unwrap();
    bytes[20] ^= 0x01;
    std::fs::write(&wal_path, &bytes).unwrap();

    let report = engram.verify_integrity(&main_id()).unwrap();
    assert!(!report.valid);
    assert_eq!(report.first_bad_seq, Some(1));
}

#[test]
fn snapshot_restore() {
    let dir = tempfile::tempdir().unwrap();
    let engram = open(dir.path());

    let m1 = engram.add_memory(&main_id(), draft("M1")).unwrap();
    let snapshot = engram.create_snapshot(&main_id(), "pre").unwrap();
    engram.add_memory(&main_id(), draft("M2")).unwrap();

    let fork = engram
        .restore_snapshot(&snapshot.id, Some("rewound".into()))
        .unwrap();

    let listed = engram
        .list_memories(&fork.store_id, ListFilter::default())
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].memory.id, m1.id);

    // The snapshot catalog survives and lists the capture
    let snapshots = engram.list_snapshots(&main_id()).unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].name, "pre");
}

#[test]
fn deleted_memory_appears_tombstoned_in_full_listing() {
    let dir = tempfile::tempdir().unwrap();
    let engram = open(dir.path());

    let memory = engram.add_memory(&main_id(), draft("ephemeral")).unwrap();
    assert!(engram.delete_memory(&main_id(), &memory.id).unwrap());

    assert!(engram.get_memory(&main_id(), &memory.id).unwrap().is_none());
    assert!(!engram.delete_memory(&main_id(), &memory.id).unwrap());

    let all = engram
        .list_memories(
            &main_id(),
            ListFilter {
                include_archived: true,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].deleted);
}

#[test]
fn fork_of_fork_shares_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let engram = open(dir.path());

    let root_memory = engram.add_memory(&main_id(), draft("root")).unwrap();
    let f1 = engram.create_fork(&main_id(), None, None).unwrap();
    engram.add_memory(&f1.store_id, draft("f1 only")).unwrap();
    let f2 = engram.create_fork(&f1.store_id, None, None).unwrap();

    assert!(engram
        .get_memory(&f2.store_id, &root_memory.id)
        .unwrap()
        .is_some());
    assert_eq!(engram.get_stats(&f2.store_id).unwrap().live_memories, 2);
    assert!(engram.verify_integrity(&f2.store_id).unwrap().valid);

    // Grandchild diverges alone
    engram.add_memory(&f2.store_id, draft("f2 only")).unwrap();
    assert_eq!(engram.get_stats(&f1.store_id).unwrap().live_memories, 2);
    assert_eq!(engram.get_stats(&main_id()).unwrap().live_memories, 1);
}
