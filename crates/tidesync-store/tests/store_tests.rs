use std::collections::HashSet;

use proptest::prelude::*;
use tempfile::TempDir;
use tidesync_core::{ContentHash, MappedObject, ObjectId, SyncPath};
use tidesync_store::{
    IdentityStore, JsonIdentityStore, MemoryIdentityStore, StoreError, StructuralIssue,
};

#[derive(Debug, Clone)]
enum Op {
    Upsert { id: u8, path: u8 },
    Remove { id: u8 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..8, 0u8..8).prop_map(|(id, path)| Op::Upsert { id, path }),
        (0u8..8).prop_map(|id| Op::Remove { id }),
    ]
}

fn record(id: u8, path: u8) -> MappedObject {
    MappedObject::file(
        ObjectId::new(format!("id-{id}").as_str()),
        SyncPath::new(&format!("file-{path}.txt")).unwrap(),
        None,
    )
}

proptest! {
    #[test]
    fn bijection_survives_any_op_sequence(ops in proptest::collection::vec(op(), 0..64)) {
        let store = MemoryIdentityStore::new();
        for op in ops {
            match op {
                Op::Upsert { id, path } => match store.upsert(record(id, path)) {
                    Ok(_) => {}
                    Err(e) => prop_assert!(e.is_conflict()),
                },
                Op::Remove { id } => {
                    store.remove(&ObjectId::new(format!("id-{id}").as_str())).unwrap();
                }
            }
        }

        let records = store.records();
        let paths: HashSet<_> = records.iter().map(|r| r.path.clone()).collect();
        let ids: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
        prop_assert_eq!(paths.len(), records.len());
        prop_assert_eq!(ids.len(), records.len());
        for r in &records {
            prop_assert_eq!(store.lookup_by_path(&r.path).map(|found| found.id), Some(r.id.clone()));
        }
        prop_assert!(store.validate_structure().is_ok());
    }
}

#[test]
fn test_json_store_reloads_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identities.json");

    {
        let store = JsonIdentityStore::open_with_root(&path, ObjectId::new("root")).unwrap();
        store
            .upsert(MappedObject::folder(
                ObjectId::new("f"),
                SyncPath::new("docs").unwrap(),
                Some(ObjectId::new("root")),
            ))
            .unwrap();
        store
            .upsert(
                MappedObject::file(
                    ObjectId::new("a"),
                    SyncPath::new("docs/a.txt").unwrap(),
                    Some(ObjectId::new("f")),
                )
                .with_fingerprint(ContentHash::new([1; 32])),
            )
            .unwrap();
        store.remove(&ObjectId::new("missing")).unwrap();
    }

    let reopened = JsonIdentityStore::open(&path).unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.root_id(), Some(ObjectId::new("root")));
    let file = reopened.lookup_by_id(&ObjectId::new("a")).unwrap();
    assert_eq!(file.fingerprint, Some(ContentHash::new([1; 32])));
    reopened.validate_structure().unwrap();
}

#[test]
fn test_json_store_detects_hand_edited_duplicates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identities.json");
    let doc = serde_json::json!({
        "version": 1,
        "records": [
            MappedObject::file(ObjectId::new("a"), SyncPath::new("x.txt").unwrap(), None),
            MappedObject::file(ObjectId::new("b"), SyncPath::new("x.txt").unwrap(), None),
            MappedObject::file(
                ObjectId::new("c"),
                SyncPath::new("gone/y.txt").unwrap(),
                Some(ObjectId::new("gone")),
            ),
        ],
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    let store = JsonIdentityStore::open(&path).unwrap();
    let report = match store.validate_structure() {
        Err(StoreError::Structural(report)) => report,
        other => panic!("expected structural error, got {other:?}"),
    };
    assert_eq!(report.records_checked, 3);
    assert!(report.issues.iter().any(|i| matches!(i, StructuralIssue::DuplicatePath { .. })));
    assert!(report.issues.iter().any(|i| matches!(i, StructuralIssue::DanglingParent { .. })));
}

#[test]
fn test_json_store_rejects_duplicate_identity() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identities.json");
    let doc = serde_json::json!({
        "version": 1,
        "records": [
            MappedObject::file(ObjectId::new("a"), SyncPath::new("x.txt").unwrap(), None),
            MappedObject::file(ObjectId::new("a"), SyncPath::new("y.txt").unwrap(), None),
        ],
    });
    std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();

    assert!(matches!(
        JsonIdentityStore::open(&path),
        Err(StoreError::Corrupt { .. })
    ));
}

#[test]
fn test_conflict_leaves_file_untouched() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("identities.json");
    let store = JsonIdentityStore::open(&path).unwrap();
    store.upsert(record(1, 1)).unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let err = store.upsert(record(2, 1)).unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}
