use std::path::PathBuf;

use proptest::prelude::*;
use tidesync_core::{
    Change, ContentHash, CrawlEventCollection, EventKind, ItemSnapshot, MappedObject, ObjectId,
    ObjectKind, Origin, PathMapper, SyncEvent, SyncPath,
};

fn component() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_ ~$-][A-Za-z0-9_. ~$-]{0,11}".prop_filter("not a relative component", |s| {
        s != "." && s != ".."
    })
}

proptest! {
    #[test]
    fn local_remote_local_round_trips(parts in proptest::collection::vec(component(), 0..6)) {
        let mapper = PathMapper::new("/home/user/Sync", "/Sites/team/documentLibrary").unwrap();
        let mut local = PathBuf::from("/home/user/Sync");
        for part in &parts {
            local.push(part);
        }

        let remote = mapper.local_to_remote(&local).unwrap();
        prop_assert!(remote.starts_with("/Sites/team/documentLibrary"));
        prop_assert_eq!(mapper.remote_to_local(&remote).unwrap(), local);
    }

    #[test]
    fn remote_local_remote_round_trips(parts in proptest::collection::vec(component(), 1..6)) {
        let mapper = PathMapper::new("/data", "/repo").unwrap();
        let remote = format!("/repo/{}", parts.join("/"));

        let local = mapper.remote_to_local(&remote).unwrap();
        prop_assert_eq!(mapper.local_to_remote(&local).unwrap(), remote);
    }

    #[test]
    fn sync_path_parent_join_round_trips(parts in proptest::collection::vec(component(), 1..6)) {
        let path = SyncPath::new(&parts.join("/")).unwrap();
        let parent = path.parent().unwrap();
        let name = path.name().unwrap();
        prop_assert_eq!(parent.join(name).unwrap(), path);
    }
}

#[test]
fn test_mapped_object_serde_round_trip() {
    let record = MappedObject::file(
        ObjectId::new("doc-1"),
        SyncPath::new("reports/q1.xlsx").unwrap(),
        Some(ObjectId::new("folder-reports")),
    )
    .with_fingerprint(ContentHash::new([7; 32]))
    .with_change_token("1718000000000");

    let json = serde_json::to_string(&record).unwrap();
    let back: MappedObject = serde_json::from_str(&json).unwrap();
    assert!(record.same_state(&back));
}

#[test]
fn test_collection_tracks_mergeable_pair() {
    let mut events = CrawlEventCollection::new();
    let removal = events.push(SyncEvent::deleted(
        Origin::Local,
        ObjectId::new("doc-1"),
        ItemSnapshot::new(SyncPath::new("old.txt").unwrap(), ObjectKind::File),
    ));
    let creation = events.push(SyncEvent::created(
        Origin::Local,
        None,
        ItemSnapshot::new(SyncPath::new("new.txt").unwrap(), ObjectKind::File),
    ));
    events
        .add_mergeable(ObjectId::new("doc-1"), removal, creation)
        .unwrap();

    assert_eq!(events.mergeable().len(), 1);
    assert_eq!(events.count_kind(EventKind::Deleted), 1);

    let json = serde_json::to_value(&events).unwrap();
    assert_eq!(json["events"].as_array().unwrap().len(), 2);
    assert_eq!(json["events"][0]["change"]["kind"], "deleted");
}

#[test]
fn test_change_paths_cover_all_kinds() {
    let a = SyncPath::new("a").unwrap();
    let b = SyncPath::new("b").unwrap();
    let changes = [
        Change::Created { path: a.clone() },
        Change::Deleted { path: a.clone() },
        Change::Renamed {
            from: a.clone(),
            to: b.clone(),
        },
        Change::Moved {
            from: a.clone(),
            to: b.clone(),
        },
        Change::ContentChanged { path: a.clone() },
        Change::MetadataChanged { path: a.clone() },
    ];
    for change in &changes {
        assert!(change.paths().contains(&&a));
    }
}
