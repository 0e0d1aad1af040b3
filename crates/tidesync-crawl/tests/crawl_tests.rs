use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use tidesync_analyze::{refine, CycleDetector};
use tidesync_core::{
    ContentHash, EventKind, IgnoreList, MappedObject, ObjectId, ObjectKind, Origin, PathMapper,
    SyncPath,
};
use tidesync_crawl::{Crawler, FsLocalTree, JsonRemoteTree, RemoteItem};
use tidesync_store::{IdentityStore, MemoryIdentityStore};
use tokio_util::sync::CancellationToken;

fn p(s: &str) -> SyncPath {
    SyncPath::new(s).unwrap()
}

fn blake(bytes: &[u8]) -> ContentHash {
    ContentHash::new(*blake3::hash(bytes).as_bytes())
}

fn root() -> ObjectId {
    ObjectId::new("root")
}

/// Remote listing that mirrors the given records.
fn mirror(records: &[MappedObject]) -> JsonRemoteTree {
    let items = records
        .iter()
        .map(|r| RemoteItem {
            id: r.id.clone(),
            name: r.path.name().unwrap_or_default().into(),
            parent: r.parent.clone(),
            kind: r.kind,
            fingerprint: r.fingerprint,
            change_token: r.change_token.clone(),
        })
        .collect();
    JsonRemoteTree::new(root(), items)
}

fn crawler(dir: &TempDir, records: Vec<MappedObject>, ignore: IgnoreList) -> Crawler {
    let store = MemoryIdentityStore::with_root(root());
    for record in &records {
        store.upsert(record.clone()).unwrap();
    }
    let mapper = PathMapper::new(dir.path(), "/Sites/docs").unwrap();
    Crawler::new(
        Arc::new(store),
        Arc::new(FsLocalTree::new(mapper)),
        Arc::new(mirror(&records)),
        ignore,
    )
}

#[test]
fn first_crawl_reports_every_local_item() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs/b.txt"), b"beta").unwrap();
    fs::write(dir.path().join("a.txt"), b"alpha").unwrap();

    let events = crawler(&dir, Vec::new(), IgnoreList::default())
        .crawl(&CancellationToken::new())
        .unwrap();

    assert_eq!(events.len(), 3);
    assert_eq!(events.count_kind(EventKind::Created), 3);
    assert!(events.events().iter().all(|e| e.origin == Origin::Local));

    let top = events
        .events()
        .iter()
        .find(|e| e.snapshot.path == p("a.txt"))
        .unwrap();
    assert_eq!(top.snapshot.parent, Some(root()));
    assert_eq!(top.snapshot.fingerprint, Some(blake(b"alpha")));
}

#[test]
fn unchanged_tree_is_quiet() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    let records = vec![MappedObject::file(ObjectId::new("a"), p("a.txt"), Some(root()))
        .with_fingerprint(blake(b"alpha"))];

    let events = crawler(&dir, records, IgnoreList::default())
        .crawl(&CancellationToken::new())
        .unwrap();
    assert!(events.is_empty());
}

#[test]
fn local_rename_refines_to_one_event() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("renamed.txt"), b"alpha").unwrap();
    let records = vec![MappedObject::file(ObjectId::new("a"), p("a.txt"), Some(root()))
        .with_fingerprint(blake(b"alpha"))];

    let events = crawler(&dir, records, IgnoreList::default())
        .crawl(&CancellationToken::new())
        .unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.mergeable().contains_key(&ObjectId::new("a")));

    let plan = CycleDetector::new().detect(&events);
    let refined = refine(&events, &plan);
    assert_eq!(refined.len(), 1);
    assert_eq!(refined.merged_count(), 1);

    let event = refined.items()[0].event();
    assert_eq!(event.kind(), EventKind::Renamed);
    assert_eq!(event.object_id, Some(ObjectId::new("a")));
    assert_eq!(event.snapshot.path, p("renamed.txt"));
}

#[test]
fn local_swap_falls_back_to_delete_and_create() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a"), b"second").unwrap();
    fs::write(dir.path().join("b"), b"first").unwrap();
    let records = vec![
        MappedObject::file(ObjectId::new("x"), p("a"), Some(root())).with_fingerprint(blake(b"first")),
        MappedObject::file(ObjectId::new("y"), p("b"), Some(root())).with_fingerprint(blake(b"second")),
    ];

    let events = crawler(&dir, records, IgnoreList::default())
        .crawl(&CancellationToken::new())
        .unwrap();
    let plan = CycleDetector::new().detect(&events);
    assert_eq!(plan.cyclic().count(), 2);

    let refined = refine(&events, &plan);
    assert_eq!(refined.merged_count(), 0);
    assert_eq!(refined.len(), 4);
    let kinds: Vec<_> = refined.iter().map(|item| item.event().kind()).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Deleted, EventKind::Deleted, EventKind::Created, EventKind::Created]
    );
}

#[test]
fn ignored_paths_produce_no_events() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("cache")).unwrap();
    fs::write(dir.path().join("cache/blob.bin"), b"x").unwrap();
    fs::write(dir.path().join("~$report.docx"), b"lock").unwrap();
    // Recorded but gone from disk; ignored, so not reported as deleted.
    let records = vec![
        MappedObject::folder(ObjectId::new("cf"), p("cache"), Some(root())),
        MappedObject::file(ObjectId::new("old"), p("cache/old.bin"), Some(ObjectId::new("cf"))),
    ];

    let ignore = IgnoreList::new(vec![p("cache")], vec!["~$*".to_string()]);
    let events = crawler(&dir, records, ignore)
        .crawl(&CancellationToken::new())
        .unwrap();
    assert!(events.is_empty(), "unexpected events: {:?}", events.events());
}

#[test]
fn ignore_edits_apply_to_next_crawl() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("build")).unwrap();
    fs::write(dir.path().join("build/out.bin"), b"out").unwrap();

    let ignore = IgnoreList::default();
    let crawler = crawler(&dir, Vec::new(), ignore.clone());
    let cancel = CancellationToken::new();

    assert_eq!(crawler.crawl(&cancel).unwrap().len(), 2);

    assert!(ignore.add_prefix(p("build")));
    assert!(crawler.crawl(&cancel).unwrap().is_empty());

    assert!(ignore.remove_prefix(&p("build")));
    assert_eq!(crawler.crawl(&cancel).unwrap().len(), 2);
}

#[test]
fn remote_rename_reported_by_identity() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("reports")).unwrap();
    fs::write(dir.path().join("reports/q1.txt"), b"q1").unwrap();

    let folder = MappedObject::folder(ObjectId::new("f"), p("reports"), Some(root()));
    let child = MappedObject::file(ObjectId::new("c"), p("reports/q1.txt"), Some(ObjectId::new("f")))
        .with_fingerprint(blake(b"q1"));

    let store = MemoryIdentityStore::with_root(root());
    store.upsert(folder).unwrap();
    store.upsert(child).unwrap();

    let remote = JsonRemoteTree::new(
        root(),
        vec![
            RemoteItem {
                id: ObjectId::new("f"),
                name: "archive".into(),
                parent: Some(root()),
                kind: ObjectKind::Folder,
                fingerprint: None,
                change_token: None,
            },
            RemoteItem {
                id: ObjectId::new("c"),
                name: "q1.txt".into(),
                parent: Some(ObjectId::new("f")),
                kind: ObjectKind::File,
                fingerprint: Some(blake(b"q1")),
                change_token: None,
            },
        ],
    );
    let crawler = Crawler::new(
        Arc::new(store),
        Arc::new(FsLocalTree::new(PathMapper::new(dir.path(), "/").unwrap())),
        Arc::new(remote),
        IgnoreList::default(),
    );

    let events = crawler.crawl(&CancellationToken::new()).unwrap();
    assert_eq!(events.len(), 1);
    let event = &events.events()[0];
    assert_eq!(event.origin, Origin::Remote);
    assert_eq!(event.kind(), EventKind::Renamed);
    assert_eq!(event.change.vacated_path(), Some(&p("reports")));
    assert!(events.mergeable().is_empty());
}

#[test]
fn crawl_runs_inside_single_thread_pool() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs/b.txt"), b"beta").unwrap();

    let crawler = crawler(&dir, Vec::new(), IgnoreList::default());
    let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
    let events = pool
        .install(|| crawler.crawl(&CancellationToken::new()))
        .unwrap();
    assert_eq!(events.count_kind(EventKind::Created), 2);
}

#[test]
fn remote_swap_falls_back_to_delete_and_create() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a"), b"first").unwrap();
    fs::write(dir.path().join("b"), b"second").unwrap();

    let store = MemoryIdentityStore::with_root(root());
    for (id, path, bytes) in [("x", "a", b"first".as_slice()), ("y", "b", b"second".as_slice())] {
        let record = MappedObject::file(ObjectId::new(id), p(path), Some(root()));
        store.upsert(record.with_fingerprint(blake(bytes))).unwrap();
    }
    let listed = |id: &str, name: &str, bytes: &[u8]| RemoteItem {
        id: ObjectId::new(id),
        name: name.into(),
        parent: Some(root()),
        kind: ObjectKind::File,
        fingerprint: Some(blake(bytes)),
        change_token: None,
    };
    let remote = JsonRemoteTree::new(
        root(),
        vec![listed("x", "b", b"first"), listed("y", "a", b"second")],
    );
    let crawler = Crawler::new(
        Arc::new(store),
        Arc::new(FsLocalTree::new(PathMapper::new(dir.path(), "/").unwrap())),
        Arc::new(remote),
        IgnoreList::default(),
    );

    let events = crawler.crawl(&CancellationToken::new()).unwrap();
    assert_eq!(events.count_kind(EventKind::Renamed), 2);

    let plan = CycleDetector::new().detect(&events);
    let refined = refine(&events, &plan);
    assert_eq!(refined.unordered_count(), 0);
    assert!(refined.iter().all(|item| item.event().origin == Origin::Remote));
    let kinds: Vec<_> = refined.iter().map(|item| item.event().kind()).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Deleted, EventKind::Deleted, EventKind::Created, EventKind::Created]
    );
}

#[cfg(unix)]
#[test]
fn unreadable_folder_is_not_reported_deleted() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("locked")).unwrap();
    fs::write(dir.path().join("locked/inner.txt"), b"inner").unwrap();
    fs::write(dir.path().join("open.txt"), b"open").unwrap();
    let records = vec![
        MappedObject::folder(ObjectId::new("l"), p("locked"), Some(root())),
        MappedObject::file(ObjectId::new("i"), p("locked/inner.txt"), Some(ObjectId::new("l")))
            .with_fingerprint(blake(b"inner")),
        MappedObject::file(ObjectId::new("o"), p("open.txt"), Some(root()))
            .with_fingerprint(blake(b"open")),
    ];

    let locked = dir.path().join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // Privileged users can list it anyway.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let result = crawler(&dir, records, IgnoreList::default()).crawl(&CancellationToken::new());
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    let events = result.unwrap();
    assert!(events.is_empty(), "unexpected events: {:?}", events.events());
}
