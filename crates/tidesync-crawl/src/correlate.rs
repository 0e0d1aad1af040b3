//! Correlation of tree snapshots against the identity store.
//!
//! The remote side reports identities, so remote items are matched to
//! records by identity. The local side has only paths and content hashes,
//! so local items are matched by path, and rename/move candidates are
//! found afterwards by pairing deletions with creations.

use std::collections::{HashMap, HashSet};

use tidesync_core::{
    ContentHash, CoreError, CrawlEventCollection, EventId, ItemSnapshot, MappedObject, ObjectId,
    ObjectKind, Origin, SyncEvent, SyncPath,
};
use tracing::debug;

use crate::tree::{LocalItem, LocalSnapshot, RemoteEntry, RemoteSnapshot};

/// Compare both trees with the stored records and collect the events.
///
/// `records` must already exclude ignored paths.
pub(crate) fn correlate(
    records: &[MappedObject],
    local: &LocalSnapshot,
    remote: &RemoteSnapshot,
) -> Result<CrawlEventCollection, CoreError> {
    let mut events = CrawlEventCollection::new();
    remote_events(records, remote, &mut events);
    local_events(records, local, remote.root_id.as_ref(), &mut events)?;
    Ok(events)
}

fn remote_events(records: &[MappedObject], remote: &RemoteSnapshot, events: &mut CrawlEventCollection) {
    let by_id: HashMap<&ObjectId, &MappedObject> = records.iter().map(|r| (&r.id, r)).collect();

    // Folders that changed path, old path to new path.
    let moved_folders: HashMap<&SyncPath, &SyncPath> = remote
        .by_path()
        .into_iter()
        .filter_map(|entry| {
            let record = *by_id.get(&entry.item.id)?;
            (record.kind.is_folder() && entry.item.kind.is_folder() && record.path != entry.path)
                .then_some((&record.path, &entry.path))
        })
        .collect();

    let mut deletions = Vec::new();
    let mut relocations = Vec::new();
    let mut creations = Vec::new();
    let mut changes = Vec::new();

    for entry in remote.by_path() {
        let id = &entry.item.id;
        let snapshot = entry.to_snapshot();
        let Some(record) = by_id.get(id) else {
            creations.push(SyncEvent::created(Origin::Remote, Some(id.clone()), snapshot));
            continue;
        };

        if record.kind != entry.item.kind {
            deletions.push(SyncEvent::deleted(Origin::Remote, id.clone(), record.to_snapshot()));
            creations.push(SyncEvent::created(Origin::Remote, Some(id.clone()), snapshot));
            continue;
        }

        if record.path != entry.path && !carried_by_ancestor(record, entry) {
            // Once a moved ancestor is applied the item sits below its new path.
            let from = after_ancestor_moves(&record.path, &moved_folders);
            if from != entry.path {
                relocations.push(SyncEvent::relocated_from(
                    Origin::Remote,
                    id.clone(),
                    from,
                    record.parent.as_ref(),
                    snapshot.clone(),
                ));
            }
        }

        let token_moved = both_differ(&record.change_token, &entry.item.change_token);
        match entry.item.kind {
            ObjectKind::File => {
                if token_moved || both_differ(&record.fingerprint, &entry.item.fingerprint) {
                    changes.push(SyncEvent::content_changed(Origin::Remote, id.clone(), snapshot));
                }
            }
            ObjectKind::Folder => {
                if token_moved {
                    changes.push(SyncEvent::metadata_changed(Origin::Remote, id.clone(), snapshot));
                }
            }
        }
    }

    for record in records {
        if !remote.entries.contains_key(&record.id) {
            deletions.push(SyncEvent::deleted(
                Origin::Remote,
                record.id.clone(),
                record.to_snapshot(),
            ));
        }
    }

    for event in deletions.into_iter().chain(relocations).chain(creations).chain(changes) {
        events.push(event);
    }
}

/// An item that kept its name and parent only changed path because an
/// ancestor moved; the ancestor's relocation carries it.
fn carried_by_ancestor(record: &MappedObject, entry: &RemoteEntry) -> bool {
    record.parent.is_some()
        && record.parent == entry.item.parent
        && record.path.name() == entry.path.name()
}

/// `path` rebased onto the new location of its closest moved ancestor.
fn after_ancestor_moves(path: &SyncPath, moved_folders: &HashMap<&SyncPath, &SyncPath>) -> SyncPath {
    std::iter::successors(path.parent(), SyncPath::parent)
        .take_while(|ancestor| !ancestor.is_root())
        .find_map(|ancestor| {
            let target = moved_folders.get(&ancestor)?;
            path.rebase(&ancestor, target)
        })
        .unwrap_or_else(|| path.clone())
}

fn both_differ<T: PartialEq>(stored: &Option<T>, current: &Option<T>) -> bool {
    matches!((stored, current), (Some(a), Some(b)) if a != b)
}

fn local_events(
    records: &[MappedObject],
    local: &LocalSnapshot,
    root_id: Option<&ObjectId>,
    events: &mut CrawlEventCollection,
) -> Result<(), CoreError> {
    let by_path: HashMap<&SyncPath, &MappedObject> = records.iter().map(|r| (&r.path, r)).collect();
    let mut by_fingerprint: HashMap<ContentHash, Vec<&MappedObject>> = HashMap::new();
    for record in records.iter().filter(|r| r.kind.is_file()) {
        if let Some(hash) = record.fingerprint {
            by_fingerprint.entry(hash).or_default().push(record);
        }
    }

    // A file record whose path no longer holds its stored content.
    let vacated = |record: &MappedObject| match local.get(&record.path) {
        None => true,
        Some(item) if item.kind != record.kind => true,
        Some(item) => both_differ(&record.fingerprint, &item.fingerprint),
    };

    let mut deleted: Vec<&MappedObject> = Vec::new();
    let mut created: Vec<&LocalItem> = Vec::new();
    let mut changes: Vec<SyncEvent> = Vec::new();

    for record in records {
        let Some(item) = local.get(&record.path) else {
            deleted.push(record);
            continue;
        };
        if item.kind != record.kind {
            deleted.push(record);
            created.push(item);
            continue;
        }
        if item.kind.is_folder() {
            continue;
        }

        match (record.fingerprint, item.fingerprint) {
            (Some(old), Some(new)) if old != new => {
                // New content equal to another record's old content that has
                // left its own path: this path was taken over by that object.
                let taken_over = by_fingerprint
                    .get(&new)
                    .is_some_and(|others| others.iter().any(|o| o.id != record.id && vacated(o)));
                if taken_over {
                    deleted.push(record);
                    created.push(item);
                } else {
                    changes.push(SyncEvent::content_changed(
                        Origin::Local,
                        record.id.clone(),
                        local_snapshot(item, record),
                    ));
                }
            }
            (Some(_), Some(_)) => {
                if both_differ(&record.local_modified, &item.modified) {
                    changes.push(SyncEvent::metadata_changed(
                        Origin::Local,
                        record.id.clone(),
                        local_snapshot(item, record),
                    ));
                }
            }
            // Unreadable now, or never hashed: nothing to compare.
            _ => {}
        }
    }

    for (path, item) in local {
        if !by_path.contains_key(path) {
            created.push(item);
        }
    }
    created.sort_by(|a, b| a.path.cmp(&b.path));

    let pairs = pair_candidates(&deleted, &created);

    // Keys of folder pairs by the path they claim, for parent resolution.
    let claimed_by_pair: HashMap<&SyncPath, &ObjectId> = pairs
        .iter()
        .filter(|(d, c)| created[*c].kind.is_folder() && deleted[*d].kind.is_folder())
        .map(|(d, c)| (&created[*c].path, &deleted[*d].id))
        .collect();
    let removed_paths: HashSet<&SyncPath> = deleted.iter().map(|r| &r.path).collect();

    let mut removal_ids = Vec::with_capacity(deleted.len());
    for record in &deleted {
        removal_ids.push(events.push(SyncEvent::deleted(
            Origin::Local,
            record.id.clone(),
            record.to_snapshot(),
        )));
    }

    let mut creation_ids: Vec<EventId> = Vec::with_capacity(created.len());
    for item in &created {
        let mut snapshot = item.to_snapshot();
        snapshot.parent = match item.path.parent() {
            Some(parent) if parent.is_root() => root_id.cloned(),
            Some(parent) => claimed_by_pair.get(&parent).map(|id| (*id).clone()).or_else(|| {
                by_path
                    .get(&parent)
                    .filter(|r| r.kind.is_folder() && !removed_paths.contains(&r.path))
                    .map(|r| r.id.clone())
            }),
            None => None,
        };
        creation_ids.push(events.push(SyncEvent::created(Origin::Local, None, snapshot)));
    }

    for event in changes {
        events.push(event);
    }

    for (d, c) in pairs {
        events.add_mergeable(deleted[d].id.clone(), removal_ids[d], creation_ids[c])?;
    }

    debug!(
        deleted = deleted.len(),
        created = created.len(),
        pairs = events.mergeable().len(),
        "Correlated local tree"
    );
    Ok(())
}

/// Match deletions with creations of the same kind: files by content hash,
/// folders by name. Only unambiguous one-to-one matches are paired.
fn pair_candidates(deleted: &[&MappedObject], created: &[&LocalItem]) -> Vec<(usize, usize)> {
    #[derive(PartialEq, Eq, Hash)]
    enum Key<'a> {
        Content(ContentHash),
        Name(&'a str),
    }

    let mut removals: HashMap<Key<'_>, Vec<usize>> = HashMap::new();
    for (index, record) in deleted.iter().enumerate() {
        let key = match record.kind {
            ObjectKind::File => record.fingerprint.map(Key::Content),
            ObjectKind::Folder => record.path.name().map(Key::Name),
        };
        if let Some(key) = key {
            removals.entry(key).or_default().push(index);
        }
    }

    let mut creations: HashMap<Key<'_>, Vec<usize>> = HashMap::new();
    for (index, item) in created.iter().enumerate() {
        let key = match item.kind {
            ObjectKind::File => item.fingerprint.map(Key::Content),
            ObjectKind::Folder => item.path.name().map(Key::Name),
        };
        if let Some(key) = key {
            creations.entry(key).or_default().push(index);
        }
    }

    let mut pairs: Vec<(usize, usize)> = removals
        .iter()
        .filter_map(|(key, removed)| {
            let added = creations.get(key)?;
            match (removed.as_slice(), added.as_slice()) {
                ([d], [c]) if deleted[*d].kind == created[*c].kind => Some((*d, *c)),
                _ => None,
            }
        })
        .collect();
    pair_renamed_folders(deleted, created, &mut pairs);
    pairs.sort_unstable();
    pairs
}

/// Pair a vacated folder with a new folder of a different name when every
/// paired child of the old folder landed in that new folder. Deepest
/// folders go first so nested renames build on each other.
fn pair_renamed_folders(
    deleted: &[&MappedObject],
    created: &[&LocalItem],
    pairs: &mut Vec<(usize, usize)>,
) {
    let mut folders: Vec<usize> = (0..deleted.len())
        .filter(|&d| deleted[d].kind.is_folder())
        .collect();
    folders.sort_by_key(|&d| std::cmp::Reverse(deleted[d].path.depth()));

    for d in folders {
        if pairs.iter().any(|(paired, _)| *paired == d) {
            continue;
        }
        let old = &deleted[d].path;
        let mut targets = pairs
            .iter()
            .filter(|(pd, _)| deleted[*pd].path.parent().as_ref() == Some(old))
            .map(|(_, pc)| created[*pc].path.parent());
        let Some(Some(target)) = targets.next() else {
            continue;
        };
        if !targets.all(|t| t.as_ref() == Some(&target)) {
            continue;
        }
        let Some(c) = created
            .iter()
            .position(|item| item.path == target && item.kind.is_folder())
        else {
            continue;
        };
        if pairs.iter().any(|(_, paired)| *paired == c) {
            continue;
        }
        pairs.push((d, c));
    }
}

fn local_snapshot(item: &LocalItem, record: &MappedObject) -> ItemSnapshot {
    let mut snapshot = item.to_snapshot();
    snapshot.parent = record.parent.clone();
    snapshot.change_token = record.change_token.clone();
    snapshot
}
