//! Crawl event model.
//!
//! A [`SyncEvent`] records one detected delta on one side of a sync root.
//! The delta itself is a closed [`Change`] enum; behavior that differs per
//! kind is matched exhaustively so a new kind cannot slip past any site.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::node::{ContentHash, ObjectId, ObjectKind};
use crate::path::SyncPath;

/// Which tree a change was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum Origin {
    /// The local directory tree.
    Local,
    /// The remote repository tree.
    Remote,
}

impl Origin {
    /// The other side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }
}

/// Discriminant of a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum EventKind {
    Created,
    Deleted,
    Renamed,
    Moved,
    ContentChanged,
    MetadataChanged,
}

/// A single detected delta with the path(s) it involves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    /// A new item appeared.
    Created { path: SyncPath },
    /// A known item disappeared.
    Deleted { path: SyncPath },
    /// A known item changed name within the same parent.
    Renamed { from: SyncPath, to: SyncPath },
    /// A known item changed parent.
    Moved { from: SyncPath, to: SyncPath },
    /// Content of a known file changed in place.
    ContentChanged { path: SyncPath },
    /// Metadata (timestamps, change token) changed in place.
    MetadataChanged { path: SyncPath },
}

impl Change {
    /// Build a rename or move depending on whether the parent changed.
    pub fn relocation(from: SyncPath, to: SyncPath) -> Self {
        if from.is_sibling_of(&to) {
            Self::Renamed { from, to }
        } else {
            Self::Moved { from, to }
        }
    }

    /// The kind discriminant.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Created { .. } => EventKind::Created,
            Self::Deleted { .. } => EventKind::Deleted,
            Self::Renamed { .. } => EventKind::Renamed,
            Self::Moved { .. } => EventKind::Moved,
            Self::ContentChanged { .. } => EventKind::ContentChanged,
            Self::MetadataChanged { .. } => EventKind::MetadataChanged,
        }
    }

    /// The path this change frees up, if any.
    pub fn vacated_path(&self) -> Option<&SyncPath> {
        match self {
            Self::Deleted { path } => Some(path),
            Self::Renamed { from, .. } | Self::Moved { from, .. } => Some(from),
            Self::Created { .. } | Self::ContentChanged { .. } | Self::MetadataChanged { .. } => {
                None
            }
        }
    }

    /// The path this change occupies, if any.
    pub fn claimed_path(&self) -> Option<&SyncPath> {
        match self {
            Self::Created { path } => Some(path),
            Self::Renamed { to, .. } | Self::Moved { to, .. } => Some(to),
            Self::Deleted { .. } | Self::ContentChanged { .. } | Self::MetadataChanged { .. } => {
                None
            }
        }
    }

    /// Every path the change touches.
    pub fn paths(&self) -> Vec<&SyncPath> {
        match self {
            Self::Created { path }
            | Self::Deleted { path }
            | Self::ContentChanged { path }
            | Self::MetadataChanged { path } => vec![path],
            Self::Renamed { from, to } | Self::Moved { from, to } => vec![from, to],
        }
    }
}

/// The observed state of an item at crawl time.
///
/// For deletions this is the last state recorded in the identity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    /// Path relative to the sync root.
    pub path: SyncPath,
    /// File or folder.
    pub kind: ObjectKind,
    /// Remote parent identity, when known.
    pub parent: Option<ObjectId>,
    /// Content fingerprint, when known.
    pub fingerprint: Option<ContentHash>,
    /// Remote change token, when known.
    pub change_token: Option<CompactString>,
    /// Local modification time, when known.
    pub modified: Option<DateTime<Utc>>,
}

impl ItemSnapshot {
    /// Create a snapshot with only path and kind.
    pub fn new(path: SyncPath, kind: ObjectKind) -> Self {
        Self {
            path,
            kind,
            parent: None,
            fingerprint: None,
            change_token: None,
            modified: None,
        }
    }
}

/// One detected delta. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Which tree the change was observed on.
    pub origin: Origin,
    /// Affected object, `None` for a local creation not yet mapped.
    pub object_id: Option<ObjectId>,
    /// The change itself.
    pub change: Change,
    /// State of the underlying item.
    pub snapshot: ItemSnapshot,
}

impl SyncEvent {
    /// A new item.
    pub fn created(origin: Origin, object_id: Option<ObjectId>, snapshot: ItemSnapshot) -> Self {
        Self {
            origin,
            object_id,
            change: Change::Created {
                path: snapshot.path.clone(),
            },
            snapshot,
        }
    }

    /// A known item is gone. `last_known` is the stored state.
    pub fn deleted(origin: Origin, object_id: ObjectId, last_known: ItemSnapshot) -> Self {
        Self {
            origin,
            object_id: Some(object_id),
            change: Change::Deleted {
                path: last_known.path.clone(),
            },
            snapshot: last_known,
        }
    }

    /// A known item changed path.
    pub fn relocated(
        origin: Origin,
        object_id: ObjectId,
        from: SyncPath,
        snapshot: ItemSnapshot,
    ) -> Self {
        Self {
            origin,
            object_id: Some(object_id),
            change: Change::relocation(from, snapshot.path.clone()),
            snapshot,
        }
    }

    /// A known item changed path, classified by parent identity.
    ///
    /// The item was renamed when `from_parent` and the snapshot's parent
    /// are the same object, and moved when they differ. When either is
    /// unknown the parent paths decide.
    pub fn relocated_from(
        origin: Origin,
        object_id: ObjectId,
        from: SyncPath,
        from_parent: Option<&ObjectId>,
        snapshot: ItemSnapshot,
    ) -> Self {
        let to = snapshot.path.clone();
        let change = match (from_parent, snapshot.parent.as_ref()) {
            (Some(old), Some(new)) if old == new => Change::Renamed { from, to },
            (Some(_), Some(_)) => Change::Moved { from, to },
            _ => Change::relocation(from, to),
        };
        Self {
            origin,
            object_id: Some(object_id),
            change,
            snapshot,
        }
    }

    /// Content changed in place.
    pub fn content_changed(origin: Origin, object_id: ObjectId, snapshot: ItemSnapshot) -> Self {
        Self {
            origin,
            object_id: Some(object_id),
            change: Change::ContentChanged {
                path: snapshot.path.clone(),
            },
            snapshot,
        }
    }

    /// Metadata changed in place.
    pub fn metadata_changed(origin: Origin, object_id: ObjectId, snapshot: ItemSnapshot) -> Self {
        Self {
            origin,
            object_id: Some(object_id),
            change: Change::MetadataChanged {
                path: snapshot.path.clone(),
            },
            snapshot,
        }
    }

    /// The kind discriminant.
    pub fn kind(&self) -> EventKind {
        self.change.kind()
    }

    /// File or folder.
    pub fn object_kind(&self) -> ObjectKind {
        self.snapshot.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> SyncPath {
        SyncPath::new(s).unwrap()
    }

    #[test]
    fn test_relocation_picks_rename_or_move() {
        assert_eq!(
            Change::relocation(p("a/x"), p("a/y")).kind(),
            EventKind::Renamed
        );
        assert_eq!(Change::relocation(p("a/x"), p("b/x")).kind(), EventKind::Moved);
    }

    #[test]
    fn test_relocated_from_compares_parent_identity() {
        let folder = ObjectId::new("folder");
        let mut snapshot = ItemSnapshot::new(p("renamed/y"), ObjectKind::File);
        snapshot.parent = Some(folder.clone());

        // The folder itself was renamed, so the parent paths differ.
        let event = SyncEvent::relocated_from(
            Origin::Remote,
            ObjectId::new("x"),
            p("folder/x"),
            Some(&folder),
            snapshot.clone(),
        );
        assert_eq!(event.kind(), EventKind::Renamed);

        let event = SyncEvent::relocated_from(
            Origin::Remote,
            ObjectId::new("x"),
            p("renamed/x"),
            Some(&ObjectId::new("other")),
            snapshot.clone(),
        );
        assert_eq!(event.kind(), EventKind::Moved);

        snapshot.parent = None;
        let event =
            SyncEvent::relocated_from(Origin::Remote, ObjectId::new("x"), p("a/x"), None, snapshot);
        assert_eq!(event.kind(), EventKind::Moved);
    }

    #[test]
    fn test_vacated_and_claimed_paths() {
        let moved = Change::Moved {
            from: p("a"),
            to: p("b/a"),
        };
        assert_eq!(moved.vacated_path(), Some(&p("a")));
        assert_eq!(moved.claimed_path(), Some(&p("b/a")));

        let changed = Change::ContentChanged { path: p("c") };
        assert_eq!(changed.vacated_path(), None);
        assert_eq!(changed.claimed_path(), None);
        assert_eq!(changed.paths(), vec![&p("c")]);
    }

    #[test]
    fn test_event_constructors() {
        let snapshot = ItemSnapshot::new(p("docs/new.txt"), ObjectKind::File);
        let event = SyncEvent::created(Origin::Local, None, snapshot);
        assert_eq!(event.kind(), EventKind::Created);
        assert!(event.object_id.is_none());

        let event = SyncEvent::relocated(
            Origin::Remote,
            ObjectId::new("7"),
            p("old/new.txt"),
            ItemSnapshot::new(p("docs/new.txt"), ObjectKind::File),
        );
        assert_eq!(event.kind(), EventKind::Moved);
        assert_eq!(Origin::Remote.opposite(), Origin::Local);
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::ContentChanged.to_string(), "ContentChanged");
        assert_eq!(Origin::Local.to_string(), "Local");
    }
}
