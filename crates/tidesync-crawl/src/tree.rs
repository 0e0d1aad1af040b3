//! Tree collaborator contracts and snapshot walks.

use std::any::Any;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tidesync_core::{ContentHash, IgnoreRules, ItemSnapshot, ObjectId, ObjectKind, SyncPath};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{CollaboratorError, CrawlError};

/// Opaque credential/session handle handed to the remote transport.
///
/// The crawler never looks inside; only the transport that created it can
/// downcast it back.
#[derive(Clone)]
pub struct SessionHandle(Arc<dyn Any + Send + Sync>);

impl SessionHandle {
    /// Wrap a transport-specific session.
    pub fn new<T: Any + Send + Sync>(session: T) -> Self {
        Self(Arc::new(session))
    }

    /// A session for transports that need none.
    pub fn anonymous() -> Self {
        Self::new(())
    }

    /// Recover the transport-specific session.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionHandle(..)")
    }
}

/// One child as reported by the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Server-assigned identity.
    pub id: ObjectId,
    /// Name within the parent folder.
    pub name: CompactString,
    /// Parent folder identity.
    pub parent: Option<ObjectId>,
    /// File or folder.
    pub kind: ObjectKind,
    /// Content fingerprint, when the server exposes one.
    #[serde(default)]
    pub fingerprint: Option<ContentHash>,
    /// Server change token or modification stamp.
    #[serde(default)]
    pub change_token: Option<CompactString>,
}

/// Remote tree access.
pub trait RemoteTree: Send + Sync {
    /// Identity of the configured remote root folder.
    fn root_id(&self, session: &SessionHandle) -> Result<ObjectId, CollaboratorError>;

    /// Children of a remote folder.
    fn children(
        &self,
        session: &SessionHandle,
        folder: &ObjectId,
    ) -> Result<Vec<RemoteItem>, CollaboratorError>;
}

/// One entry of the local tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalItem {
    /// Path relative to the sync root.
    pub path: SyncPath,
    /// File or folder.
    pub kind: ObjectKind,
    /// Size in bytes (0 for folders).
    pub size: u64,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
    /// Content hash for files, when readable.
    pub fingerprint: Option<ContentHash>,
}

impl LocalItem {
    /// Snapshot of this item for an event.
    pub fn to_snapshot(&self) -> ItemSnapshot {
        let mut snapshot = ItemSnapshot::new(self.path.clone(), self.kind);
        snapshot.fingerprint = self.fingerprint;
        snapshot.modified = self.modified;
        snapshot
    }
}

/// Result of one local walk.
#[derive(Debug, Clone, Default)]
pub struct LocalWalk {
    /// Every non-ignored item below the root.
    pub items: Vec<LocalItem>,
    /// Folders that could not be listed. Their contents are unknown for
    /// this crawl.
    pub unreadable: Vec<SyncPath>,
}

/// Local tree access.
pub trait LocalTree: Send + Sync {
    /// Children of a local directory.
    fn children(&self, dir: &SyncPath) -> Result<Vec<LocalItem>, CollaboratorError>;

    /// Every non-ignored item below the root.
    ///
    /// The default implementation walks breadth-first through
    /// [`children`](LocalTree::children), never descending into ignored
    /// folders. A walk that observes `cancel` may stop early; its result is
    /// then incomplete and must be discarded.
    fn walk(
        &self,
        rules: &IgnoreRules,
        cancel: &CancellationToken,
    ) -> Result<LocalWalk, CollaboratorError> {
        let mut out = LocalWalk::default();
        let mut queue = VecDeque::from([SyncPath::root()]);
        while let Some(dir) = queue.pop_front() {
            if cancel.is_cancelled() {
                break;
            }
            let children = match self.children(&dir) {
                Ok(children) => children,
                Err(e) if !dir.is_root() && e.class().is_transient() => {
                    warn!(%dir, error = %e, "Skipping unreadable local folder");
                    out.unreadable.push(dir);
                    continue;
                }
                Err(e) => return Err(e),
            };
            for item in children {
                if rules.is_ignored(&item.path) {
                    continue;
                }
                if item.kind.is_folder() {
                    queue.push_back(item.path.clone());
                }
                out.items.push(item);
            }
        }
        Ok(out)
    }
}

/// A remote item with its resolved sync-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// The item as listed.
    pub item: RemoteItem,
    /// Path relative to the sync root.
    pub path: SyncPath,
}

impl RemoteEntry {
    /// Snapshot of this item for an event.
    pub fn to_snapshot(&self) -> ItemSnapshot {
        let mut snapshot = ItemSnapshot::new(self.path.clone(), self.item.kind);
        snapshot.parent = self.item.parent.clone();
        snapshot.fingerprint = self.item.fingerprint;
        snapshot.change_token = self.item.change_token.clone();
        snapshot
    }
}

/// Materialized remote tree of one crawl.
#[derive(Debug, Clone, Default)]
pub struct RemoteSnapshot {
    /// Identity of the root folder.
    pub root_id: Option<ObjectId>,
    /// Every non-ignored entry, keyed by identity.
    pub entries: HashMap<ObjectId, RemoteEntry>,
}

impl RemoteSnapshot {
    /// Entries ordered by path, parents before children.
    pub fn by_path(&self) -> Vec<&RemoteEntry> {
        let mut entries: Vec<_> = self.entries.values().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries
    }
}

/// Materialized local tree of one crawl, ordered by path.
pub type LocalSnapshot = BTreeMap<SyncPath, LocalItem>;

/// Walk the remote tree breadth-first from its root.
///
/// Ignored items are dropped together with their subtrees. Children whose
/// name cannot form a path, or that collide with an earlier sibling, are
/// skipped with a warning.
pub fn walk_remote(
    tree: &dyn RemoteTree,
    session: &SessionHandle,
    rules: &IgnoreRules,
    cancel: &CancellationToken,
) -> Result<RemoteSnapshot, CrawlError> {
    let root_id = tree.root_id(session).map_err(CrawlError::Remote)?;
    let mut entries: HashMap<ObjectId, RemoteEntry> = HashMap::new();
    let mut taken: HashMap<SyncPath, ObjectId> = HashMap::new();
    let mut queue = VecDeque::from([(root_id.clone(), SyncPath::root())]);

    while let Some((folder, folder_path)) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }
        for item in tree.children(session, &folder).map_err(CrawlError::Remote)? {
            let path = match folder_path.join(&item.name) {
                Ok(path) => path,
                Err(e) => {
                    warn!(id = %item.id, error = %e, "Skipping remote item with unusable name");
                    continue;
                }
            };
            if rules.is_ignored(&path) {
                continue;
            }
            if let Some(holder) = taken.get(&path) {
                warn!(%path, id = %item.id, %holder, "Skipping remote item shadowed by a sibling");
                continue;
            }
            if entries.contains_key(&item.id) {
                warn!(id = %item.id, %path, "Remote item listed twice");
                continue;
            }
            if item.kind.is_folder() {
                queue.push_back((item.id.clone(), path.clone()));
            }
            taken.insert(path.clone(), item.id.clone());
            entries.insert(item.id.clone(), RemoteEntry { item, path });
        }
    }

    Ok(RemoteSnapshot {
        root_id: Some(root_id),
        entries,
    })
}

/// Walk the local tree and index it by path.
///
/// Items inside unreadable folders are dropped together with the folder
/// itself; the returned list names those folders.
pub fn walk_local(
    tree: &dyn LocalTree,
    rules: &IgnoreRules,
    cancel: &CancellationToken,
) -> Result<(LocalSnapshot, Vec<SyncPath>), CrawlError> {
    let walk = tree.walk(rules, cancel).map_err(CrawlError::Local)?;
    if cancel.is_cancelled() {
        return Err(CrawlError::Cancelled);
    }
    let unreadable = walk.unreadable;
    let snapshot = walk
        .items
        .into_iter()
        .filter(|item| !item.path.is_root() && !rules.is_ignored(&item.path))
        .filter(|item| !unreadable.iter().any(|dir| item.path.starts_with(dir)))
        .map(|item| (item.path.clone(), item))
        .collect();
    Ok((snapshot, unreadable))
}
