//! Persisted identity records.

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::event::ItemSnapshot;
use crate::node::{ContentHash, ObjectId, ObjectKind};
use crate::path::SyncPath;

/// The identity record for one synchronized file or folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedObject {
    /// Remote object identity.
    pub id: ObjectId,

    /// Path relative to the sync root.
    pub path: SyncPath,

    /// Remote identity of the parent folder (`None` for top-level items).
    pub parent: Option<ObjectId>,

    /// File or folder.
    pub kind: ObjectKind,

    /// Last observed content fingerprint (files only).
    #[serde(default)]
    pub fingerprint: Option<ContentHash>,

    /// Last observed remote change token.
    #[serde(default)]
    pub change_token: Option<CompactString>,

    /// Last observed local modification time.
    #[serde(default)]
    pub local_modified: Option<DateTime<Utc>>,

    /// When this record was last written.
    pub updated_at: DateTime<Utc>,
}

impl MappedObject {
    /// Create a file record.
    pub fn file(id: ObjectId, path: SyncPath, parent: Option<ObjectId>) -> Self {
        Self::new(id, path, parent, ObjectKind::File)
    }

    /// Create a folder record.
    pub fn folder(id: ObjectId, path: SyncPath, parent: Option<ObjectId>) -> Self {
        Self::new(id, path, parent, ObjectKind::Folder)
    }

    fn new(id: ObjectId, path: SyncPath, parent: Option<ObjectId>, kind: ObjectKind) -> Self {
        Self {
            id,
            path,
            parent,
            kind,
            fingerprint: None,
            change_token: None,
            local_modified: None,
            updated_at: Utc::now(),
        }
    }

    /// Set the content fingerprint.
    pub fn with_fingerprint(mut self, fingerprint: ContentHash) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    /// Set the remote change token.
    pub fn with_change_token(mut self, token: impl Into<CompactString>) -> Self {
        self.change_token = Some(token.into());
        self
    }

    /// Set the local modification time.
    pub fn with_local_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.local_modified = Some(modified);
        self
    }

    /// Compare everything except `updated_at`.
    pub fn same_state(&self, other: &MappedObject) -> bool {
        self.id == other.id
            && self.path == other.path
            && self.parent == other.parent
            && self.kind == other.kind
            && self.fingerprint == other.fingerprint
            && self.change_token == other.change_token
            && self.local_modified == other.local_modified
    }

    /// Snapshot of the last known state, used as the subject of deletions.
    pub fn to_snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            path: self.path.clone(),
            kind: self.kind,
            parent: self.parent.clone(),
            fingerprint: self.fingerprint,
            change_token: self.change_token.clone(),
            modified: self.local_modified,
        }
    }
}
