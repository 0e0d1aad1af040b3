//! Remote tree loaded from a JSON snapshot.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tidesync_core::ObjectId;

use crate::error::CollaboratorError;
use crate::tree::{RemoteItem, RemoteTree, SessionHandle};

/// On-disk layout of a remote snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSnapshotFile {
    /// Identity of the remote root folder.
    pub root_id: ObjectId,
    /// Every item below the root, in any order.
    pub items: Vec<RemoteItem>,
}

/// Remote tree served from an in-memory listing.
///
/// Stands in for the protocol transport in the CLI and in tests.
#[derive(Debug, Clone)]
pub struct JsonRemoteTree {
    root_id: ObjectId,
    children: HashMap<ObjectId, Vec<RemoteItem>>,
}

impl JsonRemoteTree {
    /// Build a tree from a root identity and its items.
    ///
    /// Items without a parent are attached to the root.
    pub fn new(root_id: ObjectId, items: Vec<RemoteItem>) -> Self {
        let mut children: HashMap<ObjectId, Vec<RemoteItem>> = HashMap::new();
        for item in items {
            let parent = item.parent.clone().unwrap_or_else(|| root_id.clone());
            children.entry(parent).or_default().push(item);
        }
        Self { root_id, children }
    }

    /// Parse a snapshot document.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let file: RemoteSnapshotFile = serde_json::from_str(json)?;
        Ok(Self::new(file.root_id, file.items))
    }

    /// Load a snapshot document from disk.
    pub fn open(path: &Path) -> Result<Self, CollaboratorError> {
        let json = std::fs::read_to_string(path).map_err(|e| CollaboratorError::io(path, e))?;
        Self::from_json_str(&json).map_err(|e| {
            CollaboratorError::fatal(format!("Malformed remote snapshot {}", path.display()))
                .with_source(e)
        })
    }

    /// Number of items below the root.
    pub fn len(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }

    /// Check if the root has no descendants.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RemoteTree for JsonRemoteTree {
    fn root_id(&self, _session: &SessionHandle) -> Result<ObjectId, CollaboratorError> {
        Ok(self.root_id.clone())
    }

    fn children(
        &self,
        _session: &SessionHandle,
        folder: &ObjectId,
    ) -> Result<Vec<RemoteItem>, CollaboratorError> {
        Ok(self.children.get(folder).cloned().unwrap_or_default())
    }
}
