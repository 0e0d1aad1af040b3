//! Identity store commits after confirmed application.

use std::sync::Arc;

use serde::Serialize;
use tidesync_core::{
    Change, ItemSnapshot, MappedObject, ObjectId, ObjectKind, SyncEvent, SyncPath,
};
use tidesync_store::{IdentityStore, StoreError, StoreMutation};
use tracing::{debug, warn};

use crate::error::SyncError;

/// What a single commit did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    /// The store changed.
    Written,
    /// The store already held this state.
    Unchanged,
    /// The path was held by another identity; retried by the next crawl.
    Deferred,
}

/// A commit left for the next cycle.
#[derive(Debug, Clone, Serialize)]
pub struct DeferredCommit {
    /// Identity that could not be written.
    pub id: ObjectId,
    /// Path it wanted.
    pub path: SyncPath,
    /// Why it was deferred.
    pub reason: String,
}

/// Write access to the identity store handed to the applier.
///
/// The applier calls into this only after an operation is confirmed on
/// the target side. Every call is one atomic store write, folder subtrees
/// included, and replaying a commit is harmless, so at-least-once delivery
/// is fine. Path conflicts do not end the cycle; they are logged and
/// deferred.
pub struct CommitHandle {
    store: Arc<dyn IdentityStore>,
    written: usize,
    unchanged: usize,
    deferred: Vec<DeferredCommit>,
}

impl CommitHandle {
    /// Create a handle over a store.
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            written: 0,
            unchanged: 0,
            deferred: Vec::new(),
        }
    }

    /// The underlying store, for lookups.
    pub fn store(&self) -> &dyn IdentityStore {
        self.store.as_ref()
    }

    /// Number of commits that changed the store.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Number of commits that were already in place.
    pub fn unchanged(&self) -> usize {
        self.unchanged
    }

    /// Commits deferred by path conflicts.
    pub fn deferred(&self) -> &[DeferredCommit] {
        &self.deferred
    }

    /// Record the state of a confirmed event.
    ///
    /// `assigned` is the identity the remote gave a newly uploaded item;
    /// it is required for local creations and ignored otherwise.
    pub fn confirm(
        &mut self,
        event: &SyncEvent,
        assigned: Option<&ObjectId>,
    ) -> Result<CommitOutcome, SyncError> {
        let id = event
            .object_id
            .as_ref()
            .or(assigned)
            .ok_or_else(|| SyncError::MissingIdentity {
                path: event.snapshot.path.clone(),
            })?
            .clone();

        match &event.change {
            Change::Deleted { .. } => self.remove(&id),
            Change::Renamed { .. } | Change::Moved { .. } => self.relocate(&id, &event.snapshot),
            Change::Created { .. }
            | Change::ContentChanged { .. }
            | Change::MetadataChanged { .. } => {
                let record = self.merged_record(id, &event.snapshot);
                self.upsert(record)
            }
        }
    }

    /// Insert or update a record.
    pub fn upsert(&mut self, record: MappedObject) -> Result<CommitOutcome, SyncError> {
        let id = record.id.clone();
        let path = record.path.clone();
        match self.store.upsert(record) {
            Ok(outcome) if outcome.is_change() => {
                self.written += 1;
                Ok(CommitOutcome::Written)
            }
            Ok(_) => {
                self.unchanged += 1;
                Ok(CommitOutcome::Unchanged)
            }
            Err(e @ StoreError::PathConflict { .. }) => Ok(self.defer(id, path, &e)),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a record and, for folders, every record below it, in one
    /// store write.
    pub fn remove(&mut self, id: &ObjectId) -> Result<CommitOutcome, SyncError> {
        let Some(existing) = self.store.lookup_by_id(id) else {
            self.unchanged += 1;
            return Ok(CommitOutcome::Unchanged);
        };

        let mut batch = vec![StoreMutation::Remove(id.clone())];
        if existing.kind.is_folder() {
            batch.extend(
                self.store
                    .records()
                    .into_iter()
                    .filter(|r| r.path.starts_with(&existing.path) && r.path != existing.path)
                    .map(|r| StoreMutation::Remove(r.id)),
            );
        }
        self.commit_batch(id, &existing.path, batch)
    }

    /// Move a record to the snapshot's path. Records below a relocated
    /// folder follow it in the same store write.
    pub fn relocate(
        &mut self,
        id: &ObjectId,
        snapshot: &ItemSnapshot,
    ) -> Result<CommitOutcome, SyncError> {
        let previous = self.store.lookup_by_id(id);
        let record = self.merged_record(id.clone(), snapshot);

        let previous = match previous {
            Some(previous) if previous.kind.is_folder() && previous.path != snapshot.path => {
                previous
            }
            _ => return self.upsert(record),
        };

        let mut descendants: Vec<MappedObject> = self
            .store
            .records()
            .into_iter()
            .filter(|r| r.path.starts_with(&previous.path) && r.path != previous.path)
            .collect();
        descendants.sort_by_key(|r| r.path.depth());
        debug!(
            %id,
            from = %previous.path,
            to = %snapshot.path,
            descendants = descendants.len(),
            "Rebasing folder contents"
        );

        let mut batch = Vec::with_capacity(descendants.len() + 1);
        batch.push(StoreMutation::Upsert(record));
        for mut descendant in descendants {
            if let Some(path) = descendant.path.rebase(&previous.path, &snapshot.path) {
                descendant.path = path;
                batch.push(StoreMutation::Upsert(descendant));
            }
        }
        self.commit_batch(id, &snapshot.path, batch)
    }

    fn commit_batch(
        &mut self,
        id: &ObjectId,
        path: &SyncPath,
        batch: Vec<StoreMutation>,
    ) -> Result<CommitOutcome, SyncError> {
        match self.store.apply_batch(batch) {
            Ok(outcomes) => {
                let changed = outcomes.iter().filter(|o| o.is_change()).count();
                if changed == 0 {
                    self.unchanged += 1;
                    return Ok(CommitOutcome::Unchanged);
                }
                self.written += changed;
                Ok(CommitOutcome::Written)
            }
            Err(e @ StoreError::PathConflict { .. }) => {
                Ok(self.defer(id.clone(), path.clone(), &e))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn defer(&mut self, id: ObjectId, path: SyncPath, error: &StoreError) -> CommitOutcome {
        warn!(%id, %path, %error, "Deferring identity commit");
        self.deferred.push(DeferredCommit {
            id,
            path,
            reason: error.to_string(),
        });
        CommitOutcome::Deferred
    }

    /// The folder that holds `path` in the store: the sync root for
    /// top-level items, otherwise the folder record at the parent path.
    fn parent_of(&self, path: &SyncPath) -> Option<ObjectId> {
        let parent = path.parent()?;
        if parent.is_root() {
            return self.store.root_id();
        }
        self.store
            .lookup_by_path(&parent)
            .filter(|record| record.kind.is_folder())
            .map(|record| record.id)
    }

    /// The stored record updated with whatever the snapshot knows.
    ///
    /// The parent follows the path. Local creations below a folder created
    /// in the same pass carry no parent identity, so the store, which
    /// already holds the confirmed folder, decides.
    fn merged_record(&self, id: ObjectId, snapshot: &ItemSnapshot) -> MappedObject {
        let (mut record, stayed) = match self.store.lookup_by_id(&id) {
            Some(existing) if existing.kind == snapshot.kind => {
                let stayed = existing.path.parent() == snapshot.path.parent();
                (existing, stayed)
            }
            _ => {
                let record = match snapshot.kind {
                    ObjectKind::File => MappedObject::file(id, snapshot.path.clone(), None),
                    ObjectKind::Folder => MappedObject::folder(id, snapshot.path.clone(), None),
                };
                (record, false)
            }
        };
        record.path = snapshot.path.clone();
        record.parent = match self.parent_of(&snapshot.path) {
            Some(parent) => Some(parent),
            None if snapshot.parent.is_some() => snapshot.parent.clone(),
            None if stayed => record.parent,
            None => None,
        };
        if snapshot.fingerprint.is_some() {
            record.fingerprint = snapshot.fingerprint;
        }
        if snapshot.change_token.is_some() {
            record.change_token = snapshot.change_token.clone();
        }
        if snapshot.modified.is_some() {
            record.local_modified = snapshot.modified;
        }
        record.updated_at = chrono::Utc::now();
        record
    }
}

impl std::fmt::Debug for CommitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitHandle")
            .field("written", &self.written)
            .field("unchanged", &self.unchanged)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}
