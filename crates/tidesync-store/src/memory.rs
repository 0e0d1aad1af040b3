//! In-memory identity store.

use parking_lot::RwLock;
use tidesync_core::{MappedObject, ObjectId, SyncPath};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::state::StoreState;
use crate::validate::StructuralReport;
use crate::{IdentityStore, MutationOutcome, StoreMutation, UpsertOutcome};

/// Identity store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    state: RwLock<StoreState>,
}

impl MemoryIdentityStore {
    /// Create an empty store with no known root identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose top-level records hang off `root_id`.
    pub fn with_root(root_id: ObjectId) -> Self {
        Self {
            state: RwLock::new(StoreState::new(Some(root_id))),
        }
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn lookup_by_id(&self, id: &ObjectId) -> Option<MappedObject> {
        self.state.read().get(id).cloned()
    }

    fn lookup_by_path(&self, path: &SyncPath) -> Option<MappedObject> {
        self.state.read().get_by_path(path).cloned()
    }

    fn upsert(&self, record: MappedObject) -> StoreResult<UpsertOutcome> {
        let id = record.id.clone();
        let (outcome, _) = self.state.write().upsert(record)?;
        debug!(%id, ?outcome, "Upserted identity record");
        Ok(outcome)
    }

    fn remove(&self, id: &ObjectId) -> StoreResult<Option<MappedObject>> {
        let (removed, _) = self.state.write().remove(id);
        if removed.is_some() {
            debug!(%id, "Removed identity record");
        }
        Ok(removed)
    }

    fn apply_batch(&self, batch: Vec<StoreMutation>) -> StoreResult<Vec<MutationOutcome>> {
        let size = batch.len();
        let (outcomes, _) = self.state.write().apply_batch(batch)?;
        debug!(mutations = size, "Applied identity batch");
        Ok(outcomes)
    }

    fn root_id(&self) -> Option<ObjectId> {
        self.state.read().root_id.clone()
    }

    fn validate_structure(&self) -> StoreResult<StructuralReport> {
        let report = self.state.read().validate();
        if report.is_consistent() {
            Ok(report)
        } else {
            Err(StoreError::Structural(report))
        }
    }

    fn records(&self) -> Vec<MappedObject> {
        self.state.read().sorted_records()
    }

    fn len(&self) -> usize {
        self.state.read().len()
    }
}
