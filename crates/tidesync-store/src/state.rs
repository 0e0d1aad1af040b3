//! In-memory index shared by the store backends.

use std::collections::HashMap;

use tidesync_core::{MappedObject, ObjectId, SyncPath};

use crate::error::{StoreError, StoreResult};
use crate::validate::{self, StructuralReport};
use crate::{MutationOutcome, StoreMutation, UpsertOutcome};

/// Records keyed by identity plus a reverse path index.
#[derive(Debug, Default, Clone)]
pub(crate) struct StoreState {
    pub(crate) root_id: Option<ObjectId>,
    records: HashMap<ObjectId, MappedObject>,
    by_path: HashMap<SyncPath, ObjectId>,
}

/// Undo information for a single mutation.
pub(crate) enum Undo {
    Nothing,
    RemoveInserted(ObjectId),
    Restore(MappedObject),
}

impl StoreState {
    pub(crate) fn new(root_id: Option<ObjectId>) -> Self {
        Self {
            root_id,
            ..Self::default()
        }
    }

    /// Build state from persisted records without rejecting path
    /// collisions, so a damaged document can still be validated.
    pub(crate) fn from_records(
        root_id: Option<ObjectId>,
        records: Vec<MappedObject>,
    ) -> Result<Self, String> {
        let mut state = Self::new(root_id);
        for record in records {
            if state.records.contains_key(&record.id) {
                return Err(format!("identity {} appears twice", record.id));
            }
            state
                .by_path
                .entry(record.path.clone())
                .or_insert_with(|| record.id.clone());
            state.records.insert(record.id.clone(), record);
        }
        Ok(state)
    }

    pub(crate) fn get(&self, id: &ObjectId) -> Option<&MappedObject> {
        self.records.get(id)
    }

    pub(crate) fn get_by_path(&self, path: &SyncPath) -> Option<&MappedObject> {
        self.by_path.get(path).and_then(|id| self.records.get(id))
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn sorted_records(&self) -> Vec<MappedObject> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    pub(crate) fn upsert(&mut self, record: MappedObject) -> StoreResult<(UpsertOutcome, Undo)> {
        if record.path.is_root() {
            return Err(StoreError::RootPath { id: record.id });
        }
        if let Some(holder) = self.by_path.get(&record.path) {
            if holder != &record.id {
                return Err(StoreError::PathConflict {
                    path: record.path,
                    existing: holder.clone(),
                    incoming: record.id,
                });
            }
        }

        match self.records.get(&record.id) {
            Some(existing) if existing.same_state(&record) => {
                Ok((UpsertOutcome::Unchanged, Undo::Nothing))
            }
            Some(existing) => {
                let previous = existing.clone();
                self.insert(record);
                Ok((
                    UpsertOutcome::Updated {
                        previous: previous.clone(),
                    },
                    Undo::Restore(previous),
                ))
            }
            None => {
                let id = record.id.clone();
                self.insert(record);
                Ok((UpsertOutcome::Inserted, Undo::RemoveInserted(id)))
            }
        }
    }

    pub(crate) fn remove(&mut self, id: &ObjectId) -> (Option<MappedObject>, Undo) {
        match self.records.remove(id) {
            Some(record) => {
                if self.by_path.get(&record.path) == Some(id) {
                    self.by_path.remove(&record.path);
                }
                (Some(record.clone()), Undo::Restore(record))
            }
            None => (None, Undo::Nothing),
        }
    }

    /// Apply mutations in order. On failure the applied ones are reverted
    /// and the state is as before the call.
    pub(crate) fn apply_batch(
        &mut self,
        batch: Vec<StoreMutation>,
    ) -> StoreResult<(Vec<MutationOutcome>, Vec<Undo>)> {
        let mut outcomes = Vec::with_capacity(batch.len());
        let mut undos = Vec::with_capacity(batch.len());
        for mutation in batch {
            let step = match mutation {
                StoreMutation::Upsert(record) => self
                    .upsert(record)
                    .map(|(outcome, undo)| (MutationOutcome::Upserted(outcome), undo)),
                StoreMutation::Remove(id) => {
                    let (removed, undo) = self.remove(&id);
                    Ok((MutationOutcome::Removed(removed), undo))
                }
            };
            match step {
                Ok((outcome, undo)) => {
                    outcomes.push(outcome);
                    undos.push(undo);
                }
                Err(e) => {
                    self.revert_all(undos);
                    return Err(e);
                }
            }
        }
        Ok((outcomes, undos))
    }

    /// Revert a sequence of mutations, latest first.
    pub(crate) fn revert_all(&mut self, undos: Vec<Undo>) {
        for undo in undos.into_iter().rev() {
            self.revert(undo);
        }
    }

    pub(crate) fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Nothing => {}
            Undo::RemoveInserted(id) => {
                self.remove(&id);
            }
            Undo::Restore(record) => {
                if let Some(current) = self.records.get(&record.id) {
                    if self.by_path.get(&current.path) == Some(&record.id) {
                        let path = current.path.clone();
                        self.by_path.remove(&path);
                    }
                }
                self.insert(record);
            }
        }
    }

    pub(crate) fn validate(&self) -> StructuralReport {
        validate::check(self.root_id.as_ref(), &self.records, &self.by_path)
    }

    /// Replace the record for `record.id`, keeping the path index in step.
    fn insert(&mut self, record: MappedObject) -> Option<MappedObject> {
        if let Some(old) = self.records.get(&record.id) {
            if old.path != record.path && self.by_path.get(&old.path) == Some(&record.id) {
                let old_path = old.path.clone();
                self.by_path.remove(&old_path);
            }
        }
        self.by_path.insert(record.path.clone(), record.id.clone());
        self.records.insert(record.id.clone(), record)
    }
}
