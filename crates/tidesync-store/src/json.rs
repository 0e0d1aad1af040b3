//! JSON-file identity store.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tidesync_core::{MappedObject, ObjectId, SyncPath};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::state::{StoreState, Undo};
use crate::validate::StructuralReport;
use crate::{IdentityStore, MutationOutcome, StoreMutation, UpsertOutcome};

const FORMAT_VERSION: u32 = 1;

/// On-disk layout.
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    root_id: Option<ObjectId>,
    records: Vec<MappedObject>,
}

/// Identity store persisted as a single JSON document.
///
/// Each mutation rewrites the document through a temporary file in the
/// same directory followed by a rename. If the write fails the in-memory
/// state is rolled back, so memory and disk never diverge.
#[derive(Debug)]
pub struct JsonIdentityStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl JsonIdentityStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::load(path.into(), None)
    }

    /// Open the store and set the identity of the sync root folder.
    ///
    /// A root identity already recorded in the file takes precedence.
    pub fn open_with_root(path: impl Into<PathBuf>, root_id: ObjectId) -> StoreResult<Self> {
        Self::load(path.into(), Some(root_id))
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: PathBuf, root_id: Option<ObjectId>) -> StoreResult<Self> {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "Starting empty identity store");
                return Ok(Self {
                    path,
                    state: RwLock::new(StoreState::new(root_id)),
                });
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        let document: StoreDocument = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if document.version != FORMAT_VERSION {
            return Err(StoreError::Corrupt {
                path,
                reason: format!("unsupported format version {}", document.version),
            });
        }

        let count = document.records.len();
        let state = StoreState::from_records(document.root_id.or(root_id), document.records)
            .map_err(|reason| StoreError::Corrupt {
                path: path.clone(),
                reason,
            })?;
        info!(path = %path.display(), records = count, "Loaded identity store");

        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    /// Apply a mutation and persist it, reverting the mutation if the
    /// write fails.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut StoreState) -> StoreResult<(T, Undo)>,
    ) -> StoreResult<T> {
        let mut state = self.state.write();
        let (value, undo) = op(&mut state)?;
        if matches!(undo, Undo::Nothing) {
            return Ok(value);
        }
        if let Err(e) = self.persist(&state) {
            warn!(path = %self.path.display(), error = %e, "Persist failed, reverting");
            state.revert(undo);
            return Err(e);
        }
        Ok(value)
    }

    /// Apply a batch and persist it once, reverting the whole batch if
    /// the write fails.
    fn mutate_batch(&self, batch: Vec<StoreMutation>) -> StoreResult<Vec<MutationOutcome>> {
        let mut state = self.state.write();
        let (outcomes, undos) = state.apply_batch(batch)?;
        if undos.iter().all(|undo| matches!(undo, Undo::Nothing)) {
            return Ok(outcomes);
        }
        if let Err(e) = self.persist(&state) {
            warn!(path = %self.path.display(), error = %e, "Persist failed, reverting batch");
            state.revert_all(undos);
            return Err(e);
        }
        Ok(outcomes)
    }

    fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let document = StoreDocument {
            version: FORMAT_VERSION,
            root_id: state.root_id.clone(),
            records: state.sorted_records(),
        };

        let tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, &document)?;
            writer.flush().map_err(|e| StoreError::io(tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;
        Ok(())
    }
}

impl IdentityStore for JsonIdentityStore {
    fn lookup_by_id(&self, id: &ObjectId) -> Option<MappedObject> {
        self.state.read().get(id).cloned()
    }

    fn lookup_by_path(&self, path: &SyncPath) -> Option<MappedObject> {
        self.state.read().get_by_path(path).cloned()
    }

    fn upsert(&self, record: MappedObject) -> StoreResult<UpsertOutcome> {
        let id = record.id.clone();
        let outcome = self.mutate(|state| state.upsert(record))?;
        debug!(%id, changed = outcome.is_change(), "Upserted identity record");
        Ok(outcome)
    }

    fn remove(&self, id: &ObjectId) -> StoreResult<Option<MappedObject>> {
        let removed = self.mutate(|state| Ok(state.remove(id)))?;
        if removed.is_some() {
            debug!(%id, "Removed identity record");
        }
        Ok(removed)
    }

    fn apply_batch(&self, batch: Vec<StoreMutation>) -> StoreResult<Vec<MutationOutcome>> {
        let size = batch.len();
        let outcomes = self.mutate_batch(batch)?;
        debug!(
            mutations = size,
            changed = outcomes.iter().filter(|o| o.is_change()).count(),
            "Applied identity batch"
        );
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
