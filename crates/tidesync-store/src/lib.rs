//! Object-identity store for tidesync.
//!
//! The identity store is the durable mapping between remote object
//! identities and sync-relative local paths. It is what lets a crawl
//! compare the current trees against the previous run.
//!
//! # Invariant
//!
//! Within one sync root the identity -> path mapping is a bijection: no
//! two live records share a path and no identity has two records. Upserts
//! that would break this are rejected with [`StoreError::PathConflict`];
//! resolving the conflict is the caller's job.
//!
//! # Backends
//!
//! - [`MemoryIdentityStore`] keeps everything in memory (tests, dry runs).
//! - [`JsonIdentityStore`] persists a JSON document after every mutation,
//!   using an atomic rename so each upsert/remove is individually durable.
//!   [`IdentityStore::apply_batch`] groups many mutations into one write.
//!
//! ```rust
//! use tidesync_core::{MappedObject, ObjectId, SyncPath};
//! use tidesync_store::{IdentityStore, MemoryIdentityStore};
//!
//! let store = MemoryIdentityStore::new();
//! let record = MappedObject::file(ObjectId::new("1"), SyncPath::new("a.txt").unwrap(), None);
//! store.upsert(record).unwrap();
//!
//! assert!(store.lookup_by_path(&SyncPath::new("a.txt").unwrap()).is_some());
//! store.validate_structure().unwrap();
//! ```

mod error;
mod json;
mod memory;
mod state;
mod validate;

pub use error::{StoreError, StoreResult};
pub use json::JsonIdentityStore;
pub use memory::MemoryIdentityStore;
pub use validate::{StructuralIssue, StructuralReport};

use tidesync_core::{MappedObject, ObjectId, SyncPath};

/// What an upsert did.
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    /// A new identity was recorded.
    Inserted,
    /// An existing record changed; carries the previous state.
    Updated { previous: MappedObject },
    /// The stored record already had this state.
    Unchanged,
}

impl UpsertOutcome {
    /// Check if the store was modified.
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// One mutation inside an [`IdentityStore::apply_batch`] call.
#[derive(Debug, Clone)]
pub enum StoreMutation {
    /// Insert or update a record.
    Upsert(MappedObject),
    /// Remove the record for an identity.
    Remove(ObjectId),
}

/// What one batched mutation did.
#[derive(Debug, Clone)]
pub enum MutationOutcome {
    /// Result of an upsert.
    Upserted(UpsertOutcome),
    /// The removed record, if there was one.
    Removed(Option<MappedObject>),
}

impl MutationOutcome {
    /// Check if the store was modified.
    pub fn is_change(&self) -> bool {
        match self {
            Self::Upserted(outcome) => outcome.is_change(),
            Self::Removed(removed) => removed.is_some(),
        }
    }
}

/// Durable identity <-> path mapping for one sync root.
///
/// Every mutation is atomic on its own. Implementations serialize writers
/// internally; `validate_structure` takes a consistent read snapshot.
pub trait IdentityStore: Send + Sync {
    /// Find the record for a remote identity.
    fn lookup_by_id(&self, id: &ObjectId) -> Option<MappedObject>;

    /// Find the record occupying a local path.
    fn lookup_by_path(&self, path: &SyncPath) -> Option<MappedObject>;

    /// Insert or update a record, keyed by identity.
    ///
    /// Idempotent: upserting a record equal (ignoring `updated_at`) to the
    /// stored one is a no-op. Fails if another identity holds the path.
    fn upsert(&self, record: MappedObject) -> StoreResult<UpsertOutcome>;

    /// Remove the record for an identity, returning it if it existed.
    fn remove(&self, id: &ObjectId) -> StoreResult<Option<MappedObject>>;

    /// Apply mutations in order as one atomic step.
    ///
    /// Either every mutation lands or none does; a conflict in the middle
    /// rolls back the ones before it. Durable backends persist once.
    fn apply_batch(&self, batch: Vec<StoreMutation>) -> StoreResult<Vec<MutationOutcome>>;

    /// Identity of the sync root folder, if known. Top-level records are
    /// parented by it.
    fn root_id(&self) -> Option<ObjectId>;

    /// Walk every record and check the structural invariants.
    fn validate_structure(&self) -> StoreResult<StructuralReport>;

    /// Snapshot of all records, ordered by path.
    fn records(&self) -> Vec<MappedObject>;

    /// Number of records.
    fn len(&self) -> usize;

    /// Check if the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
