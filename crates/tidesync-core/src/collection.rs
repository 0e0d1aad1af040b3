//! Per-crawl event container.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::event::{EventKind, Origin, SyncEvent};
use crate::node::{ObjectId, ObjectKind};
use crate::path::SyncPath;

/// Position of an event inside a [`CrawlEventCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub usize);

/// Two half-events that may jointly be one rename or move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeablePair {
    /// The older-state `Deleted` event.
    pub removal: EventId,
    /// The newer-state `Created` event.
    pub creation: EventId,
}

/// All events detected by one crawl of one sync root, plus the
/// mergeable-events index.
///
/// The index maps a remote identity to exactly one (removal, creation)
/// pair. Insertion validates the pair so that every key present refers to
/// a `Deleted` of that identity and a `Created` on the same side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlEventCollection {
    events: Vec<SyncEvent>,
    mergeable: IndexMap<ObjectId, MergeablePair>,
    #[serde(skip)]
    paired: HashSet<EventId>,
}

impl CrawlEventCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its id.
    pub fn push(&mut self, event: SyncEvent) -> EventId {
        let id = EventId(self.events.len());
        self.events.push(event);
        id
    }

    /// Look up an event.
    pub fn get(&self, id: EventId) -> Option<&SyncEvent> {
        self.events.get(id.0)
    }

    /// All events in detection order.
    pub fn events(&self) -> &[SyncEvent] {
        &self.events
    }

    /// Iterate over `(id, event)`.
    pub fn iter(&self) -> impl Iterator<Item = (EventId, &SyncEvent)> {
        self.events.iter().enumerate().map(|(i, e)| (EventId(i), e))
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if no events were detected.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Count events of one kind.
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }

    /// Register a (removal, creation) pair under `key`.
    ///
    /// Fails when the pair breaks the index contract: unknown event ids,
    /// wrong kinds, different origins, an identity that does not match
    /// `key`, a duplicate key, or an event that already belongs to
    /// another pair.
    pub fn add_mergeable(
        &mut self,
        key: ObjectId,
        removal: EventId,
        creation: EventId,
    ) -> Result<(), CoreError> {
        let removed = self.get(removal).ok_or(CoreError::UnknownEvent { id: removal })?;
        let created = self.get(creation).ok_or(CoreError::UnknownEvent { id: creation })?;

        if removed.kind() != EventKind::Deleted {
            return Err(CoreError::malformed_pair(&key, "removal is not a deletion"));
        }
        if created.kind() != EventKind::Created {
            return Err(CoreError::malformed_pair(&key, "creation is not a creation"));
        }
        if removed.origin != created.origin {
            return Err(CoreError::malformed_pair(&key, "halves come from different trees"));
        }
        if removed.object_id.as_ref() != Some(&key) {
            return Err(CoreError::malformed_pair(&key, "removal has another identity"));
        }
        if created.object_id.as_ref().is_some_and(|id| id != &key) {
            return Err(CoreError::malformed_pair(&key, "creation has another identity"));
        }
        if self.mergeable.contains_key(&key) {
            return Err(CoreError::malformed_pair(&key, "key already paired"));
        }
        if self.paired.contains(&removal) || self.paired.contains(&creation) {
            return Err(CoreError::malformed_pair(&key, "event already paired"));
        }

        self.paired.insert(removal);
        self.paired.insert(creation);
        self.mergeable.insert(key, MergeablePair { removal, creation });
        Ok(())
    }

    /// The mergeable-events index.
    pub fn mergeable(&self) -> &IndexMap<ObjectId, MergeablePair> {
        &self.mergeable
    }

    /// Check if an event is half of a mergeable pair.
    pub fn is_paired(&self, id: EventId) -> bool {
        self.paired.contains(&id)
    }

    /// Path freed by a pair (the removal's path).
    pub fn vacated_path(&self, pair: &MergeablePair) -> Option<&SyncPath> {
        self.get(pair.removal).map(|e| &e.snapshot.path)
    }

    /// Path taken by a pair (the creation's path).
    pub fn claimed_path(&self, pair: &MergeablePair) -> Option<&SyncPath> {
        self.get(pair.creation).map(|e| &e.snapshot.path)
    }

    /// Kinds of both halves, `(removal, creation)`.
    pub fn pair_kinds(&self, pair: &MergeablePair) -> Option<(ObjectKind, ObjectKind)> {
        Some((
            self.get(pair.removal)?.object_kind(),
            self.get(pair.creation)?.object_kind(),
        ))
    }

    /// Origin of a pair (both halves share it).
    pub fn pair_origin(&self, pair: &MergeablePair) -> Option<Origin> {
        self.get(pair.removal).map(|e| e.origin)
    }
}
