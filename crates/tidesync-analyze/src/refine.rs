//! Turning a crawl plus its cycle plan into an ordered operation list.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tidesync_core::{
    Change, CrawlEventCollection, EventId, ItemSnapshot, ObjectId, Origin, SyncEvent, SyncPath,
};
use tracing::{debug, warn};

use crate::cycles::{condensation_order, CyclePlan, PairVerdict};
use crate::scc::{strongly_connected_components, AdjacencyGraph};

/// One operation handed to the applier.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum ReconciledEvent {
    /// A raw event passed through unchanged.
    Single { id: EventId, event: SyncEvent },
    /// A safe pair collapsed into one rename or move.
    Merged {
        key: ObjectId,
        removal: EventId,
        creation: EventId,
        event: SyncEvent,
    },
}

impl ReconciledEvent {
    /// The event to apply.
    pub fn event(&self) -> &SyncEvent {
        match self {
            Self::Single { event, .. } | Self::Merged { event, .. } => event,
        }
    }

    /// Check if this came from a merged pair.
    pub fn is_merged(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }

    /// Earliest raw event this item was built from.
    pub fn first_source(&self) -> EventId {
        match self {
            Self::Single { id, .. } => *id,
            Self::Merged {
                removal, creation, ..
            } => (*removal).min(*creation),
        }
    }
}

/// Ordered operations derived from one crawl.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefinedEventCollection {
    items: Vec<ReconciledEvent>,
    merged: usize,
    fallbacks: usize,
    unordered: usize,
}

impl RefinedEventCollection {
    /// Operations in application order.
    pub fn items(&self) -> &[ReconciledEvent] {
        &self.items
    }

    /// Iterate over operations in application order.
    pub fn iter(&self) -> impl Iterator<Item = &ReconciledEvent> {
        self.items.iter()
    }

    /// Take ownership of the operations.
    pub fn into_items(self) -> Vec<ReconciledEvent> {
        self.items
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of pairs merged into a rename or move.
    pub fn merged_count(&self) -> usize {
        self.merged
    }

    /// Number of pairs and relocations applied as delete + create.
    pub fn fallback_count(&self) -> usize {
        self.fallbacks
    }

    /// Number of operations whose relative order could not be derived.
    /// These keep crawl order.
    pub fn unordered_count(&self) -> usize {
        self.unordered
    }
}

/// Apply the plan's verdicts to `collection` and order the result.
///
/// Safe pairs become one [`ReconciledEvent::Merged`]; every other event is
/// passed through. Within one origin:
///
/// - an operation vacating a path runs before the one claiming it;
/// - an operation claiming a folder runs before anything claimed inside it;
/// - everything leaving a folder runs before that folder's deletion.
///
/// Unconstrained operations run deletions first, then relocations, then the
/// rest, each in crawl order.
pub fn refine(collection: &CrawlEventCollection, plan: &CyclePlan) -> RefinedEventCollection {
    let mut consumed: HashSet<EventId> = HashSet::new();
    let mut items = Vec::with_capacity(collection.len());
    let mut merged = 0;
    let mut fallbacks = 0;

    for planned in plan.pairs() {
        if planned.verdict != PairVerdict::Safe {
            fallbacks += 1;
            continue;
        }
        let (Some(removal), Some(creation)) = (
            collection.get(planned.pair.removal),
            collection.get(planned.pair.creation),
        ) else {
            continue;
        };
        consumed.insert(planned.pair.removal);
        consumed.insert(planned.pair.creation);
        merged += 1;
        items.push(ReconciledEvent::Merged {
            key: planned.key.clone(),
            removal: planned.pair.removal,
            creation: planned.pair.creation,
            event: SyncEvent::relocated(
                creation.origin,
                planned.key.clone(),
                removal.snapshot.path.clone(),
                creation.snapshot.clone(),
            ),
        });
    }

    for (id, event) in collection.iter() {
        if !consumed.contains(&id) {
            items.push(ReconciledEvent::Single {
                id,
                event: event.clone(),
            });
        }
    }
    items.sort_by_key(ReconciledEvent::first_source);

    // Relocations that depend on each other, such as a remote swap, have
    // no valid order. Each one is split into its delete and create halves,
    // which never form a cycle.
    let graph = dependency_graph(&items);
    let components = strongly_connected_components(&graph);
    let mut split = vec![false; items.len()];
    for component in components.iter().filter(|c| c.is_cyclic()) {
        for &node in component.nodes() {
            split[node] = matches!(
                items[node].event().change,
                Change::Renamed { .. } | Change::Moved { .. }
            );
        }
    }
    if split.contains(&true) {
        let mut halves = Vec::with_capacity(items.len() + split.len());
        for (item, cut) in items.into_iter().zip(split) {
            if !cut {
                halves.push(item);
                continue;
            }
            fallbacks += 1;
            match item {
                ReconciledEvent::Merged {
                    removal, creation, ..
                } => {
                    merged -= 1;
                    for id in [removal, creation] {
                        if let Some(event) = collection.get(id) {
                            halves.push(ReconciledEvent::Single {
                                id,
                                event: event.clone(),
                            });
                        }
                    }
                }
                ReconciledEvent::Single { id, event } => match relocation_halves(&event) {
                    Some((removal, creation)) => {
                        halves.push(ReconciledEvent::Single { id, event: removal });
                        halves.push(ReconciledEvent::Single {
                            id,
                            event: creation,
                        });
                    }
                    None => {
                        fallbacks -= 1;
                        halves.push(ReconciledEvent::Single { id, event });
                    }
                },
            }
        }
        items = halves;
        items.sort_by_key(ReconciledEvent::first_source);
    }

    let graph = dependency_graph(&items);
    let components = strongly_connected_components(&graph);
    let ranks: Vec<u8> = items.iter().map(|item| rank(&item.event().change)).collect();
    let order = condensation_order(&graph, &components, |node| (ranks[node], node));

    let mut unordered = 0;
    let mut slots: Vec<Option<ReconciledEvent>> = items.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());
    for component_index in order {
        let component = &components[component_index];
        let mut members = component.nodes().to_vec();
        members.sort_unstable();
        if component.is_cyclic() {
            unordered += members.len();
        }
        for node in members {
            if let Some(item) = slots[node].take() {
                ordered.push(item);
            }
        }
    }

    if unordered > 0 {
        warn!(
            operations = unordered,
            "Mutually dependent operations kept in crawl order"
        );
    }
    debug!(
        operations = ordered.len(),
        merged,
        fallbacks,
        "Refined crawl events"
    );

    RefinedEventCollection {
        items: ordered,
        merged,
        fallbacks,
        unordered,
    }
}

/// The delete and create halves of a relocation event.
fn relocation_halves(event: &SyncEvent) -> Option<(SyncEvent, SyncEvent)> {
    let id = event.object_id.clone()?;
    let from = event.change.vacated_path()?.clone();
    let removal = SyncEvent::deleted(
        event.origin,
        id.clone(),
        ItemSnapshot::new(from, event.snapshot.kind),
    );
    let creation = SyncEvent::created(event.origin, Some(id), event.snapshot.clone());
    Some((removal, creation))
}

fn rank(change: &Change) -> u8 {
    match change {
        Change::Deleted { .. } => 0,
        Change::Renamed { .. } | Change::Moved { .. } => 1,
        Change::Created { .. } | Change::ContentChanged { .. } | Change::MetadataChanged { .. } => 2,
    }
}

type PathIndex<'a> = HashMap<(Origin, &'a SyncPath), Vec<usize>>;

/// Node `i` is `items[i]`; edges point from prerequisite to dependent.
fn dependency_graph(items: &[ReconciledEvent]) -> AdjacencyGraph<usize> {
    let mut graph = AdjacencyGraph::new();
    let mut vacating: PathIndex<'_> = HashMap::new();
    let mut claiming: PathIndex<'_> = HashMap::new();
    let mut deleting: PathIndex<'_> = HashMap::new();

    for (node, item) in items.iter().enumerate() {
        graph.add_node(node);
        let event = item.event();
        if let Some(path) = event.change.vacated_path() {
            vacating.entry((event.origin, path)).or_default().push(node);
        }
        if let Some(path) = event.change.claimed_path() {
            claiming.entry((event.origin, path)).or_default().push(node);
        }
        if let Change::Deleted { path } = &event.change {
            deleting.entry((event.origin, path)).or_default().push(node);
        }
    }

    let mut link = |from: usize, to: usize| {
        if from != to {
            graph.add_edge(from, to);
        }
    };

    for (node, item) in items.iter().enumerate() {
        let event = item.event();
        let origin = event.origin;

        if let Some(claimed) = event.change.claimed_path() {
            for &earlier in vacating.get(&(origin, claimed)).into_iter().flatten() {
                link(earlier, node);
            }
            for ancestor in ancestors(claimed) {
                for &earlier in claiming.get(&(origin, &ancestor)).into_iter().flatten() {
                    link(earlier, node);
                }
            }
        }

        if let Some(vacated) = event.change.vacated_path() {
            for ancestor in ancestors(vacated) {
                for &later in deleting.get(&(origin, &ancestor)).into_iter().flatten() {
                    link(node, later);
                }
            }
        }
    }

    graph
}

/// Strict ancestors of `path`, excluding the root.
fn ancestors(path: &SyncPath) -> impl Iterator<Item = SyncPath> {
    std::iter::successors(path.parent(), SyncPath::parent).take_while(|p| !p.is_root())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CycleDetector;
    use tidesync_core::{EventKind, ObjectKind};

    fn p(s: &str) -> SyncPath {
        SyncPath::new(s).unwrap()
    }

    fn deleted(events: &mut CrawlEventCollection, id: &str, path: &str, kind: ObjectKind) -> EventId {
        events.push(SyncEvent::deleted(
            Origin::Local,
            ObjectId::new(id),
            ItemSnapshot::new(p(path), kind),
        ))
    }

    fn created(events: &mut CrawlEventCollection, path: &str, kind: ObjectKind) -> EventId {
        events.push(SyncEvent::created(
            Origin::Local,
            None,
            ItemSnapshot::new(p(path), kind),
        ))
    }

    fn summary(refined: &RefinedEventCollection) -> Vec<String> {
        refined
            .iter()
            .map(|item| {
                let change = &item.event().change;
                let paths: Vec<_> = change.paths().iter().map(|p| p.to_string()).collect();
                format!("{:?} {}", change.kind(), paths.join(" -> "))
            })
            .collect()
    }

    #[test]
    fn test_safe_pair_is_merged() {
        let mut events = CrawlEventCollection::new();
        let removal = deleted(&mut events, "x", "a.txt", ObjectKind::File);
        let creation = created(&mut events, "b.txt", ObjectKind::File);
        events.add_mergeable(ObjectId::new("x"), removal, creation).unwrap();

        let plan = CycleDetector::new().detect(&events);
        let refined = refine(&events, &plan);

        assert_eq!(refined.len(), 1);
        assert_eq!(refined.merged_count(), 1);
        assert_eq!(summary(&refined), vec!["Renamed a.txt -> b.txt"]);
        assert_eq!(
            refined.items()[0].event().object_id,
            Some(ObjectId::new("x"))
        );
    }

    #[test]
    fn test_swap_falls_back_with_removals_first() {
        let mut events = CrawlEventCollection::new();
        let r1 = deleted(&mut events, "x", "a", ObjectKind::File);
        let c1 = created(&mut events, "b", ObjectKind::File);
        let r2 = deleted(&mut events, "y", "b", ObjectKind::File);
        let c2 = created(&mut events, "a", ObjectKind::File);
        events.add_mergeable(ObjectId::new("x"), r1, c1).unwrap();
        events.add_mergeable(ObjectId::new("y"), r2, c2).unwrap();

        let plan = CycleDetector::new().detect(&events);
        let refined = refine(&events, &plan);

        assert_eq!(refined.merged_count(), 0);
        assert_eq!(refined.fallback_count(), 2);
        assert_eq!(
            summary(&refined),
            vec!["Deleted a", "Deleted b", "Created b", "Created a"]
        );
    }

    #[test]
    fn test_folder_created_before_children_and_deleted_after() {
        let mut events = CrawlEventCollection::new();
        created(&mut events, "new/inner.txt", ObjectKind::File);
        created(&mut events, "new", ObjectKind::Folder);
        deleted(&mut events, "old", "old", ObjectKind::Folder);
        deleted(&mut events, "old-child", "old/child.txt", ObjectKind::File);

        let refined = refine(&events, &CyclePlan::default());
        assert_eq!(
            summary(&refined),
            vec![
                "Deleted old/child.txt",
                "Deleted old",
                "Created new",
                "Created new/inner.txt",
            ]
        );
    }

    #[test]
    fn test_move_out_of_deleted_folder_runs_first() {
        let mut events = CrawlEventCollection::new();
        deleted(&mut events, "dir", "dir", ObjectKind::Folder);
        let removal = deleted(&mut events, "f", "dir/f.txt", ObjectKind::File);
        let creation = created(&mut events, "f.txt", ObjectKind::File);
        events.add_mergeable(ObjectId::new("f"), removal, creation).unwrap();

        let plan = CycleDetector::new().detect(&events);
        let refined = refine(&events, &plan);
        assert_eq!(summary(&refined), vec!["Moved dir/f.txt -> f.txt", "Deleted dir"]);
    }

    #[test]
    fn test_origins_do_not_constrain_each_other() {
        let mut events = CrawlEventCollection::new();
        events.push(SyncEvent::created(
            Origin::Remote,
            Some(ObjectId::new("r")),
            ItemSnapshot::new(p("a"), ObjectKind::File),
        ));
        deleted(&mut events, "l", "a", ObjectKind::File);

        let refined = refine(&events, &CyclePlan::default());
        let origins: Vec<_> = refined.iter().map(|i| i.event().origin).collect();
        assert_eq!(origins, vec![Origin::Local, Origin::Remote]);
        assert_eq!(refined.unordered_count(), 0);
    }

    #[test]
    fn test_remote_swap_falls_back_to_delete_and_create() {
        let mut events = CrawlEventCollection::new();
        events.push(SyncEvent::relocated(
            Origin::Remote,
            ObjectId::new("x"),
            p("a"),
            ItemSnapshot::new(p("b"), ObjectKind::File),
        ));
        events.push(SyncEvent::relocated(
            Origin::Remote,
            ObjectId::new("y"),
            p("b"),
            ItemSnapshot::new(p("a"), ObjectKind::File),
        ));

        let refined = refine(&events, &CyclePlan::default());
        assert_eq!(refined.unordered_count(), 0);
        assert_eq!(refined.fallback_count(), 2);
        assert_eq!(
            summary(&refined),
            vec!["Deleted a", "Deleted b", "Created b", "Created a"]
        );
        let created: Vec<_> = refined
            .iter()
            .filter(|item| item.event().kind() == EventKind::Created)
            .map(|item| item.event().object_id.clone())
            .collect();
        assert_eq!(
            created,
            vec![Some(ObjectId::new("x")), Some(ObjectId::new("y"))]
        );
    }

    #[test]
    fn test_remote_chain_stays_renames() {
        let mut events = CrawlEventCollection::new();
        events.push(SyncEvent::relocated(
            Origin::Remote,
            ObjectId::new("x"),
            p("a"),
            ItemSnapshot::new(p("b"), ObjectKind::File),
        ));
        events.push(SyncEvent::relocated(
            Origin::Remote,
            ObjectId::new("y"),
            p("b"),
            ItemSnapshot::new(p("c"), ObjectKind::File),
        ));

        let refined = refine(&events, &CyclePlan::default());
        assert_eq!(refined.fallback_count(), 0);
        assert_eq!(summary(&refined), vec!["Renamed b -> c", "Renamed a -> b"]);
    }
}
