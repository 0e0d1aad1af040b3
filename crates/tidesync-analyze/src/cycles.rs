//! Rename/move cycle detection over the mergeable-events index.
//!
//! Each mergeable pair becomes one graph node. An edge `q -> p` means `q`
//! has to be applied before `p`:
//!
//! - `p` claims the path that `q` vacates (path reuse);
//! - `p`'s new item is parented by the object `q` relocates.
//!
//! Singleton components without a self-loop are safe to merge into one
//! rename or move. Everything else is a cycle and falls back to the
//! original delete + create halves.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::Serialize;
use tidesync_core::{CrawlEventCollection, MergeablePair, ObjectId, SyncPath};
use tracing::debug;

use crate::scc::{strongly_connected_components, AdjacencyGraph, Component, DirectedGraph};

/// What to do with one mergeable pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairVerdict {
    /// Merge into a single rename or move.
    Safe,
    /// Part of a dependency cycle; apply as delete + create.
    Cyclic,
    /// The halves disagree on file vs folder; apply as delete + create.
    Disqualified,
}

impl PairVerdict {
    /// Check if the pair may be merged.
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }
}

/// A mergeable pair with its verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedPair {
    /// Correlation key (remote identity).
    pub key: ObjectId,
    /// The two half-events.
    pub pair: MergeablePair,
    /// Merge decision.
    pub verdict: PairVerdict,
}

/// One condensation node: a single pair, or every pair of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairGroup {
    /// Members in index insertion order.
    pub pairs: Vec<PlannedPair>,
    /// True when the members depend on each other.
    pub cyclic: bool,
}

/// Output of [`CycleDetector::detect`].
///
/// Groups are in dependency order: a pair that vacates a path comes before
/// the pair that claims it. Independent groups keep the insertion order of
/// the mergeable-events index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CyclePlan {
    groups: Vec<PairGroup>,
}

impl CyclePlan {
    /// All groups in dependency order.
    pub fn groups(&self) -> &[PairGroup] {
        &self.groups
    }

    /// Every planned pair in dependency order.
    pub fn pairs(&self) -> impl Iterator<Item = &PlannedPair> {
        self.groups.iter().flat_map(|g| g.pairs.iter())
    }

    /// Pairs safe to merge, in the order they must be applied.
    pub fn safe(&self) -> impl Iterator<Item = &PlannedPair> {
        self.pairs().filter(|p| p.verdict == PairVerdict::Safe)
    }

    /// Pairs caught in a cycle.
    pub fn cyclic(&self) -> impl Iterator<Item = &PlannedPair> {
        self.pairs().filter(|p| p.verdict == PairVerdict::Cyclic)
    }

    /// Pairs rejected because of a kind mismatch.
    pub fn disqualified(&self) -> impl Iterator<Item = &PlannedPair> {
        self.pairs().filter(|p| p.verdict == PairVerdict::Disqualified)
    }

    /// Cyclic groups only.
    pub fn cycles(&self) -> impl Iterator<Item = &PairGroup> {
        self.groups.iter().filter(|g| g.cyclic)
    }

    /// Verdict for one correlation key.
    pub fn verdict(&self, key: &ObjectId) -> Option<PairVerdict> {
        self.pairs().find(|p| &p.key == key).map(|p| p.verdict)
    }

    /// Number of planned pairs.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.pairs.len()).sum()
    }

    /// Check if there was nothing to plan.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Classifies mergeable pairs as safe merges or cycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleDetector;

impl CycleDetector {
    /// Create a detector.
    pub fn new() -> Self {
        Self
    }

    /// Build the pair graph for `collection` and classify every pair.
    pub fn detect(&self, collection: &CrawlEventCollection) -> CyclePlan {
        let index = collection.mergeable();
        if index.is_empty() {
            return CyclePlan::default();
        }

        // Kind mismatches never become graph nodes.
        let (pairs, mismatched): (Vec<(&ObjectId, &MergeablePair)>, Vec<_>) =
            index.iter().partition(|(_, pair)| {
                collection
                    .pair_kinds(pair)
                    .is_some_and(|(removed, created)| removed == created)
            });

        let graph = build_graph(collection, &pairs);
        let components = strongly_connected_components(&graph);
        // Ties keep the insertion order of the index.
        let order = condensation_order(&graph, &components, |node| node);

        let mut groups = Vec::with_capacity(components.len() + mismatched.len());
        for component_index in order {
            let component = &components[component_index];
            let mut members = component.nodes().to_vec();
            members.sort_unstable();

            let verdict = if component.is_cyclic() {
                PairVerdict::Cyclic
            } else {
                PairVerdict::Safe
            };
            let planned = members
                .into_iter()
                .map(|node| {
                    let (key, pair) = pairs[node];
                    PlannedPair {
                        key: key.clone(),
                        pair: *pair,
                        verdict,
                    }
                })
                .collect();

            groups.push(PairGroup {
                pairs: planned,
                cyclic: component.is_cyclic(),
            });
        }

        for (key, pair) in mismatched {
            groups.push(PairGroup {
                pairs: vec![PlannedPair {
                    key: key.clone(),
                    pair: *pair,
                    verdict: PairVerdict::Disqualified,
                }],
                cyclic: false,
            });
        }

        let plan = CyclePlan { groups };
        debug!(
            pairs = plan.len(),
            edges = graph.edge_count(),
            safe = plan.safe().count(),
            cyclic = plan.cyclic().count(),
            disqualified = plan.disqualified().count(),
            "Classified mergeable pairs"
        );
        plan
    }
}

/// Node `i` is `pairs[i]`.
fn build_graph(
    collection: &CrawlEventCollection,
    pairs: &[(&ObjectId, &MergeablePair)],
) -> AdjacencyGraph<usize> {
    let mut graph = AdjacencyGraph::new();
    let mut vacating: HashMap<&SyncPath, Vec<usize>> = HashMap::new();
    let mut by_key: HashMap<&ObjectId, usize> = HashMap::with_capacity(pairs.len());

    for (node, (key, pair)) in pairs.iter().enumerate() {
        graph.add_node(node);
        by_key.insert(*key, node);
        if let Some(path) = collection.vacated_path(pair) {
            vacating.entry(path).or_default().push(node);
        }
    }

    for (node, (_, pair)) in pairs.iter().enumerate() {
        if let Some(claimed) = collection.claimed_path(pair) {
            for &earlier in vacating.get(claimed).into_iter().flatten() {
                graph.add_edge(earlier, node);
            }
        }

        let parent = collection
            .get(pair.creation)
            .and_then(|event| event.snapshot.parent.as_ref());
        if let Some(&carrier) = parent.and_then(|id| by_key.get(id)) {
            graph.add_edge(carrier, node);
        }
    }

    graph
}

/// Topological order of the components (Kahn). Among ready components the
/// one holding the smallest `priority` node goes first.
pub(crate) fn condensation_order<K: Ord + Copy>(
    graph: &AdjacencyGraph<usize>,
    components: &[Component<usize>],
    priority: impl Fn(usize) -> K,
) -> Vec<usize> {
    let mut component_of: HashMap<usize, usize> = HashMap::new();
    let mut lowest = Vec::with_capacity(components.len());
    for (index, component) in components.iter().enumerate() {
        for &node in component.nodes() {
            component_of.insert(node, index);
        }
        lowest.push(component.nodes().iter().map(|&node| priority(node)).min());
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); components.len()];
    let mut indegree = vec![0usize; components.len()];
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    for (index, component) in components.iter().enumerate() {
        for &node in component.nodes() {
            for next in graph.neighbors(node) {
                let Some(&target) = component_of.get(next) else {
                    continue;
                };
                if target != index && seen.insert((index, target)) {
                    successors[index].push(target);
                    indegree[target] += 1;
                }
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<(Option<K>, usize)>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(index, _)| Reverse((lowest[index], index)))
        .collect();

    let mut order = Vec::with_capacity(components.len());
    while let Some(Reverse((_, index))) = ready.pop() {
        order.push(index);
        for &next in &successors[index] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.push(Reverse((lowest[next], next)));
            }
        }
    }
    order
}
