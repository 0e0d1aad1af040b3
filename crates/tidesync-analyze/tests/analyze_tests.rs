use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use tidesync_analyze::{
    refine, strongly_connected_components, AdjacencyGraph, CycleDetector, DirectedGraph,
    PairVerdict,
};
use tidesync_core::{
    CrawlEventCollection, ItemSnapshot, ObjectId, ObjectKind, Origin, SyncEvent, SyncPath,
};

fn graph_from(nodes: u32, edges: &[(u32, u32)]) -> AdjacencyGraph<u32> {
    let mut graph = AdjacencyGraph::new();
    for n in 0..nodes {
        graph.add_node(n);
    }
    for &(a, b) in edges {
        graph.add_edge(a % nodes, b % nodes);
    }
    graph
}

fn reachable(graph: &AdjacencyGraph<u32>, from: u32) -> HashSet<u32> {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        for &next in graph.neighbors(node) {
            if seen.insert(next) {
                stack.push(next);
            }
        }
    }
    seen
}

proptest! {
    #[test]
    fn every_node_in_exactly_one_component(
        nodes in 1u32..40,
        edges in proptest::collection::vec((0u32..40, 0u32..40), 0..120),
    ) {
        let graph = graph_from(nodes, &edges);
        let components = strongly_connected_components(&graph);

        let mut counts: HashMap<u32, usize> = HashMap::new();
        for component in &components {
            prop_assert!(!component.is_empty());
            for &node in component.nodes() {
                *counts.entry(node).or_default() += 1;
            }
        }
        prop_assert_eq!(counts.len(), nodes as usize);
        prop_assert!(counts.values().all(|&c| c == 1));
    }

    #[test]
    fn members_are_mutually_reachable(
        nodes in 1u32..25,
        edges in proptest::collection::vec((0u32..25, 0u32..25), 0..60),
    ) {
        let graph = graph_from(nodes, &edges);
        let components = strongly_connected_components(&graph);
        let reach: HashMap<u32, HashSet<u32>> =
            (0..nodes).map(|n| (n, reachable(&graph, n))).collect();

        for component in &components {
            for &u in component.nodes() {
                for &v in component.nodes() {
                    if u != v {
                        prop_assert!(reach[&u].contains(&v));
                    }
                }
            }
            // Maximality: nothing outside is reachable both ways.
            let u = component.nodes()[0];
            for v in 0..nodes {
                if !component.contains(v) {
                    prop_assert!(!(reach[&u].contains(&v) && reach[&v].contains(&u)));
                }
            }
            let self_loop = graph.neighbors(u).contains(&u);
            prop_assert_eq!(component.is_cyclic(), component.len() > 1 || self_loop);
        }
    }

    #[test]
    fn edge_free_graph_gives_acyclic_singletons(nodes in 0u32..64) {
        let graph = graph_from(nodes.max(1), &[]);
        let components = strongly_connected_components(&graph);
        prop_assert_eq!(components.len(), nodes.max(1) as usize);
        prop_assert!(components.iter().all(|c| c.len() == 1 && !c.is_cyclic()));
    }

    #[test]
    fn composition_ignores_insertion_order(
        edges in proptest::collection::vec((0u32..12, 0u32..12), 0..40),
    ) {
        let forward = graph_from(12, &edges);
        let mut reversed = AdjacencyGraph::new();
        for n in (0..12u32).rev() {
            reversed.add_node(n);
        }
        for &(a, b) in edges.iter().rev() {
            reversed.add_edge(a, b);
        }

        let canon = |graph: &AdjacencyGraph<u32>| {
            let mut sets: Vec<Vec<u32>> = strongly_connected_components(graph)
                .into_iter()
                .map(|c| {
                    let mut nodes = c.nodes().to_vec();
                    nodes.sort_unstable();
                    nodes
                })
                .collect();
            sets.sort();
            sets
        };
        prop_assert_eq!(canon(&forward), canon(&reversed));
    }
}

fn p(s: &str) -> SyncPath {
    SyncPath::new(s).unwrap()
}

fn local_move(events: &mut CrawlEventCollection, id: &str, from: &str, to: &str) {
    let removal = events.push(SyncEvent::deleted(
        Origin::Local,
        ObjectId::new(id),
        ItemSnapshot::new(p(from), ObjectKind::File),
    ));
    let creation = events.push(SyncEvent::created(
        Origin::Local,
        None,
        ItemSnapshot::new(p(to), ObjectKind::File),
    ));
    events.add_mergeable(ObjectId::new(id), removal, creation).unwrap();
}

#[test]
fn test_rename_chain_applies_in_precondition_order() {
    let mut events = CrawlEventCollection::new();
    local_move(&mut events, "a", "A.txt", "B.txt");
    local_move(&mut events, "b", "B.txt", "C.txt");
    local_move(&mut events, "c", "C.txt", "D.txt");

    let plan = CycleDetector::new().detect(&events);
    assert!(plan.pairs().all(|p| p.verdict == PairVerdict::Safe));

    let refined = refine(&events, &plan);
    let order: Vec<_> = refined
        .iter()
        .map(|item| item.event().object_id.clone().unwrap())
        .collect();
    assert_eq!(
        order,
        vec![ObjectId::new("c"), ObjectId::new("b"), ObjectId::new("a")]
    );
    assert!(refined.iter().all(|item| item.is_merged()));
}

#[test]
fn test_swap_degrades_to_delete_create() {
    let mut events = CrawlEventCollection::new();
    local_move(&mut events, "a", "A.txt", "B.txt");
    local_move(&mut events, "b", "B.txt", "A.txt");

    let plan = CycleDetector::new().detect(&events);
    assert_eq!(plan.cycles().count(), 1);
    assert_eq!(plan.cycles().next().unwrap().pairs.len(), 2);

    let refined = refine(&events, &plan);
    assert_eq!(refined.len(), 4);
    assert!(refined.iter().all(|item| !item.is_merged()));
}

#[test]
fn test_long_chain_stays_ordered() {
    let mut events = CrawlEventCollection::new();
    let n = 2_000;
    for i in 0..n {
        local_move(
            &mut events,
            &format!("id{i}"),
            &format!("f{i}"),
            &format!("f{}", i + 1),
        );
    }

    let plan = CycleDetector::new().detect(&events);
    assert_eq!(plan.safe().count(), n);
    let first = plan.safe().next().unwrap();
    assert_eq!(first.key, ObjectId::new(format!("id{}", n - 1).as_str()));
}

#[test]
fn test_plan_serializes() {
    let mut events = CrawlEventCollection::new();
    local_move(&mut events, "a", "A.txt", "B.txt");
    let plan = CycleDetector::new().detect(&events);

    let json = serde_json::to_value(&plan).unwrap();
    assert_eq!(json["groups"][0]["pairs"][0]["verdict"], "safe");
}
