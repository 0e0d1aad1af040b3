//! Strongly connected components (Tarjan).
//!
//! The traversal keeps its scratch state (discovery index, low-link,
//! on-stack flag) in tables owned by one engine invocation, and walks the
//! graph with an explicit frame stack instead of recursion, so rename chains
//! as deep as a directory tree cannot exhaust the native stack.

use std::collections::HashMap;
use std::hash::Hash;

use serde::Serialize;

/// A finite directed graph.
pub trait DirectedGraph {
    /// Node handle. Cheap to copy.
    type Node: Copy + Eq + Hash;

    /// Every node of the graph.
    fn nodes(&self) -> impl Iterator<Item = Self::Node> + '_;

    /// Outgoing neighbors of `node`, in a stable order.
    fn neighbors(&self, node: Self::Node) -> &[Self::Node];
}

/// Adjacency-list graph over arbitrary node handles.
///
/// Nodes keep their insertion order, which keeps traversals reproducible.
#[derive(Debug, Clone)]
pub struct AdjacencyGraph<N> {
    order: Vec<N>,
    edges: HashMap<N, Vec<N>>,
}

impl<N: Copy + Eq + Hash> Default for AdjacencyGraph<N> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            edges: HashMap::new(),
        }
    }
}

impl<N: Copy + Eq + Hash> AdjacencyGraph<N> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Returns false if it was already present.
    pub fn add_node(&mut self, node: N) -> bool {
        if self.edges.contains_key(&node) {
            return false;
        }
        self.edges.insert(node, Vec::new());
        self.order.push(node);
        true
    }

    /// Add a directed edge, adding missing endpoints. Duplicate edges are ignored.
    pub fn add_edge(&mut self, from: N, to: N) {
        self.add_node(from);
        self.add_node(to);
        if let Some(out) = self.edges.get_mut(&from) {
            if !out.contains(&to) {
                out.push(to);
            }
        }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Check if `node` lists itself as a neighbor.
    pub fn has_self_loop(&self, node: N) -> bool {
        self.neighbors(node).contains(&node)
    }
}

impl<N: Copy + Eq + Hash> DirectedGraph for AdjacencyGraph<N> {
    type Node = N;

    fn nodes(&self) -> impl Iterator<Item = N> + '_ {
        self.order.iter().copied()
    }

    fn neighbors(&self, node: N) -> &[N] {
        self.edges.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// One strongly connected component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component<N> {
    nodes: Vec<N>,
    cyclic: bool,
}

impl<N: Copy + Eq> Component<N> {
    /// Member nodes. Their order carries no meaning.
    pub fn nodes(&self) -> &[N] {
        &self.nodes
    }

    /// Number of member nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Components are never empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True for components of two or more nodes and for self-loops.
    pub fn is_cyclic(&self) -> bool {
        self.cyclic
    }

    /// Check membership.
    pub fn contains(&self, node: N) -> bool {
        self.nodes.contains(&node)
    }
}

/// Compute the strongly connected components of `graph`.
///
/// Every node, including neighbors only reachable through edges, lands in
/// exactly one component. Components come out in reverse topological order
/// of the condensation, but callers should only rely on membership.
pub fn strongly_connected_components<G: DirectedGraph>(graph: &G) -> Vec<Component<G::Node>> {
    Tarjan::new(graph).run()
}

struct Frame {
    index: usize,
    cursor: usize,
}

/// Scratch state of one traversal. Discovery index doubles as the slot in
/// the side tables.
struct Tarjan<'g, G: DirectedGraph> {
    graph: &'g G,
    index_of: HashMap<G::Node, usize>,
    discovered: Vec<G::Node>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Component<G::Node>>,
}

impl<'g, G: DirectedGraph> Tarjan<'g, G> {
    fn new(graph: &'g G) -> Self {
        Self {
            graph,
            index_of: HashMap::new(),
            discovered: Vec::new(),
            lowlink: Vec::new(),
            on_stack: Vec::new(),
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Component<G::Node>> {
        let graph = self.graph;
        for node in graph.nodes() {
            if !self.index_of.contains_key(&node) {
                self.visit(node);
            }
        }
        self.components
    }

    fn open(&mut self, node: G::Node) -> usize {
        let index = self.discovered.len();
        self.index_of.insert(node, index);
        self.discovered.push(node);
        self.lowlink.push(index);
        self.on_stack.push(true);
        self.stack.push(index);
        index
    }

    fn visit(&mut self, root: G::Node) {
        let graph = self.graph;
        let mut frames = vec![Frame {
            index: self.open(root),
            cursor: 0,
        }];

        while let Some(frame) = frames.last_mut() {
            let index = frame.index;
            let node = self.discovered[index];

            if let Some(&next) = graph.neighbors(node).get(frame.cursor) {
                frame.cursor += 1;
                match self.index_of.get(&next).copied() {
                    None => {
                        let child = self.open(next);
                        frames.push(Frame {
                            index: child,
                            cursor: 0,
                        });
                    }
                    Some(seen) if self.on_stack[seen] => {
                        self.lowlink[index] = self.lowlink[index].min(seen);
                    }
                    // Already closed into another component.
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                self.lowlink[parent.index] = self.lowlink[parent.index].min(self.lowlink[index]);
            }
            if self.lowlink[index] == index {
                self.close(index);
            }
        }
    }

    /// Pop the stack down to `root`, emitting one component.
    fn close(&mut self, root: usize) {
        let mut nodes = Vec::new();
        while let Some(top) = self.stack.pop() {
            self.on_stack[top] = false;
            nodes.push(self.discovered[top]);
            if top == root {
                break;
            }
        }
        let cyclic = nodes.len() > 1 || {
            let node = self.discovered[root];
            self.graph.neighbors(node).contains(&node)
        };
        self.components.push(Component { nodes, cyclic });
    }
}
