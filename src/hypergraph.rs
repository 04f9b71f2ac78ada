//! Hypergraphs and Tree Decompositions
//!
//! A labeled hypergraph (vertices are logical attributes, hyperedges are
//! base relations), a rooted digraph used to express tree decompositions,
//! the [`Bag`] node value carried by decomposition trees, and the
//! running-intersection validator.
//!
//! Storage is bidirectional (edge→vertices and vertex→edges) so incidence
//! queries and deletions are O(1). Edge deletion is logical: the edge id is
//! retained and its vertex set emptied, and enumerators skip empty edges.
//! Id stability across deletions is what lets the planner keep edge weights
//! keyed by [`EdgeId`].

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::error::{Error, Result};
use crate::union_find::UnionFindMap;

/// Stable identity of a hyperedge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

/// A hypergraph over vertices of type `V`.
#[derive(Debug, Clone, Default)]
pub struct Hypergraph<V> {
    hyperedges: Vec<HashSet<V>>,
    vertex_to_edges: HashMap<V, HashSet<EdgeId>>,
}

impl<V: Clone + Eq + Hash> Hypergraph<V> {
    pub fn new() -> Self {
        Hypergraph {
            hyperedges: Vec::new(),
            vertex_to_edges: HashMap::new(),
        }
    }

    /// Register a vertex. Registering twice is a no-op.
    pub fn add_vertex(&mut self, vertex: V) {
        self.vertex_to_edges.entry(vertex).or_default();
    }

    /// Create an empty hyperedge and return its stable id.
    pub fn add_edge(&mut self) -> EdgeId {
        let id = EdgeId(self.hyperedges.len());
        self.hyperedges.push(HashSet::new());
        id
    }

    /// Attach a known vertex to a known edge.
    pub fn attach(&mut self, vertex: &V, edge: EdgeId) -> Result<()> {
        if !self.vertex_to_edges.contains_key(vertex) {
            return Err(Error::precondition("attach: unknown vertex"));
        }
        let Some(vertices) = self.hyperedges.get_mut(edge.0) else {
            return Err(Error::precondition("attach: unknown edge"));
        };
        vertices.insert(vertex.clone());
        self.vertex_to_edges
            .get_mut(vertex)
            .expect("vertex checked above")
            .insert(edge);
        Ok(())
    }

    /// Edges incident on a vertex, or `None` for unknown vertices.
    pub fn edges_of(&self, vertex: &V) -> Option<&HashSet<EdgeId>> {
        self.vertex_to_edges.get(vertex)
    }

    /// Vertices of an edge, or `None` for unknown edge ids.
    pub fn vertices_of(&self, edge: EdgeId) -> Option<&HashSet<V>> {
        self.hyperedges.get(edge.0)
    }

    /// Every registered vertex, in arbitrary order.
    pub fn all_vertices(&self) -> Vec<V> {
        self.vertex_to_edges.keys().cloned().collect()
    }

    /// Every non-empty edge. Logically deleted edges are skipped.
    pub fn all_edges(&self) -> Vec<EdgeId> {
        (0..self.hyperedges.len())
            .filter(|i| !self.hyperedges[*i].is_empty())
            .map(EdgeId)
            .collect()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertex_to_edges.len()
    }

    pub fn num_edges(&self) -> usize {
        self.hyperedges.len()
    }

    /// Remove a vertex and detach it from every incident edge.
    pub fn delete_vertex(&mut self, vertex: &V) {
        if let Some(edges) = self.vertex_to_edges.remove(vertex) {
            for edge in edges {
                self.hyperedges[edge.0].remove(vertex);
            }
        }
    }

    /// Logically delete an edge: its id stays valid, its vertex set empties.
    pub fn delete_edge(&mut self, edge: EdgeId) {
        let Some(vertices) = self.hyperedges.get_mut(edge.0) else {
            return;
        };
        let drained: Vec<V> = vertices.drain().collect();
        for vertex in drained {
            self.vertex_to_edges
                .get_mut(&vertex)
                .expect("incidence maps stay in sync")
                .remove(&edge);
        }
    }
}

/// Parse the hypergraph text format: one hyperedge per line, written
/// `name(v1, v2, ...)`. Whitespace around tokens is ignored; the edge name
/// is not retained. Unparseable input yields `None`.
pub fn parse_hypergraph(input: &str) -> Option<Hypergraph<String>> {
    let mut graph = Hypergraph::new();

    for line in input.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (_, rest) = line.split_once('(')?;
        let (vertex_list, tail) = rest.split_once(')')?;
        if !tail.trim().is_empty() {
            return None;
        }

        let edge = graph.add_edge();
        for vertex in vertex_list.split(',') {
            let vertex = vertex.trim();
            if vertex.is_empty() {
                return None;
            }
            graph.add_vertex(vertex.to_string());
            graph.attach(&vertex.to_string(), edge).ok()?;
        }
    }

    Some(graph)
}

/// Node identity within a [`Digraph`].
pub type NodeId = usize;

/// A directed graph tracking its current roots (nodes with no incoming
/// edge). Decomposition trees are built as digraphs and converted with
/// [`digraph_to_tree`] once exactly one root remains.
#[derive(Debug, Clone, Default)]
pub struct Digraph<T> {
    node_values: Vec<T>,
    edges_out_of: HashMap<NodeId, HashSet<NodeId>>,
    roots: HashSet<NodeId>,
}

impl<T> Digraph<T> {
    pub fn new() -> Self {
        Digraph {
            node_values: Vec::new(),
            edges_out_of: HashMap::new(),
            roots: HashSet::new(),
        }
    }

    pub fn add_vertex(&mut self, value: T) -> NodeId {
        let id = self.node_values.len();
        self.node_values.push(value);
        self.edges_out_of.insert(id, HashSet::new());
        self.roots.insert(id);
        id
    }

    /// Add an edge `x -> y`; `y` stops being a root. Unknown endpoints are
    /// rejected.
    pub fn add_edge(&mut self, x: NodeId, y: NodeId) -> bool {
        if !self.edges_out_of.contains_key(&x) || !self.edges_out_of.contains_key(&y) {
            return false;
        }
        self.edges_out_of.get_mut(&x).expect("checked").insert(y);
        self.roots.remove(&y);
        true
    }

    pub fn roots(&self) -> &HashSet<NodeId> {
        &self.roots
    }

    pub fn edges_out_of(&self, node: NodeId) -> &HashSet<NodeId> {
        &self.edges_out_of[&node]
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = NodeId> {
        0..self.node_values.len()
    }

    pub fn value(&self, node: NodeId) -> &T {
        &self.node_values[node]
    }

    pub fn value_mut(&mut self, node: NodeId) -> &mut T {
        &mut self.node_values[node]
    }

    pub fn len(&self) -> usize {
        self.node_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_values.is_empty()
    }
}

/// A rooted tree with node values `V` and edge labels `E` on the link to
/// each child.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree<V, E> {
    pub element: V,
    pub children: Vec<(Tree<V, E>, E)>,
}

impl<V, E> Tree<V, E> {
    pub fn leaf(element: V) -> Self {
        Tree {
            element,
            children: Vec::new(),
        }
    }

    pub fn node(element: V, children: Vec<(Tree<V, E>, E)>) -> Self {
        Tree { element, children }
    }

    /// JSON-ish rendering for diagnostics.
    pub fn render(&self, show: &impl Fn(&V) -> String) -> String {
        let children: Vec<String> = self
            .children
            .iter()
            .map(|(child, _)| child.render(show))
            .collect();
        format!(
            "{{ \"element\": {}, \"children\": [ {} ] }}",
            show(&self.element),
            children.join(", ")
        )
    }

    /// Number of nodes in the tree.
    pub fn size(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|(child, _)| child.size())
            .sum::<usize>()
    }
}

/// Convert a digraph with exactly one root into a tree. Returns `None` when
/// the digraph has zero or several roots, or when a node is reachable twice
/// (which would make it a dag or cyclic, not a tree).
pub fn digraph_to_tree<T: Clone>(digraph: &Digraph<T>) -> Option<Tree<T, ()>> {
    let mut roots = digraph.roots().iter();
    let root = *roots.next()?;
    if roots.next().is_some() {
        return None;
    }

    let mut seen = HashSet::new();
    build_subtree(digraph, root, &mut seen)
}

fn build_subtree<T: Clone>(
    digraph: &Digraph<T>,
    node: NodeId,
    seen: &mut HashSet<NodeId>,
) -> Option<Tree<T, ()>> {
    if !seen.insert(node) {
        return None;
    }
    let mut children = Vec::new();
    for &target in digraph.edges_out_of(node) {
        children.push((build_subtree(digraph, target, seen)?, ()));
    }
    Some(Tree {
        element: digraph.value(node).clone(),
        children,
    })
}

/// A node of a tree decomposition: a set of attributes plus a fractional
/// weight per hyperedge.
#[derive(Debug, Clone, Default)]
pub struct Bag<V> {
    pub attributes: HashSet<V>,
    pub relations: HashMap<EdgeId, f64>,
}

impl<V: Eq + Hash> Bag<V> {
    pub fn new() -> Self {
        Bag {
            attributes: HashSet::new(),
            relations: HashMap::new(),
        }
    }

    /// Total fractional weight assigned to this bag.
    pub fn weight(&self) -> f64 {
        self.relations.values().sum()
    }
}

/// Check the running-intersection property: for every attribute, the set of
/// bags containing it must be connected in the tree.
pub fn verify_running_intersection<V: Clone + Eq + Hash>(digraph: &Digraph<Bag<V>>) -> bool {
    let mut all_attributes: HashSet<V> = HashSet::new();
    for node in digraph.all_nodes() {
        for attribute in &digraph.value(node).attributes {
            all_attributes.insert(attribute.clone());
        }
    }

    for attribute in all_attributes {
        let holders: HashSet<NodeId> = digraph
            .all_nodes()
            .filter(|n| digraph.value(*n).attributes.contains(&attribute))
            .collect();

        let mut uf: UnionFindMap<NodeId, ()> = UnionFindMap::new();
        for &node in &holders {
            uf.insert(node, ());
        }
        for &source in &holders {
            for &target in digraph.edges_out_of(source) {
                if holders.contains(&target) {
                    uf.union(&source, &target, |(), ()| ());
                }
            }
        }

        if uf.component_count() != 1 {
            return false;
        }
    }

    true
}
