//! Complex-reference graph as an arena of typed nodes and edges

use std::collections::HashMap;
use weave_model::{ReferenceType, SourceLineNumber, SymbolHandle};

/// Stable handle of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub ty: ReferenceType,
    pub id: String,
    /// Effective symbol backing the node
    pub symbol: SymbolHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub parent: NodeId,
    pub child: NodeId,
    pub is_primary: bool,
    pub source: Option<SourceLineNumber>,
}

/// Parent/child edges between effective symbols. Edges are only added once
/// both endpoints are known to exist.
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    nodes: Vec<Node>,
    index: HashMap<(ReferenceType, String), NodeId>,
    edges: Vec<Edge>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a node, returning the existing handle when already present
    pub fn node(&mut self, ty: ReferenceType, id: &str, symbol: SymbolHandle) -> NodeId {
        if let Some(existing) = self.index.get(&(ty, id.to_string())) {
            return *existing;
        }
        let node_id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { ty, id: id.to_string(), symbol });
        self.index.insert((ty, id.to_string()), node_id);
        node_id
    }

    pub fn find(&self, ty: ReferenceType, id: &str) -> Option<NodeId> {
        self.index.get(&(ty, id.to_string())).copied()
    }

    pub fn get(&self, node: NodeId) -> &Node {
        &self.nodes[node.0 as usize]
    }

    pub fn add_edge(&mut self, parent: NodeId, child: NodeId, is_primary: bool, source: Option<SourceLineNumber>) {
        self.edges.push(Edge { parent, child, is_primary, source });
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn parents(&self, child: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.child == child)
    }

    pub fn has_parent(&self, child: NodeId) -> bool {
        self.parents(child).next().is_some()
    }

    /// Children with more than one primary parent of the same type, in
    /// first-seen order
    pub fn conflicting_primaries(&self) -> Vec<(NodeId, ReferenceType)> {
        let mut counts: HashMap<(NodeId, ReferenceType), usize> = HashMap::new();
        let mut order = Vec::new();
        for edge in self.edges.iter().filter(|e| e.is_primary) {
            let key = (edge.child, self.get(edge.parent).ty);
            let count = counts.entry(key).or_insert(0);
            *count += 1;
            if *count == 2 {
                order.push(key);
            }
        }
        order
    }
}
