//! Requirements graph used to diagnose scheduling deadlocks.
//!
//! Edges point from a node to each name it must wait for. A cycle means the
//! scheduler can never make any node on it ready.

use std::collections::HashMap;

use petgraph::algo::{astar, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

/// Directed graph of node names and their requirements.
#[derive(Debug, Default)]
pub struct RequirementsGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl RequirementsGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(name) {
            index
        } else {
            let index = self.graph.add_node(name.to_string());
            self.node_map.insert(name.to_string(), index);
            index
        }
    }

    /// Add a node with no requirements.
    pub fn add_node(&mut self, name: &str) {
        self.ensure_node(name);
    }

    /// Record that `node` waits for `required`.
    pub fn add_requirement(&mut self, node: &str, required: &str) {
        let from = self.ensure_node(node);
        let to = self.ensure_node(required);
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Find one cycle, returned closed (`a -> b -> a`).
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let start = toposort(&self.graph, None).err()?.node_id();
        self.graph.neighbors(start).find_map(|next| {
            astar(&self.graph, next, |n| n == start, |_| 1usize, |_| 0).map(|(_, path)| {
                std::iter::once(start)
                    .chain(path)
                    .map(|n| self.graph[n].clone())
                    .collect()
            })
        })
    }

    /// Names ordered so every requirement precedes the nodes waiting on it.
    ///
    /// Returns `None` when the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        toposort(&self.graph, None)
            .ok()
            .map(|indices| indices.into_iter().rev().map(|i| self.graph[i].clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_has_order() {
        let mut graph = RequirementsGraph::new();
        graph.add_requirement("src/a", "src");
        graph.add_requirement("src/a/b", "src/a");
        graph.add_requirement("src/a/b", "src/a");
        assert_eq!(graph.node_count(), 3);
        assert!(graph.find_cycle().is_none());
        assert_eq!(graph.topological_order().unwrap(), ["src", "src/a", "src/a/b"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = RequirementsGraph::new();
        graph.add_requirement("x", "y");
        graph.add_requirement("y", "z");
        graph.add_requirement("z", "x");
        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 4);
        assert!(graph.topological_order().is_none());
    }

    #[test]
    fn test_self_requirement() {
        let mut graph = RequirementsGraph::new();
        graph.add_requirement("a", "a");
        assert_eq!(graph.find_cycle().unwrap(), ["a", "a"]);
    }
}
