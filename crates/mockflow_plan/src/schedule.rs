//! Precedence schedule over algorithms.
//!
//! The schedule is the result of compiling a workflow graph. Nodes are the
//! algorithms only, each carrying an arbitrary payload (usually the workload
//! task that emulates it), and an edge `A -> B` means `B` may start only
//! after `A` has finished.

use indexmap::{IndexMap, IndexSet};
use mockflow_core::{CoreError, CoreResult, NodeId};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A directed graph of algorithms and their precedence edges
#[derive(Debug, Clone)]
pub struct PrecedenceSchedule<T> {
    /// All nodes in insertion order
    nodes: IndexMap<NodeId, ScheduleNode<T>>,
    /// All edges, deduplicated
    edges: IndexSet<Edge>,
}

impl<T> PrecedenceSchedule<T> {
    /// Create a new empty schedule
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            edges: IndexSet::new(),
        }
    }

    /// Add a node to the schedule
    ///
    /// # Errors
    ///
    /// Returns error if node already exists
    pub fn add_node(&mut self, id: NodeId, name: impl Into<String>, payload: T) -> CoreResult<()> {
        if self.nodes.contains_key(&id) {
            return Err(CoreError::AlreadyExists {
                kind: "Node".to_string(),
                id: id.to_string(),
            });
        }
        self.nodes.insert(
            id,
            ScheduleNode {
                id,
                name: name.into(),
                payload,
            },
        );
        Ok(())
    }

    /// Add an edge to the schedule
    ///
    /// Inserting an edge that already exists is a no-op. Returns whether the
    /// edge was new.
    ///
    /// # Errors
    ///
    /// Returns error if either endpoint is not a node of the schedule
    pub fn add_edge(&mut self, edge: Edge) -> CoreResult<bool> {
        for id in [edge.from, edge.to] {
            if !self.nodes.contains_key(&id) {
                return Err(CoreError::NotFound {
                    kind: "Node".to_string(),
                    id: id.to_string(),
                });
            }
        }
        Ok(self.edges.insert(edge))
    }

    /// Get node by ID
    #[must_use]
    pub fn get_node(&self, id: NodeId) -> Option<&ScheduleNode<T>> {
        self.nodes.get(&id)
    }

    /// Iterate over nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &ScheduleNode<T>> + '_ {
        self.nodes.values()
    }

    /// Iterate over payloads in insertion order
    pub fn payloads(&self) -> impl Iterator<Item = &T> + '_ {
        self.nodes.values().map(|node| &node.payload)
    }

    /// Iterate mutably over payloads in insertion order
    pub fn payloads_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.nodes.values_mut().map(|node| &mut node.payload)
    }

    /// Iterate over edges in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter()
    }

    /// Check whether the edge `from -> to` exists
    #[must_use]
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.contains(&Edge::new(from, to))
    }

    /// Index-based view of the schedule for executors
    ///
    /// Node `i` of the plan is the `i`-th node in insertion order, matching
    /// the order of [`payloads_mut`](Self::payloads_mut).
    #[must_use]
    pub fn execution_plan(&self) -> ExecutionPlan {
        let mut indegree = vec![0; self.nodes.len()];
        let mut dependents = vec![Vec::new(); self.nodes.len()];

        for edge in &self.edges {
            // Both endpoints were checked by add_edge
            if let (Some(from), Some(to)) = (
                self.nodes.get_index_of(&edge.from),
                self.nodes.get_index_of(&edge.to),
            ) {
                dependents[from].push(to);
                indegree[to] += 1;
            }
        }

        let roots = indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        ExecutionPlan {
            indegree,
            dependents,
            roots,
        }
    }

    /// Get total node count
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get total edge count
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Check if schedule is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render the schedule as a Graphviz digraph
    #[must_use]
    pub fn to_dot(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", escape(name));
        for node in self.nodes.values() {
            let _ = writeln!(out, "  {} [label=\"{}\"];", node.id, escape(&node.name));
        }
        for edge in &self.edges {
            let _ = writeln!(out, "  {} -> {};", edge.from, edge.to);
        }
        out.push_str("}\n");
        out
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

impl<T> Default for PrecedenceSchedule<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A node in the schedule
#[derive(Debug, Clone)]
pub struct ScheduleNode<T> {
    /// Id of the algorithm vertex this node was compiled from
    pub id: NodeId,
    /// Algorithm name
    pub name: String,
    /// Work attached to the node
    pub payload: T,
}

/// A precedence edge between two algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Node that must finish first
    pub from: NodeId,
    /// Node that waits
    pub to: NodeId,
}

impl Edge {
    /// Create a new edge
    #[must_use]
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }
}

/// Dependency counts and adjacency by dense node index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Number of unfinished dependencies per node
    pub indegree: Vec<usize>,
    /// Dependents per node
    pub dependents: Vec<Vec<usize>>,
    /// Nodes with no dependencies
    pub roots: Vec<usize>,
}

impl ExecutionPlan {
    /// Number of nodes in the plan
    #[must_use]
    pub fn len(&self) -> usize {
        self.indegree.len()
    }

    /// Check if plan has no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indegree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: u32) -> NodeId {
        NodeId::new(i)
    }

    fn chain() -> PrecedenceSchedule<()> {
        let mut schedule = PrecedenceSchedule::new();
        schedule.add_node(id(0), "A", ()).unwrap();
        schedule.add_node(id(2), "B", ()).unwrap();
        schedule.add_node(id(4), "C", ()).unwrap();
        schedule.add_edge(Edge::new(id(0), id(2))).unwrap();
        schedule.add_edge(Edge::new(id(2), id(4))).unwrap();
        schedule
    }

    #[test]
    fn test_schedule_new() {
        let schedule: PrecedenceSchedule<()> = PrecedenceSchedule::new();
        assert!(schedule.is_empty());
        assert_eq!(schedule.node_count(), 0);
        assert_eq!(schedule.edge_count(), 0);
    }

    #[test]
    fn test_add_node_duplicate() {
        let mut schedule = PrecedenceSchedule::new();
        schedule.add_node(id(0), "A", ()).unwrap();
        let result = schedule.add_node(id(0), "A", ());
        assert!(matches!(result, Err(CoreError::AlreadyExists { .. })));
    }

    #[test]
    fn test_add_edge_idempotent() {
        let mut schedule = chain();
        let inserted = schedule.add_edge(Edge::new(id(0), id(2))).unwrap();
        assert!(!inserted);
        assert_eq!(schedule.edge_count(), 2);
    }

    #[test]
    fn test_add_edge_missing_node() {
        let mut schedule = chain();
        let result = schedule.add_edge(Edge::new(id(0), id(9)));
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn test_execution_plan_indices() {
        let schedule = chain();
        let plan = schedule.execution_plan();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.indegree, vec![0, 1, 1]);
        assert_eq!(plan.dependents, vec![vec![1], vec![2], vec![]]);
        assert_eq!(plan.roots, vec![0]);
    }

    #[test]
    fn test_to_dot() {
        let dot = chain().to_dot("demo");
        assert!(dot.starts_with("digraph \"demo\" {"));
        assert!(dot.contains("n0 [label=\"A\"];"));
        assert!(dot.contains("n0 -> n2;"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
