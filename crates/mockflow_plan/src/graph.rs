//! Bipartite data-flow graph.
//!
//! A workflow is described by two kinds of vertices: algorithms, which are
//! units of computation, and data objects, which only carry the
//! producer/consumer relation between algorithms. Edges always cross the two
//! kinds.

use indexmap::IndexSet;
use mockflow_core::{CoreError, CoreResult, NodeId};
use serde::{Deserialize, Serialize};

/// Vertex kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexKind {
    /// Unit of computation, scheduled and timed
    Algorithm,
    /// Data dependency between algorithms, never scheduled
    DataObject,
}

impl VertexKind {
    /// Name used in graph descriptions
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Algorithm => "Algorithm",
            Self::DataObject => "DataObject",
        }
    }
}

impl std::fmt::Display for VertexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VertexKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Algorithm" => Ok(Self::Algorithm),
            "DataObject" => Ok(Self::DataObject),
            other => Err(CoreError::ParseError {
                message: format!("unknown vertex type '{}'", other),
            }),
        }
    }
}

/// Vertex properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Vertex name
    pub name: String,
    /// Vertex kind
    pub kind: VertexKind,
    /// Class of the algorithm or type of the data object
    pub class: String,
    /// Mean runtime in seconds (algorithms only)
    pub runtime_s: f64,
    /// Average size in bytes (data objects only)
    pub memory_footprint_b: f64,
}

impl Vertex {
    /// Create an algorithm vertex with a mean runtime
    #[must_use]
    pub fn algorithm(name: impl Into<String>, runtime_s: f64) -> Self {
        Self {
            name: name.into(),
            kind: VertexKind::Algorithm,
            class: String::new(),
            runtime_s,
            memory_footprint_b: 0.0,
        }
    }

    /// Create a data object vertex
    #[must_use]
    pub fn data_object(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: VertexKind::DataObject,
            class: String::new(),
            runtime_s: 0.0,
            memory_footprint_b: 0.0,
        }
    }

    /// Set class
    #[must_use]
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    /// Set memory footprint
    #[must_use]
    pub fn with_memory_footprint(mut self, bytes: f64) -> Self {
        self.memory_footprint_b = bytes;
        self
    }

    /// Check whether this is an algorithm vertex
    #[must_use]
    pub fn is_algorithm(&self) -> bool {
        self.kind == VertexKind::Algorithm
    }
}

/// A bipartite directed graph of algorithms and data objects
///
/// Built once from a description and read-only afterwards. Vertex ids are
/// dense indices in insertion order.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    vertices: Vec<Vertex>,
    out_edges: Vec<IndexSet<NodeId>>,
    in_edges: Vec<IndexSet<NodeId>>,
    edge_count: usize,
}

impl WorkflowGraph {
    /// Create a new empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex and return its id
    pub fn add_vertex(&mut self, vertex: Vertex) -> NodeId {
        let id = NodeId::new(self.vertices.len() as u32);
        self.vertices.push(vertex);
        self.out_edges.push(IndexSet::new());
        self.in_edges.push(IndexSet::new());
        id
    }

    /// Add a directed edge
    ///
    /// Parallel edges collapse into one.
    ///
    /// # Errors
    ///
    /// Returns error if an endpoint is unknown or both endpoints have the
    /// same kind
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> CoreResult<()> {
        let from_kind = self.require(from)?.kind;
        let to_kind = self.require(to)?.kind;

        if from_kind == to_kind {
            return Err(CoreError::Validation {
                field: "edge".to_string(),
                reason: format!(
                    "{} -> {} connects two {} vertices",
                    self.vertices[from.index()].name,
                    self.vertices[to.index()].name,
                    from_kind
                ),
            });
        }

        if self.out_edges[from.index()].insert(to) {
            self.in_edges[to.index()].insert(from);
            self.edge_count += 1;
        }
        Ok(())
    }

    fn require(&self, id: NodeId) -> CoreResult<&Vertex> {
        self.vertices.get(id.index()).ok_or_else(|| CoreError::NotFound {
            kind: "Vertex".to_string(),
            id: id.to_string(),
        })
    }

    /// Get vertex by ID
    #[must_use]
    pub fn vertex(&self, id: NodeId) -> Option<&Vertex> {
        self.vertices.get(id.index())
    }

    /// Iterate over all vertices with their ids
    pub fn vertices(&self) -> impl Iterator<Item = (NodeId, &Vertex)> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .map(|(i, v)| (NodeId::new(i as u32), v))
    }

    /// Iterate over algorithm vertices
    pub fn algorithms(&self) -> impl Iterator<Item = (NodeId, &Vertex)> + '_ {
        self.vertices().filter(|(_, v)| v.kind == VertexKind::Algorithm)
    }

    /// Iterate over data object vertices
    pub fn data_objects(&self) -> impl Iterator<Item = (NodeId, &Vertex)> + '_ {
        self.vertices().filter(|(_, v)| v.kind == VertexKind::DataObject)
    }

    /// Vertices with an edge into `id`
    pub fn producers(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.in_edges
            .get(id.index())
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Vertices with an edge out of `id`
    pub fn consumers(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.out_edges
            .get(id.index())
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Check whether the edge `from -> to` exists
    #[must_use]
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.out_edges
            .get(from.index())
            .is_some_and(|set| set.contains(&to))
    }

    /// Get total vertex count
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get total edge count
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Check if graph is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_new() {
        let graph = WorkflowGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.vertex_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_add_vertex_assigns_dense_ids() {
        let mut graph = WorkflowGraph::new();
        let a = graph.add_vertex(Vertex::algorithm("A", 0.1));
        let d = graph.add_vertex(Vertex::data_object("D"));
        assert_eq!(a.index(), 0);
        assert_eq!(d.index(), 1);
        assert_eq!(graph.vertex(d).map(|v| v.kind), Some(VertexKind::DataObject));
    }

    #[test]
    fn test_add_edge_bipartite() {
        let mut graph = WorkflowGraph::new();
        let a = graph.add_vertex(Vertex::algorithm("A", 0.1));
        let d = graph.add_vertex(Vertex::data_object("D"));
        graph.add_edge(a, d).unwrap();

        assert!(graph.has_edge(a, d));
        assert_eq!(graph.consumers(a).collect::<Vec<_>>(), vec![d]);
        assert_eq!(graph.producers(d).collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn test_add_edge_rejects_same_kind() {
        let mut graph = WorkflowGraph::new();
        let a = graph.add_vertex(Vertex::algorithm("A", 0.1));
        let b = graph.add_vertex(Vertex::algorithm("B", 0.1));
        let result = graph.add_edge(a, b);
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn test_add_edge_unknown_vertex() {
        let mut graph = WorkflowGraph::new();
        let a = graph.add_vertex(Vertex::algorithm("A", 0.1));
        let result = graph.add_edge(a, NodeId::new(9));
        assert!(matches!(result, Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn test_parallel_edges_collapse() {
        let mut graph = WorkflowGraph::new();
        let a = graph.add_vertex(Vertex::algorithm("A", 0.1));
        let d = graph.add_vertex(Vertex::data_object("D"));
        graph.add_edge(a, d).unwrap();
        graph.add_edge(a, d).unwrap();
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_vertex_kind_parse() {
        assert_eq!("Algorithm".parse::<VertexKind>().unwrap(), VertexKind::Algorithm);
        assert_eq!("DataObject".parse::<VertexKind>().unwrap(), VertexKind::DataObject);
        assert!("DecisionHub".parse::<VertexKind>().is_err());
    }

    #[test]
    fn test_algorithm_and_data_object_filters() {
        let mut graph = WorkflowGraph::new();
        graph.add_vertex(Vertex::algorithm("A", 0.1));
        graph.add_vertex(Vertex::data_object("D").with_memory_footprint(8.0));
        graph.add_vertex(Vertex::algorithm("B", 0.2).with_class("MicroProducer"));

        let names: Vec<_> = graph.algorithms().map(|(_, v)| v.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(graph.data_objects().count(), 1);
    }
}
