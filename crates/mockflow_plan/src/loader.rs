//! Workflow graph loader for JSON node-link documents.
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": 0, "node_id": "Producer", "type": "Algorithm", "runtime_average_s": 0.02 },
//!     { "id": 1, "node_id": "Tracks", "type": "DataObject", "size_average_B": 4096 },
//!     { "id": 2, "node_id": "Consumer", "type": "Algorithm", "runtime_average_s": 0.01 }
//!   ],
//!   "links": [ { "source": 0, "target": 1 }, { "source": 1, "target": 2 } ]
//! }
//! ```
//!
//! Node keys may be numbers or strings. `node_id` defaults to the key.
//!
//! Only this JSON layout with the fixed attribute names above is read.
//! GraphML descriptions and remapped property keys are not supported;
//! convert such graphs to node-link JSON first.

use super::graph::{Vertex, VertexKind, WorkflowGraph};
use indexmap::IndexMap;
use mockflow_core::{CoreError, CoreResult, NodeId};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct Document {
    nodes: Vec<NodeRecord>,
    #[serde(default, alias = "links")]
    edges: Vec<EdgeRecord>,
}

#[derive(Debug, Deserialize)]
struct NodeRecord {
    id: Key,
    #[serde(default)]
    node_id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    runtime_average_s: f64,
    #[serde(default, rename = "size_average_B")]
    size_average_b: f64,
}

#[derive(Debug, Deserialize)]
struct EdgeRecord {
    source: Key,
    target: Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
enum Key {
    Number(u64),
    Text(String),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Parse a workflow graph from a JSON string
///
/// # Errors
///
/// Returns [`CoreError::ParseError`] for malformed documents, unknown node
/// types, duplicate keys or dangling edges, and [`CoreError::Validation`]
/// for edges between two vertices of the same kind
pub fn parse_workflow(input: &str) -> CoreResult<WorkflowGraph> {
    let document: Document = serde_json::from_str(input)?;
    build(document)
}

/// Read a workflow graph from any reader
///
/// # Errors
///
/// See [`parse_workflow`]
pub fn read_workflow<R: Read>(reader: R) -> CoreResult<WorkflowGraph> {
    let document: Document = serde_json::from_reader(reader)?;
    build(document)
}

/// Read a workflow graph from a file
///
/// # Errors
///
/// Returns [`CoreError::Io`] if the file cannot be opened, otherwise see
/// [`parse_workflow`]
pub fn read_workflow_file(path: impl AsRef<Path>) -> CoreResult<WorkflowGraph> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let graph = read_workflow(std::io::BufReader::new(file))?;
    info!(
        path = %path.display(),
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        "Loaded workflow graph"
    );
    Ok(graph)
}

fn build(document: Document) -> CoreResult<WorkflowGraph> {
    let mut graph = WorkflowGraph::new();
    let mut ids: IndexMap<Key, NodeId> = IndexMap::with_capacity(document.nodes.len());

    for record in document.nodes {
        let kind: VertexKind = record.kind.parse()?;
        let name = record.node_id.unwrap_or_else(|| record.id.to_string());
        let vertex = match kind {
            VertexKind::Algorithm => Vertex::algorithm(name, record.runtime_average_s),
            VertexKind::DataObject => {
                Vertex::data_object(name).with_memory_footprint(record.size_average_b)
            }
        }
        .with_class(record.class);

        if ids.contains_key(&record.id) {
            return Err(CoreError::ParseError {
                message: format!("duplicate node key '{}'", record.id),
            });
        }
        let id = graph.add_vertex(vertex);
        ids.insert(record.id, id);
    }

    let lookup = |key: &Key| {
        ids.get(key).copied().ok_or_else(|| CoreError::ParseError {
            message: format!("edge endpoint '{}' is not a node", key),
        })
    };

    for edge in &document.edges {
        graph.add_edge(lookup(&edge.source)?, lookup(&edge.target)?)?;
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str = r#"{
        "nodes": [
            { "id": 0, "node_id": "Producer", "type": "Algorithm", "class": "Gen", "runtime_average_s": 0.02 },
            { "id": 1, "node_id": "Tracks", "type": "DataObject", "class": "Vec", "size_average_B": 4096 },
            { "id": 2, "node_id": "Consumer", "type": "Algorithm", "runtime_average_s": 0.01 }
        ],
        "links": [ { "source": 0, "target": 1 }, { "source": 1, "target": 2 } ]
    }"#;

    #[test]
    fn test_parse_node_link() {
        let graph = parse_workflow(DEMO).unwrap();
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 2);

        let producer = graph.vertex(NodeId::new(0)).unwrap();
        assert_eq!(producer.name, "Producer");
        assert_eq!(producer.class, "Gen");
        assert!((producer.runtime_s - 0.02).abs() < f64::EPSILON);

        let tracks = graph.vertex(NodeId::new(1)).unwrap();
        assert_eq!(tracks.kind, VertexKind::DataObject);
        assert!((tracks.memory_footprint_b - 4096.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_string_keys_and_edges_alias() {
        let input = r#"{
            "nodes": [
                { "id": "a", "type": "Algorithm" },
                { "id": "d", "type": "DataObject" }
            ],
            "edges": [ { "source": "a", "target": "d" } ]
        }"#;
        let graph = parse_workflow(input).unwrap();
        let a = graph.vertex(NodeId::new(0)).unwrap();
        assert_eq!(a.name, "a");
        assert_eq!(a.runtime_s, 0.0);
        assert!(graph.has_edge(NodeId::new(0), NodeId::new(1)));
    }

    #[test]
    fn test_unknown_type() {
        let input = r#"{ "nodes": [ { "id": 0, "type": "DecisionHub" } ] }"#;
        assert!(matches!(parse_workflow(input), Err(CoreError::ParseError { .. })));
    }

    #[test]
    fn test_dangling_edge() {
        let input = r#"{
            "nodes": [ { "id": 0, "type": "Algorithm" } ],
            "links": [ { "source": 0, "target": 7 } ]
        }"#;
        let err = parse_workflow(input).unwrap_err();
        assert!(matches!(err, CoreError::ParseError { ref message } if message.contains('7')));
    }

    #[test]
    fn test_duplicate_key() {
        let input = r#"{
            "nodes": [ { "id": 0, "type": "Algorithm" }, { "id": 0, "type": "DataObject" } ]
        }"#;
        assert!(matches!(parse_workflow(input), Err(CoreError::ParseError { .. })));
    }

    #[test]
    fn test_non_bipartite_edge() {
        let input = r#"{
            "nodes": [ { "id": 0, "type": "Algorithm" }, { "id": 1, "type": "Algorithm" } ],
            "links": [ { "source": 0, "target": 1 } ]
        }"#;
        assert!(matches!(parse_workflow(input), Err(CoreError::Validation { .. })));
    }

    #[test]
    fn test_graphml_rejected() {
        let input = r#"<?xml version="1.0"?><graphml><graph edgedefault="directed"/></graphml>"#;
        let result = parse_workflow(input);
        assert!(matches!(result, Err(CoreError::ParseError { .. })));
    }

    #[test]
    fn test_read_workflow_from_reader() {
        let graph = read_workflow(DEMO.as_bytes()).unwrap();
        assert_eq!(graph.algorithms().count(), 2);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_workflow_file("/nonexistent/mockflow/graph.json").unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
