//! Compiler from a bipartite workflow graph to a precedence schedule.
//!
//! Only algorithms become schedule nodes. Each data object contributes one
//! edge per (producer, consumer) pair; a pair connected by several data
//! objects still yields a single edge.

use super::graph::{Vertex, WorkflowGraph};
use super::schedule::{Edge, PrecedenceSchedule};
use super::validate::{check_acyclic, Validator};
use mockflow_core::{CoreResult, NodeId};
use tracing::{debug, warn};

/// Output from compiling a workflow
#[derive(Debug, Clone)]
pub struct CompilerOutput<T> {
    /// The compiled schedule
    pub schedule: PrecedenceSchedule<T>,
    /// Compilation warnings
    pub warnings: Vec<CompilerWarning>,
}

/// Compilation warning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerWarning {
    /// Algorithm has no runtime and will emulate nothing
    MissingRuntime {
        /// Algorithm name
        name: String,
    },
    /// Data object that no algorithm produces
    UnproducedDataObject {
        /// Data object name
        name: String,
    },
    /// Data object that no algorithm consumes
    UnconsumedDataObject {
        /// Data object name
        name: String,
    },
}

impl std::fmt::Display for CompilerWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRuntime { name } => write!(f, "algorithm '{}' has no runtime", name),
            Self::UnproducedDataObject { name } => {
                write!(f, "data object '{}' has no producer", name)
            }
            Self::UnconsumedDataObject { name } => {
                write!(f, "data object '{}' has no consumer", name)
            }
        }
    }
}

/// Compiler for transforming a workflow graph into a schedule
#[derive(Debug, Clone)]
pub struct Compiler {
    validator: Validator,
    reject_cycles: bool,
}

impl Compiler {
    /// Create a new compiler
    #[must_use]
    pub fn new() -> Self {
        Self {
            validator: Validator::new(),
            reject_cycles: true,
        }
    }

    /// Set whether a cyclic schedule is an error
    #[must_use]
    pub fn with_reject_cycles(mut self, reject: bool) -> Self {
        self.reject_cycles = reject;
        self
    }

    /// Compile a graph, building each node's payload with `make`
    ///
    /// `make` is called once per algorithm in vertex order.
    ///
    /// # Errors
    ///
    /// Returns error if the graph fails validation, `make` fails, or the
    /// resulting schedule has a cycle
    pub fn compile<T, F>(&self, graph: &WorkflowGraph, mut make: F) -> CoreResult<CompilerOutput<T>>
    where
        F: FnMut(NodeId, &Vertex) -> CoreResult<T>,
    {
        if let Err(errors) = self.validator.validate(graph) {
            for e in &errors {
                warn!(error = %e, "Graph validation failed");
            }
            // validate only returns Err with at least one entry
            if let Some(first) = errors.into_iter().next() {
                return Err(first.into());
            }
        }

        let mut schedule = PrecedenceSchedule::new();
        let mut warnings = Vec::new();

        for (id, vertex) in graph.algorithms() {
            if vertex.runtime_s == 0.0 {
                warnings.push(CompilerWarning::MissingRuntime {
                    name: vertex.name.clone(),
                });
            }
            let payload = make(id, vertex)?;
            schedule.add_node(id, vertex.name.clone(), payload)?;
        }

        for (id, vertex) in graph.data_objects() {
            let producers: Vec<NodeId> = graph.producers(id).collect();
            let consumers: Vec<NodeId> = graph.consumers(id).collect();

            if producers.is_empty() {
                warnings.push(CompilerWarning::UnproducedDataObject {
                    name: vertex.name.clone(),
                });
            }
            if consumers.is_empty() {
                warnings.push(CompilerWarning::UnconsumedDataObject {
                    name: vertex.name.clone(),
                });
            }

            for &producer in &producers {
                for &consumer in &consumers {
                    schedule.add_edge(Edge::new(producer, consumer))?;
                }
            }
        }

        if self.reject_cycles {
            check_acyclic(&schedule)?;
        }

        debug!(
            nodes = schedule.node_count(),
            edges = schedule.edge_count(),
            warnings = warnings.len(),
            "Compiled precedence schedule"
        );

        Ok(CompilerOutput { schedule, warnings })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
