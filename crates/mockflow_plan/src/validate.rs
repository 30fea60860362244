//! Workflow graph and schedule validation.

use super::graph::WorkflowGraph;
use super::schedule::PrecedenceSchedule;
use mockflow_core::{CoreError, CoreResult, NodeId};
use std::collections::VecDeque;

/// Validation error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Vertex has an empty name
    #[error("Vertex {node_id} has an empty name")]
    EmptyName {
        /// Offending vertex
        node_id: NodeId,
    },
    /// Algorithm runtime is negative, NaN or infinite
    #[error("Algorithm '{name}' has invalid runtime {runtime_s}")]
    InvalidRuntime {
        /// Algorithm name
        name: String,
        /// Rejected runtime in seconds
        runtime_s: f64,
    },
    /// Data object footprint is negative, NaN or infinite
    #[error("Data object '{name}' has invalid size {bytes}")]
    InvalidFootprint {
        /// Data object name
        name: String,
        /// Rejected size in bytes
        bytes: f64,
    },
}

impl From<ValidationError> for CoreError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyName { .. } => "name",
            ValidationError::InvalidRuntime { .. } => "runtime_average_s",
            ValidationError::InvalidFootprint { .. } => "size_average_B",
        };
        CoreError::Validation {
            field: field.to_string(),
            reason: err.to_string(),
        }
    }
}

/// Validator for workflow graph properties
#[derive(Debug, Clone)]
pub struct Validator {
    /// Reject algorithms and data objects without a name
    pub require_names: bool,
}

impl Validator {
    /// Create a new validator
    #[must_use]
    pub fn new() -> Self {
        Self {
            require_names: true,
        }
    }

    /// Validate a workflow graph
    ///
    /// # Errors
    ///
    /// Returns every problem found, in vertex order
    pub fn validate(&self, graph: &WorkflowGraph) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        for (id, vertex) in graph.vertices() {
            if self.require_names && vertex.name.trim().is_empty() {
                errors.push(ValidationError::EmptyName { node_id: id });
            }
            if vertex.is_algorithm() {
                if !vertex.runtime_s.is_finite() || vertex.runtime_s < 0.0 {
                    errors.push(ValidationError::InvalidRuntime {
                        name: vertex.name.clone(),
                        runtime_s: vertex.runtime_s,
                    });
                }
            } else if !vertex.memory_footprint_b.is_finite() || vertex.memory_footprint_b < 0.0 {
                errors.push(ValidationError::InvalidFootprint {
                    name: vertex.name.clone(),
                    bytes: vertex.memory_footprint_b,
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Order schedule nodes so every edge points forward
///
/// # Errors
///
/// Returns [`CoreError::CyclicSchedule`] naming the nodes that could not be
/// ordered
pub fn topological_order<T>(schedule: &PrecedenceSchedule<T>) -> CoreResult<Vec<NodeId>> {
    let plan = schedule.execution_plan();
    let mut indegree = plan.indegree.clone();
    let mut queue: VecDeque<usize> = plan.roots.iter().copied().collect();
    let mut order = Vec::with_capacity(plan.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &next in &plan.dependents[i] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    let nodes: Vec<_> = schedule.nodes().collect();
    if order.len() < plan.len() {
        let stuck = indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > 0)
            .map(|(i, _)| nodes[i].name.clone())
            .collect();
        return Err(CoreError::CyclicSchedule { nodes: stuck });
    }

    Ok(order.into_iter().map(|i| nodes[i].id).collect())
}

/// Check that a schedule has no cycle
///
/// # Errors
///
/// Returns [`CoreError::CyclicSchedule`] if it does
pub fn check_acyclic<T>(schedule: &PrecedenceSchedule<T>) -> CoreResult<()> {
    topological_order(schedule).map(|_| ())
}
