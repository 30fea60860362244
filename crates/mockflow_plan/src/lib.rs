//! mockflow Planner
//!
//! Bipartite data-flow graphs of algorithms and data objects, their JSON
//! loader, and the compiler that turns them into precedence schedules over
//! algorithms.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod graph;
pub mod loader;
pub mod schedule;
pub mod validate;

pub use compiler::{Compiler, CompilerOutput, CompilerWarning};
pub use graph::{Vertex, VertexKind, WorkflowGraph};
pub use loader::{parse_workflow, read_workflow, read_workflow_file};
pub use schedule::{Edge, ExecutionPlan, PrecedenceSchedule, ScheduleNode};
pub use validate::{check_acyclic, topological_order, ValidationError, Validator};
