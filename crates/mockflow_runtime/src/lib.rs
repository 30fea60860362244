//! mockflow Runtime
//!
//! Emulates the CPU cost of data-flow workloads. A calibrated prime search
//! stands in for each algorithm, compiled schedules run on an execution
//! service, and an event pipeline drives repeated executions across
//! concurrent lines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod busywork;
pub mod calibration;
mod duration_secs;
pub mod engine;
pub mod executor;
pub mod monitor;
pub mod pipeline;
pub mod scheduler;
pub mod seed;
pub mod workload;

pub use busywork::burn;
pub use calibration::{calibrate, CalibrationConfig, CalibrationTable, Calibrator, PrimeProbe, Probe};
pub use engine::{EngineConfig, ExecutionEngine};
pub use executor::{ExecutionService, InlineExecutor, Job, RayonExecutor};
pub use monitor::{EventRecord, EventRecorder, Metrics, Stage, TrialTiming};
pub use pipeline::{Admission, EventPipeline, PipelineRunner, PipelineStages, PipelineSummary};
pub use scheduler::{ScheduleDecision, Scheduler};
pub use seed::SeedSource;
pub use workload::{JitterPolicy, TaskStats, WorkloadFactory, WorkloadPolicy, WorkloadProfile, WorkloadTask};
