//! Execution engine for benchmark trials.
//!
//! Calibrates once, compiles one schedule per line and then pushes
//! `max_events` tokens through the event pipeline for every trial.

use crate::calibration::{calibrate, CalibrationConfig, CalibrationTable};
use crate::executor::{ExecutionService, RayonExecutor};
use crate::monitor::{EventRecorder, Metrics, TrialTiming};
use crate::pipeline::{EventPipeline, PipelineRunner};
use crate::seed::SeedSource;
use crate::workload::{TaskStats, WorkloadFactory, WorkloadPolicy, WorkloadTask};
use mockflow_core::{CoreError, CoreResult, LineId, RunId};
use mockflow_plan::{Compiler, CompilerWarning, PrecedenceSchedule, WorkflowGraph};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Execution engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Workflow name, used for plan dumps
    pub name: String,
    /// Worker threads of the execution service
    pub threads: usize,
    /// Concurrent processing lines
    pub lines: usize,
    /// Events admitted per trial
    pub max_events: u64,
    /// Repeated trials
    pub trials: u32,
    /// Calibration settings
    pub calibration: CalibrationConfig,
    /// Settings for every compiled algorithm
    pub workload: WorkloadPolicy,
    /// Seeding of task generators
    pub seed: SeedSource,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "Demonstrator".to_string(),
            threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            lines: 1,
            max_events: 1,
            trials: 1,
            calibration: CalibrationConfig::default(),
            workload: WorkloadPolicy::default(),
            seed: SeedSource::default(),
        }
    }
}

impl EngineConfig {
    /// Set workflow name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set worker threads
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set concurrent lines
    #[must_use]
    pub fn with_lines(mut self, lines: usize) -> Self {
        self.lines = lines;
        self
    }

    /// Set events per trial
    #[must_use]
    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = max_events;
        self
    }

    /// Set trial count
    #[must_use]
    pub fn with_trials(mut self, trials: u32) -> Self {
        self.trials = trials;
        self
    }

    /// Set calibration settings
    #[must_use]
    pub fn with_calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.calibration = calibration;
        self
    }

    /// Set workload policy
    #[must_use]
    pub fn with_workload(mut self, workload: WorkloadPolicy) -> Self {
        self.workload = workload;
        self
    }

    /// Set seed source
    #[must_use]
    pub fn with_seed(mut self, seed: SeedSource) -> Self {
        self.seed = seed;
        self
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if a count is zero or a nested setting is invalid
    pub fn validate(&self) -> CoreResult<()> {
        if self.threads == 0 {
            return Err(CoreError::invalid_config("threads must be at least 1"));
        }
        if self.lines == 0 {
            return Err(CoreError::invalid_config("lines must be at least 1"));
        }
        if self.trials == 0 {
            return Err(CoreError::invalid_config("trials must be at least 1"));
        }
        self.calibration.validate()?;
        self.workload.validate()
    }
}

/// Runs benchmark trials over compiled schedules
pub struct ExecutionEngine<E = RayonExecutor> {
    config: EngineConfig,
    executor: E,
    table: Arc<CalibrationTable>,
    lines: Vec<PrecedenceSchedule<WorkloadTask>>,
    warnings: Vec<CompilerWarning>,
    recorder: EventRecorder,
}

impl ExecutionEngine<RayonExecutor> {
    /// Calibrate, start the worker pool and compile the graph
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid, calibration is degenerate or
    /// the graph does not compile
    pub fn prepare(config: EngineConfig, graph: &WorkflowGraph) -> CoreResult<Self> {
        config.validate()?;
        let table = calibrate(&config.calibration)?;
        let executor = RayonExecutor::new(config.threads)?;
        Self::with_parts(config, graph, table, executor)
    }
}

impl<E: ExecutionService> ExecutionEngine<E> {
    /// Build from an existing table and execution service
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid or the graph does not compile
    pub fn with_parts(
        config: EngineConfig,
        graph: &WorkflowGraph,
        table: Arc<CalibrationTable>,
        executor: E,
    ) -> CoreResult<Self> {
        config.validate()?;

        let compiler = Compiler::new();
        let mut factory = WorkloadFactory::new(table.clone(), config.seed, config.workload);
        let mut lines = Vec::with_capacity(config.lines);
        let mut warnings = Vec::new();

        for line in 0..config.lines {
            let output = compiler.compile(graph, |_, vertex| factory.for_vertex(vertex))?;
            if line == 0 {
                for warning in &output.warnings {
                    warn!(%warning, "Compiler warning");
                }
                warnings = output.warnings;
            }
            lines.push(output.schedule);
        }

        info!(
            name = %config.name,
            lines = config.lines,
            concurrency = executor.concurrency(),
            algorithms = lines.first().map_or(0, |s| s.node_count()),
            "Prepared workflow"
        );

        Ok(Self {
            config,
            executor,
            table,
            lines,
            warnings,
            recorder: EventRecorder::new(),
        })
    }

    /// Run one trial of `max_events` events
    ///
    /// # Errors
    ///
    /// Returns error if a line fails to execute its schedule
    pub fn run_trial(&mut self) -> CoreResult<TrialTiming> {
        let run_id = RunId::new();
        self.recorder.clear();

        info!(%run_id, "Begin processing");
        let start = Instant::now();
        let pipeline: EventPipeline<'_, E, WorkloadTask> =
            EventPipeline::new(&self.executor, self.config.max_events, &self.recorder);
        let summary = PipelineRunner::new().run(&pipeline, self.lines.as_mut_slice())?;
        let elapsed = start.elapsed();
        info!(%run_id, events = summary.completed(), "End processing");

        Ok(TrialTiming::new(
            run_id,
            elapsed,
            self.config.max_events,
            self.config.threads,
            self.config.lines,
        ))
    }

    /// Run all configured trials
    ///
    /// # Errors
    ///
    /// Stops at the first failing trial
    pub fn run(&mut self) -> CoreResult<Vec<TrialTiming>> {
        (0..self.config.trials).map(|_| self.run_trial()).collect()
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared calibration table
    #[must_use]
    pub fn table(&self) -> &Arc<CalibrationTable> {
        &self.table
    }

    /// Compiled schedules, one per line
    #[must_use]
    pub fn lines(&self) -> &[PrecedenceSchedule<WorkloadTask>] {
        &self.lines
    }

    /// Warnings from compiling the graph
    #[must_use]
    pub fn warnings(&self) -> &[CompilerWarning] {
        &self.warnings
    }

    /// Metrics of the last trial
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.recorder.metrics()
    }

    /// Stage records of the last trial
    #[must_use]
    pub fn recorder(&self) -> &EventRecorder {
        &self.recorder
    }

    /// Per-task statistics across all trials
    pub fn task_stats(&self) -> impl Iterator<Item = (LineId, &str, &TaskStats)> + '_ {
        self.lines.iter().enumerate().flat_map(|(index, schedule)| {
            schedule
                .payloads()
                .map(move |task| (LineId::new(index as u32), task.name(), task.stats()))
        })
    }

    /// Graphviz rendering of the per-event schedule
    #[must_use]
    pub fn core_dot(&self) -> String {
        let name = format!("{}-core", self.config.name);
        self.lines
            .first()
            .map_or_else(|| format!("digraph \"{}\" {{\n}}\n", name), |s| s.to_dot(&name))
    }

    /// Graphviz rendering of one trial around the pipeline
    #[must_use]
    pub fn trial_dot(&self) -> String {
        let name = &self.config.name;
        let mut out = String::new();
        let _ = writeln!(out, "digraph \"{}\" {{", name);
        let _ = writeln!(out, "  begin [label=\"Begin processing\"];");
        let _ = writeln!(
            out,
            "  pipeline [label=\"{}-pipeline ({} lines)\"];",
            name, self.config.lines
        );
        let _ = writeln!(out, "  end [label=\"End processing\"];");
        out.push_str("  begin -> pipeline;\n  pipeline -> end;\n}\n");
        out
    }
}
