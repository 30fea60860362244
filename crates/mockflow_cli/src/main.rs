//! mockflow CLI
//!
//! Emulates a data-flow workflow on a CPU: algorithms burn calibrated CPU
//! time in dependency order while events stream through parallel lines.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod report;

use clap::Parser;
use color_eyre::Result;
use mockflow_plan::read_workflow_file;
use mockflow_runtime::{EngineConfig, ExecutionEngine, SeedSource};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mockflow")]
#[command(about = "Workflow emulator for scheduler benchmarking", long_about = None)]
struct Cli {
    /// Data-flow graph description (JSON node-link)
    #[arg(long)]
    dfg: PathBuf,
    /// Workflow name used for plan dumps
    #[arg(long)]
    name: Option<String>,
    /// Calibrate and compile without running
    #[arg(long)]
    dry_run: bool,
    /// Number of repeated trials
    #[arg(long)]
    trials: Option<u32>,
    /// Write per-trial timings as CSV
    #[arg(long, value_name = "FILE")]
    save_timing: Option<PathBuf>,
    /// Worker threads (default: available parallelism)
    #[arg(short, long)]
    threads: Option<usize>,
    /// Events processed per trial
    #[arg(long)]
    event_count: Option<u64>,
    /// Events in flight at once
    #[arg(long)]
    slots: Option<usize>,
    /// Write `{name}.dot` and `{name}-core.dot`
    #[arg(long)]
    dump_plan: bool,
    /// Skip the largest calibration points
    #[arg(long)]
    fast_calibrate: bool,
    /// Only log errors
    #[arg(long)]
    disable_logging: bool,
    /// Fixed seed for reproducible task durations
    #[arg(long)]
    seed: Option<u64>,
    /// Share of each task spent sleeping instead of computing
    #[arg(long)]
    sleep_fraction: Option<f64>,
    /// Engine configuration file (JSON), overridden by flags
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl Cli {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => report::load_config(path)?,
            None => EngineConfig::default(),
        };

        if let Some(name) = &self.name {
            config.name.clone_from(name);
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(slots) = self.slots {
            config.lines = slots;
        }
        if let Some(events) = self.event_count {
            config.max_events = events;
        }
        if let Some(trials) = self.trials {
            config.trials = trials;
        }
        if let Some(seed) = self.seed {
            config.seed = SeedSource::Fixed(seed);
        }
        if let Some(fraction) = self.sleep_fraction {
            config.workload.sleep_fraction = fraction;
        }
        if self.fast_calibrate {
            config.calibration.fast = true;
        }
        Ok(config)
    }
}

fn init_logging(disabled: bool) {
    let filter = if disabled {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mockflow=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.disable_logging);

    let config = cli.engine_config()?;
    let graph = read_workflow_file(&cli.dfg)?;
    let mut engine = ExecutionEngine::prepare(config, &graph)?;

    if cli.dry_run {
        info!("Dry run, skipping execution");
    } else {
        let timings = engine.run()?;
        for timing in &timings {
            println!("{}", timing);
        }
        for (line, task, stats) in engine.task_stats() {
            debug!(
                %line,
                task,
                invocations = stats.invocations,
                iterations = stats.iterations,
                "Task statistics"
            );
        }

        if let Some(path) = &cli.save_timing {
            report::save_timings(path, &timings)?;
            println!("Timing results saved to file: {:?}", path.display().to_string());
        }
    }

    if cli.dump_plan {
        let (plan, core) = report::dump_plan(Path::new("."), &engine)?;
        println!(
            "Execution plan saved to files: {:?} and {:?}",
            plan.display().to_string(),
            core.display().to_string()
        );
    }

    Ok(())
}
