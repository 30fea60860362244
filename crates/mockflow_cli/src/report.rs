//! File inputs and outputs of the demonstrator.

use mockflow_core::{CoreError, CoreResult};
use mockflow_runtime::{EngineConfig, ExecutionEngine, ExecutionService, TrialTiming};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read an engine configuration from a JSON file
///
/// Missing keys take their default values.
///
/// # Errors
///
/// Returns error if the file cannot be opened or parsed
pub fn load_config(path: &Path) -> CoreResult<EngineConfig> {
    let file = File::open(path).map_err(|e| CoreError::Io {
        message: format!("{}: {}", path.display(), e),
    })?;
    let config = serde_json::from_reader(BufReader::new(file))?;
    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

fn csv_error(e: csv::Error) -> CoreError {
    CoreError::Io {
        message: format!("timing csv: {}", e),
    }
}

/// Write one CSV row per trial, header first
///
/// # Errors
///
/// Returns error if writing fails
pub fn write_timings<W: Write>(writer: W, timings: &[TrialTiming]) -> CoreResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    if timings.is_empty() {
        csv.write_record(["time", "throughput", "threads", "event_count", "max_concurrent"])
            .map_err(csv_error)?;
    }
    for timing in timings {
        csv.serialize(timing).map_err(csv_error)?;
    }
    csv.flush()?;
    Ok(())
}

/// Write the timing CSV to `path`, replacing any existing file
///
/// # Errors
///
/// Returns error if the file cannot be created or written
pub fn save_timings(path: &Path, timings: &[TrialTiming]) -> CoreResult<()> {
    let file = File::create(path).map_err(|e| CoreError::Io {
        message: format!("{}: {}", path.display(), e),
    })?;
    write_timings(file, timings)
}

/// Write `{name}.dot` and `{name}-core.dot` into `dir`
///
/// # Errors
///
/// Returns error if either file cannot be written
pub fn dump_plan<E: ExecutionService>(
    dir: &Path,
    engine: &ExecutionEngine<E>,
) -> CoreResult<(PathBuf, PathBuf)> {
    let name = &engine.config().name;
    let plan = dir.join(format!("{}.dot", name));
    let core = dir.join(format!("{}-core.dot", name));
    std::fs::write(&plan, engine.trial_dot())?;
    std::fs::write(&core, engine.core_dot())?;
    Ok((plan, core))
}
