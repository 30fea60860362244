//! Calibration model.
//!
//! Calibration times the busy-work routine at a fixed ladder of iteration
//! counts and stores the results as a table of (iterations, microseconds)
//! pairs. Emulated durations are then converted back into iteration counts
//! by piecewise linear interpolation over that table.
//!
//! The table is built once and shared read-only (`Arc`) by every workload
//! task.

use crate::busywork::burn;
use mockflow_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Iteration counts measured in every calibration
pub const BASE_ITERATIONS: [u64; 30] = [
    0, 500, 600, 700, 800, 1000, 1300, 1600, 2000, 2300, 2600, 3000, 3300, 3500, 3900, 4200, 5000,
    6000, 8000, 10000, 12000, 15000, 17000, 20000, 25000, 30000, 35000, 40000, 50000, 60000,
];

/// Iteration counts appended unless calibrating in fast mode
pub const EXTENDED_ITERATIONS: [u64; 5] = [100_000, 150_000, 200_000, 300_000, 400_000];

/// Untimed iterations run before the first measurement
pub const WARM_UP_ITERATIONS: u64 = 20_000;

/// Measurements attempted per point before clamping
pub const MAX_TRIALS: u32 = 30;

/// Factor applied to the largest count while below the minimum time
pub const GROWTH_FACTOR: f64 = 1.2;

/// Growth steps allowed before calibration is declared degenerate
pub const MAX_GROWTH_STEPS: u32 = 48;

/// Calibration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Multiplier applied to every measured time
    pub correction_factor: f64,
    /// Minimum time the largest table entry must reach
    #[serde(rename = "min_time_s", with = "crate::duration_secs")]
    pub min_time: Duration,
    /// Number of complete calibration passes
    pub min_runs: u32,
    /// Skip the largest iteration counts
    pub fast: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            correction_factor: 1.0,
            min_time: Duration::ZERO,
            min_runs: 1,
            fast: false,
        }
    }
}

impl CalibrationConfig {
    /// Set correction factor
    #[must_use]
    pub fn with_correction_factor(mut self, factor: f64) -> Self {
        self.correction_factor = factor;
        self
    }

    /// Set minimum calibration time
    #[must_use]
    pub fn with_min_time(mut self, min_time: Duration) -> Self {
        self.min_time = min_time;
        self
    }

    /// Set number of calibration passes
    #[must_use]
    pub fn with_min_runs(mut self, runs: u32) -> Self {
        self.min_runs = runs;
        self
    }

    /// Set fast mode
    #[must_use]
    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    /// Iteration ladder for this configuration
    #[must_use]
    pub fn ladder(&self) -> Vec<u64> {
        let mut ladder = BASE_ITERATIONS.to_vec();
        if !self.fast {
            ladder.extend_from_slice(&EXTENDED_ITERATIONS);
        }
        ladder
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if the correction factor is not a positive finite
    /// number or no run is requested
    pub fn validate(&self) -> CoreResult<()> {
        if !self.correction_factor.is_finite() || self.correction_factor <= 0.0 {
            return Err(CoreError::invalid_config(format!(
                "correction factor {} must be positive and finite",
                self.correction_factor
            )));
        }
        if self.min_runs == 0 {
            return Err(CoreError::invalid_config("min_runs must be at least 1"));
        }
        Ok(())
    }
}

/// Something that can time the busy-work routine
pub trait Probe {
    /// Wall time of one run with `iterations`
    fn measure(&mut self, iterations: u64) -> Duration;

    /// Untimed run before measuring
    fn warm_up(&mut self) {
        let _ = self.measure(WARM_UP_ITERATIONS);
    }
}

/// Probe timing [`burn`] with a monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimeProbe;

impl Probe for PrimeProbe {
    fn measure(&mut self, iterations: u64) -> Duration {
        let start = Instant::now();
        burn(iterations);
        start.elapsed()
    }
}

/// Monotonic table of iteration counts and elapsed microseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    iterations: Vec<u64>,
    times_us: Vec<f64>,
}

impl CalibrationTable {
    /// Create a table from matching columns
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DegenerateCalibration`] unless the table has at
    /// least two entries, starts at (0, 0), has strictly increasing
    /// iteration counts, non-decreasing times and a positive last time
    pub fn new(iterations: Vec<u64>, times_us: Vec<f64>) -> CoreResult<Self> {
        if iterations.len() != times_us.len() {
            return Err(CoreError::degenerate(format!(
                "{} iteration counts but {} times",
                iterations.len(),
                times_us.len()
            )));
        }
        if iterations.len() < 2 {
            return Err(CoreError::degenerate("table needs at least two entries"));
        }
        if iterations[0] != 0 || times_us[0] != 0.0 {
            return Err(CoreError::degenerate("first entry must be (0, 0)"));
        }
        if times_us.iter().any(|t| !t.is_finite()) {
            return Err(CoreError::degenerate("non-finite time"));
        }
        for i in 1..iterations.len() {
            if iterations[i] <= iterations[i - 1] {
                return Err(CoreError::degenerate(format!(
                    "iteration counts not increasing at entry {}",
                    i
                )));
            }
            if times_us[i] < times_us[i - 1] {
                return Err(CoreError::degenerate(format!(
                    "times decrease at entry {}",
                    i
                )));
            }
        }
        let last = times_us[times_us.len() - 1];
        if last <= 0.0 {
            return Err(CoreError::degenerate(
                "all measured times are zero, clock resolution too coarse",
            ));
        }
        Ok(Self {
            iterations,
            times_us,
        })
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.iterations.len()
    }

    /// Always false for a constructed table
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iterations.is_empty()
    }

    /// Iteration column
    #[must_use]
    pub fn iterations(&self) -> &[u64] {
        &self.iterations
    }

    /// Time column in microseconds
    #[must_use]
    pub fn times_us(&self) -> &[f64] {
        &self.times_us
    }

    /// Entries as (iterations, microseconds) pairs
    pub fn entries(&self) -> impl Iterator<Item = (u64, f64)> + '_ {
        self.iterations.iter().copied().zip(self.times_us.iter().copied())
    }

    /// Longest measured duration
    #[must_use]
    pub fn max_duration(&self) -> Duration {
        let last = self.times_us[self.times_us.len() - 1];
        Duration::from_secs_f64(last / 1e6)
    }

    /// Convert a duration into the iteration count expected to take that long
    ///
    /// Interpolates between the entries bracketing `duration`. Durations
    /// past the end of the table extrapolate along the last segment.
    #[must_use]
    pub fn estimate_iterations(&self, duration: Duration) -> u64 {
        let t = duration.as_secs_f64() * 1e6;
        let (lower, upper) = self.bracket(t);

        let x0 = self.times_us[lower];
        let x1 = self.times_us[upper];
        let y0 = self.iterations[lower] as f64;
        let y1 = self.iterations[upper] as f64;

        let m = (y1 - y0) / (x1 - x0);
        let q = y0 - m * x0;
        (m * t + q).round().max(0.0) as u64
    }

    fn bracket(&self, t: f64) -> (usize, usize) {
        // Entry 0 is (0, 0), so the search starts at 1
        if let Some(i) = (1..self.times_us.len()).find(|&i| self.times_us[i] > t) {
            return (i - 1, i);
        }

        let last = self.times_us.len() - 1;
        let mut lower = last - 1;
        // Step over a plateau at the end; entry 0 stops it since last > 0
        while lower > 0 && self.times_us[lower] >= self.times_us[last] {
            lower -= 1;
        }
        (lower, last)
    }
}

/// Runs calibration passes through a [`Probe`]
#[derive(Debug)]
pub struct Calibrator<P = PrimeProbe> {
    config: CalibrationConfig,
    probe: P,
}

impl Calibrator<PrimeProbe> {
    /// Create a calibrator timing the prime search
    #[must_use]
    pub fn new(config: CalibrationConfig) -> Self {
        Self::with_probe(config, PrimeProbe)
    }
}

impl<P: Probe> Calibrator<P> {
    /// Create a calibrator with a custom probe
    #[must_use]
    pub fn with_probe(config: CalibrationConfig, probe: P) -> Self {
        Self { config, probe }
    }

    /// Borrow the probe
    #[must_use]
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Measure the ladder and build the table
    ///
    /// Each point is re-measured until it is slower than the previous one,
    /// up to [`MAX_TRIALS`] times, and then clamped so the table never
    /// decreases. While the last point is faster than `min_time`, the ladder
    /// grows by [`GROWTH_FACTOR`]. Only the last pass is kept.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] for a bad config and
    /// [`CoreError::DegenerateCalibration`] if the measurements cannot form
    /// a usable table
    pub fn calibrate(&mut self) -> CoreResult<CalibrationTable> {
        self.config.validate()?;

        let min_us = self.config.min_time.as_micros() as u64;
        let mut iterations = self.config.ladder();
        let mut times: Vec<u64> = vec![0; iterations.len()];

        info!(fast = self.config.fast, "Calibrating CPU crunching");
        self.probe.warm_up();

        for run in 0..self.config.min_runs {
            debug!(run = run + 1, "Starting calibration run");
            let mut growth_steps = 0;
            let mut i = 1;

            while i < iterations.len() {
                let n = iterations[i];
                let previous = times[i - 1];

                let mut trials = MAX_TRIALS;
                loop {
                    times[i] = self.probe.measure(n).as_micros() as u64;
                    trials -= 1;
                    if trials == 0 || times[i] > previous {
                        break;
                    }
                }
                times[i] = times[i].max(previous);
                debug!(iterations = n, micros = times[i], "Calibration point");

                if i == iterations.len() - 1 && times[i] < min_us {
                    if growth_steps == MAX_GROWTH_STEPS {
                        return Err(CoreError::degenerate(format!(
                            "{} iterations took {} us, min calibration time {} us not reached",
                            n, times[i], min_us
                        )));
                    }
                    growth_steps += 1;
                    let next = ((n as f64 * GROWTH_FACTOR) as u64).max(n + 1);
                    info!(
                        iterations = next,
                        min_time_us = min_us,
                        "Increasing calibration table to reach min calibration time"
                    );
                    iterations.push(next);
                    times.push(0);
                }
                i += 1;
            }
        }

        let factor = self.config.correction_factor;
        let times_us = times.into_iter().map(|t| t as f64 * factor).collect();
        let table = CalibrationTable::new(iterations, times_us)?;

        info!(
            entries = table.len(),
            max_us = table.times_us()[table.len() - 1],
            "Calibrating CPU crunching done"
        );
        Ok(table)
    }
}

/// Calibrate the prime search and share the table
///
/// # Errors
///
/// See [`Calibrator::calibrate`]
pub fn calibrate(config: &CalibrationConfig) -> CoreResult<Arc<CalibrationTable>> {
    Calibrator::new(config.clone()).calibrate().map(Arc::new)
}
