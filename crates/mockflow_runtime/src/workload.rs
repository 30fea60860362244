//! Workload tasks emulating algorithm cost.
//!
//! Each invocation draws a duration from a normal distribution around the
//! algorithm's mean, sleeps for part of it and burns CPU for the rest. The
//! busy part is converted into prime-search iterations through the shared
//! calibration table.

use crate::busywork::burn;
use crate::calibration::CalibrationTable;
use crate::seed::SeedSource;
use mockflow_core::{CoreError, CoreResult};
use mockflow_plan::Vertex;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Standard deviation rule for compiled algorithms
///
/// The deviation is `fraction` of the mean, capped at `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterPolicy {
    /// Deviation as a fraction of the mean
    pub fraction: f64,
    /// Largest deviation
    #[serde(rename = "cap_s", with = "crate::duration_secs")]
    pub cap: Duration,
}

impl Default for JitterPolicy {
    fn default() -> Self {
        Self {
            fraction: 0.01,
            cap: Duration::from_millis(1),
        }
    }
}

impl JitterPolicy {
    /// No jitter at all
    #[must_use]
    pub fn none() -> Self {
        Self {
            fraction: 0.0,
            cap: Duration::ZERO,
        }
    }

    /// Deviation for a given mean
    #[must_use]
    pub fn stddev(&self, mean: Duration) -> Duration {
        mean.mul_f64(self.fraction).min(self.cap)
    }

    /// Validate policy
    ///
    /// # Errors
    ///
    /// Returns error if the fraction is negative or not finite
    pub fn validate(&self) -> CoreResult<()> {
        if !self.fraction.is_finite() || self.fraction < 0.0 {
            return Err(CoreError::invalid_config(format!(
                "jitter fraction {} must be finite and non-negative",
                self.fraction
            )));
        }
        Ok(())
    }
}

/// Settings applied to every compiled algorithm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadPolicy {
    /// Share of each sampled duration spent sleeping
    pub sleep_fraction: f64,
    /// Deviation rule
    pub jitter: JitterPolicy,
}

impl Default for WorkloadPolicy {
    fn default() -> Self {
        Self {
            sleep_fraction: 0.0,
            jitter: JitterPolicy::default(),
        }
    }
}

impl WorkloadPolicy {
    /// Set sleep fraction
    #[must_use]
    pub fn with_sleep_fraction(mut self, fraction: f64) -> Self {
        self.sleep_fraction = fraction;
        self
    }

    /// Set jitter rule
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validate policy
    ///
    /// # Errors
    ///
    /// Returns error if the sleep fraction is outside `[0, 1]` or the
    /// jitter rule is invalid
    pub fn validate(&self) -> CoreResult<()> {
        check_sleep_fraction(self.sleep_fraction)?;
        self.jitter.validate()
    }
}

fn check_sleep_fraction(fraction: f64) -> CoreResult<()> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(CoreError::invalid_config(format!(
            "sleep fraction {} is not in [0, 1]",
            fraction
        )));
    }
    Ok(())
}

/// Duration distribution of one task
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadProfile {
    /// Mean duration
    pub mean: Duration,
    /// Standard deviation
    pub stddev: Duration,
    /// Share spent sleeping, in `[0, 1]`
    pub sleep_fraction: f64,
}

impl WorkloadProfile {
    /// Create a busy-only profile with no jitter
    #[must_use]
    pub fn new(mean: Duration) -> Self {
        Self {
            mean,
            stddev: Duration::ZERO,
            sleep_fraction: 0.0,
        }
    }

    /// Set standard deviation
    #[must_use]
    pub fn with_stddev(mut self, stddev: Duration) -> Self {
        self.stddev = stddev;
        self
    }

    /// Set sleep fraction
    #[must_use]
    pub fn with_sleep_fraction(mut self, fraction: f64) -> Self {
        self.sleep_fraction = fraction;
        self
    }
}

/// Counters kept by a task across invocations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    /// Completed invocations
    pub invocations: u64,
    /// Invocations that burned CPU
    pub burns: u64,
    /// Total prime-search iterations
    pub iterations: u64,
    /// Total time asked to sleep
    pub slept: Duration,
    /// Total sampled duration
    pub sampled: Duration,
}

/// Emulator for one algorithm
///
/// Owns its random stream and statistics; only the calibration table is
/// shared.
#[derive(Debug, Clone)]
pub struct WorkloadTask {
    name: String,
    profile: WorkloadProfile,
    distribution: Normal<f64>,
    table: Arc<CalibrationTable>,
    rng: ChaCha8Rng,
    stats: TaskStats,
}

impl WorkloadTask {
    /// Create a task
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] if the sleep fraction is
    /// outside `[0, 1]` or the distribution cannot be built
    pub fn new(
        name: impl Into<String>,
        profile: WorkloadProfile,
        table: Arc<CalibrationTable>,
        rng: ChaCha8Rng,
    ) -> CoreResult<Self> {
        let name = name.into();
        check_sleep_fraction(profile.sleep_fraction)?;
        let distribution = Normal::new(profile.mean.as_secs_f64(), profile.stddev.as_secs_f64())
            .map_err(|e| CoreError::invalid_config(format!("task '{}': {}", name, e)))?;

        Ok(Self {
            name,
            profile,
            distribution,
            table,
            rng,
            stats: TaskStats::default(),
        })
    }

    /// Task name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Duration distribution
    #[must_use]
    pub fn profile(&self) -> &WorkloadProfile {
        &self.profile
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> &TaskStats {
        &self.stats
    }

    /// Draw the next duration
    ///
    /// Negative samples are reflected to their absolute value rather than
    /// redrawn, which fattens the distribution near zero.
    pub fn sample(&mut self) -> Duration {
        let secs = self.distribution.sample(&mut self.rng).abs();
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Run one emulated execution
    pub fn invoke(&mut self) {
        let sampled = self.sample();
        let fraction = self.profile.sleep_fraction;

        if fraction > 0.0 {
            let sleep = sampled.mul_f64(fraction);
            std::thread::sleep(sleep);
            self.stats.slept += sleep;
        }
        if fraction < 1.0 {
            let work = sampled.mul_f64(1.0 - fraction);
            let iterations = self.table.estimate_iterations(work);
            burn(iterations);
            self.stats.burns += 1;
            self.stats.iterations += iterations;
        }

        self.stats.invocations += 1;
        self.stats.sampled += sampled;
        trace!(task = %self.name, sampled_us = sampled.as_micros() as u64, "Invoked");
    }
}

/// Builds tasks sharing one calibration table
#[derive(Debug, Clone)]
pub struct WorkloadFactory {
    table: Arc<CalibrationTable>,
    seed: SeedSource,
    policy: WorkloadPolicy,
    created: u64,
}

impl WorkloadFactory {
    /// Create a factory
    #[must_use]
    pub fn new(table: Arc<CalibrationTable>, seed: SeedSource, policy: WorkloadPolicy) -> Self {
        Self {
            table,
            seed,
            policy,
            created: 0,
        }
    }

    /// Shared calibration table
    #[must_use]
    pub fn table(&self) -> &Arc<CalibrationTable> {
        &self.table
    }

    /// Number of tasks made so far
    #[must_use]
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Make a task with the given mean
    ///
    /// # Errors
    ///
    /// Returns error if the policy yields an invalid task
    pub fn make(&mut self, name: &str, mean: Duration) -> CoreResult<WorkloadTask> {
        let profile = WorkloadProfile::new(mean)
            .with_stddev(self.policy.jitter.stddev(mean))
            .with_sleep_fraction(self.policy.sleep_fraction);
        let rng = self.seed.rng(self.created, name);
        self.created += 1;
        WorkloadTask::new(name, profile, Arc::clone(&self.table), rng)
    }

    /// Make a task for an algorithm vertex
    ///
    /// # Errors
    ///
    /// Returns error if the vertex runtime is not a valid duration
    pub fn for_vertex(&mut self, vertex: &Vertex) -> CoreResult<WorkloadTask> {
        let mean = Duration::try_from_secs_f64(vertex.runtime_s).map_err(|e| {
            CoreError::invalid_config(format!("runtime of '{}': {}", vertex.name, e))
        })?;
        self.make(&vertex.name, mean)
    }
}
