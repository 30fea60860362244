//! Event monitor and trial timings.
//!
//! The recorder collects one entry per pipeline stage transition. Metrics
//! are derived from the recorded sequence after a trial.

use mockflow_core::{EventToken, LineId, RunId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Pipeline stage a record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Token admitted by the serial stage
    Admitted,
    /// Line finished running its schedule for the token
    Executed,
    /// Token completed
    Completed,
}

/// One stage transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Stage reached
    pub stage: Stage,
    /// Token
    pub token: EventToken,
    /// Line handling the token
    pub line: LineId,
    /// Time since the recorder was started or cleared
    pub at: Duration,
}

/// Execution metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metrics {
    /// Tokens admitted
    pub admitted: u64,
    /// Tokens executed
    pub executed: u64,
    /// Tokens completed
    pub completed: u64,
    /// Largest number of admitted but not completed tokens
    pub max_in_flight: u64,
}

impl Metrics {
    /// Check that every admitted token completed
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.admitted == self.completed && self.executed == self.completed
    }
}

/// Thread-safe log of stage transitions
#[derive(Debug)]
pub struct EventRecorder {
    origin: Mutex<Instant>,
    records: Mutex<Vec<EventRecord>>,
}

impl EventRecorder {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Mutex::new(Instant::now()),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Record a transition
    pub fn record(&self, stage: Stage, token: EventToken, line: LineId) {
        let at = self.origin.lock().elapsed();
        self.records.lock().push(EventRecord {
            stage,
            token,
            line,
            at,
        });
    }

    /// Copy of all records in arrival order
    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    /// Tokens that reached `stage`, in arrival order
    #[must_use]
    pub fn tokens(&self, stage: Stage) -> Vec<EventToken> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.stage == stage)
            .map(|r| r.token)
            .collect()
    }

    /// Tokens that reached `stage` on one line, in arrival order
    #[must_use]
    pub fn line_tokens(&self, line: LineId, stage: Stage) -> Vec<EventToken> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.stage == stage && r.line == line)
            .map(|r| r.token)
            .collect()
    }

    /// Derive metrics from the records
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        let mut metrics = Metrics::default();
        let mut in_flight: u64 = 0;
        for record in self.records.lock().iter() {
            match record.stage {
                Stage::Admitted => {
                    metrics.admitted += 1;
                    in_flight += 1;
                    metrics.max_in_flight = metrics.max_in_flight.max(in_flight);
                }
                Stage::Executed => metrics.executed += 1,
                Stage::Completed => {
                    metrics.completed += 1;
                    in_flight = in_flight.saturating_sub(1);
                }
            }
        }
        metrics
    }

    /// Drop all records and restart the clock
    pub fn clear(&self) {
        self.records.lock().clear();
        *self.origin.lock() = Instant::now();
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Wall time and throughput of one trial
///
/// Field order matches the timing CSV columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialTiming {
    /// Trial identifier
    #[serde(skip)]
    pub run_id: RunId,
    /// Elapsed seconds
    #[serde(rename = "time")]
    pub time_s: f64,
    /// Events per second
    pub throughput: f64,
    /// Worker threads
    pub threads: usize,
    /// Events processed
    pub event_count: u64,
    /// Concurrent lines
    pub max_concurrent: usize,
}

impl TrialTiming {
    /// Build a timing from a measured duration
    #[must_use]
    pub fn new(
        run_id: RunId,
        elapsed: Duration,
        event_count: u64,
        threads: usize,
        max_concurrent: usize,
    ) -> Self {
        let time_s = elapsed.as_secs_f64();
        let throughput = if time_s > 0.0 {
            event_count as f64 / time_s
        } else {
            0.0
        };
        Self {
            run_id,
            time_s,
            throughput,
            threads,
            event_count,
            max_concurrent,
        }
    }
}

impl std::fmt::Display for TrialTiming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Execution time: {} s (Throughput: {} evt/s)",
            self.time_s, self.throughput
        )
    }
}
