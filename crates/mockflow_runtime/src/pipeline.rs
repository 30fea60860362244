//! Event pipeline.
//!
//! Tokens flow through three stages:
//!
//! 1. admission, serial: one token at a time in increasing order, until the
//!    stage answers [`Admission::Stop`]
//! 2. execution, one per line: each line handles its own tokens in
//!    admission order while lines run in parallel
//! 3. completion, same discipline as execution
//!
//! Token `t` goes to line `t % lines`. Admission runs on the calling thread.
//! It waits until the target line reports itself idle, then admits the token
//! and hands it over, so a line holds at most one token. A line that has
//! failed never reports idle again, and admission stops without admitting
//! anything for it. After a stop, tokens already handed out drain through
//! the last two stages before [`PipelineRunner::run`] returns.

use crate::executor::{ExecutionService, Job};
use crate::monitor::{EventRecorder, Stage};
use crossbeam::channel;
use mockflow_core::{CoreError, CoreResult, EventToken, LineId};
use mockflow_plan::PrecedenceSchedule;
use std::marker::PhantomData;
use tracing::{debug, info};

/// Answer of the admission stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Let the token in
    Admit,
    /// Admit nothing more
    Stop,
}

/// The three stage callables
pub trait PipelineStages: Sync {
    /// Per-line state handed to the execution stage
    type Line: Send;

    /// Serial admission of the next token, bound for `line`
    fn admit(&self, token: EventToken, line: LineId) -> Admission;

    /// Process a token on its line
    ///
    /// # Errors
    ///
    /// An error stops the line; admission stops once it next targets it
    fn execute(&self, line: LineId, state: &mut Self::Line, token: EventToken) -> CoreResult<()>;

    /// Observe a finished token
    fn complete(&self, line: LineId, token: EventToken);
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Tokens handed to a line
    pub admitted: u64,
    /// Tokens completed per line
    pub per_line: Vec<u64>,
}

impl PipelineSummary {
    /// Total completed tokens
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.per_line.iter().sum()
    }
}

/// Drives tokens through [`PipelineStages`] across line threads
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineRunner;

impl PipelineRunner {
    /// Create a runner
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run until admission stops and every admitted token completes
    ///
    /// # Errors
    ///
    /// Returns error if `lines` is empty, a line thread cannot be spawned,
    /// or any execution fails
    pub fn run<S: PipelineStages>(
        &self,
        stages: &S,
        lines: &mut [S::Line],
    ) -> CoreResult<PipelineSummary> {
        if lines.is_empty() {
            return Err(CoreError::invalid_config("pipeline needs at least one line"));
        }
        let count = lines.len() as u64;

        std::thread::scope(|scope| {
            let mut senders = Vec::with_capacity(lines.len());
            let mut idle = Vec::with_capacity(lines.len());
            let mut handles = Vec::with_capacity(lines.len());

            for (index, state) in lines.iter_mut().enumerate() {
                let line = LineId::new(index as u32);
                let (tx, rx) = channel::bounded::<EventToken>(1);
                let (idle_tx, idle_rx) = channel::bounded::<()>(1);
                let handle = std::thread::Builder::new()
                    .name(format!("mockflow-{}", line))
                    .spawn_scoped(scope, move || -> CoreResult<u64> {
                        let mut processed = 0;
                        while idle_tx.send(()).is_ok() {
                            let Ok(token) = rx.recv() else { break };
                            stages.execute(line, state, token)?;
                            stages.complete(line, token);
                            processed += 1;
                        }
                        Ok(processed)
                    })?;
                senders.push(tx);
                idle.push(idle_rx);
                handles.push(handle);
            }

            let mut admitted = 0;
            let mut token = EventToken::new(0);
            loop {
                let line = (token.as_u64() % count) as usize;
                if idle[line].recv().is_err() {
                    debug!(%token, line, "Line closed, stopping admission");
                    break;
                }
                if stages.admit(token, LineId::new(line as u32)) == Admission::Stop {
                    break;
                }
                // The line is parked on its receiver, so this cannot fail
                if senders[line].send(token).is_err() {
                    break;
                }
                admitted += 1;
                token = token.next();
            }
            drop(senders);
            drop(idle);

            let mut per_line = Vec::with_capacity(handles.len());
            let mut first_error = None;
            for handle in handles {
                match handle.join() {
                    Ok(Ok(processed)) => per_line.push(processed),
                    Ok(Err(e)) => {
                        per_line.push(0);
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        per_line.push(0);
                        first_error.get_or_insert(CoreError::Internal {
                            message: "pipeline line panicked".to_string(),
                        });
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(PipelineSummary { admitted, per_line }),
            }
        })
    }
}

/// Pipeline running one precedence schedule per token
///
/// Admits tokens below `max_events` and logs the begin and end of each
/// event.
pub struct EventPipeline<'a, E, J> {
    executor: &'a E,
    max_events: u64,
    recorder: &'a EventRecorder,
    _job: PhantomData<fn() -> J>,
}

impl<'a, E: ExecutionService, J: Job> EventPipeline<'a, E, J> {
    /// Create a pipeline
    #[must_use]
    pub fn new(executor: &'a E, max_events: u64, recorder: &'a EventRecorder) -> Self {
        Self {
            executor,
            max_events,
            recorder,
            _job: PhantomData,
        }
    }
}

impl<E: ExecutionService, J: Job> PipelineStages for EventPipeline<'_, E, J> {
    type Line = PrecedenceSchedule<J>;

    fn admit(&self, token: EventToken, line: LineId) -> Admission {
        if token.as_u64() >= self.max_events {
            return Admission::Stop;
        }
        info!("Begin event: {}", token);
        self.recorder.record(Stage::Admitted, token, line);
        Admission::Admit
    }

    fn execute(&self, line: LineId, schedule: &mut Self::Line, token: EventToken) -> CoreResult<()> {
        self.executor.run(schedule)?;
        self.recorder.record(Stage::Executed, token, line);
        Ok(())
    }

    fn complete(&self, line: LineId, token: EventToken) {
        info!("End event: {}", token);
        self.recorder.record(Stage::Completed, token, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::InlineExecutor;
    use mockflow_core::NodeId;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    /// Stage log shared by all lines
    struct Recording {
        max: u64,
        admitted: Mutex<Vec<EventToken>>,
        executed: Mutex<Vec<(LineId, EventToken)>>,
        completed: Mutex<Vec<(LineId, EventToken)>>,
        fail_on: Option<EventToken>,
    }

    impl Recording {
        fn new(max: u64) -> Self {
            Self {
                max,
                admitted: Mutex::new(Vec::new()),
                executed: Mutex::new(Vec::new()),
                completed: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }
    }

    impl PipelineStages for Recording {
        type Line = Vec<EventToken>;

        fn admit(&self, token: EventToken, _line: LineId) -> Admission {
            if token.as_u64() >= self.max {
                return Admission::Stop;
            }
            self.admitted.lock().push(token);
            Admission::Admit
        }

        fn execute(&self, line: LineId, seen: &mut Vec<EventToken>, token: EventToken) -> CoreResult<()> {
            if self.fail_on == Some(token) {
                return Err(CoreError::Internal {
                    message: format!("failed on {}", token),
                });
            }
            seen.push(token);
            self.executed.lock().push((line, token));
            Ok(())
        }

        fn complete(&self, line: LineId, token: EventToken) {
            self.completed.lock().push((line, token));
        }
    }

    fn tokens(range: impl IntoIterator<Item = u64>) -> Vec<EventToken> {
        range.into_iter().map(EventToken::new).collect()
    }

    #[test]
    fn test_five_events_two_lines() {
        let stages = Recording::new(5);
        let mut lines = vec![Vec::new(), Vec::new()];
        let summary = PipelineRunner::new().run(&stages, lines.as_mut_slice()).unwrap();

        assert_eq!(summary.admitted, 5);
        assert_eq!(summary.per_line, vec![3, 2]);
        assert_eq!(summary.completed(), 5);
        assert_eq!(*stages.admitted.lock(), tokens(0..5));
        assert_eq!(lines[0], tokens([0, 2, 4]));
        assert_eq!(lines[1], tokens([1, 3]));

        let mut completed: Vec<_> = stages.completed.lock().iter().map(|(_, t)| *t).collect();
        completed.sort();
        assert_eq!(completed, tokens(0..5));
    }

    #[test]
    fn test_zero_events() {
        let stages = Recording::new(0);
        let mut lines = vec![Vec::new()];
        let summary = PipelineRunner::new().run(&stages, lines.as_mut_slice()).unwrap();
        assert_eq!(summary.admitted, 0);
        assert!(stages.executed.lock().is_empty());
    }

    #[test]
    fn test_no_lines_rejected() {
        let stages = Recording::new(3);
        let mut lines: Vec<Vec<EventToken>> = Vec::new();
        let err = PipelineRunner::new().run(&stages, lines.as_mut_slice()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_execution_error_stops_pipeline() {
        let mut stages = Recording::new(100);
        stages.fail_on = Some(EventToken::new(1));
        let mut lines = vec![Vec::new(), Vec::new()];
        let err = PipelineRunner::new().run(&stages, lines.as_mut_slice()).unwrap_err();

        assert!(matches!(err, CoreError::Internal { .. }));
        assert!(lines[1].is_empty());
        assert!(stages.admitted.lock().len() < 100);
    }

    #[test]
    fn test_failed_line_admits_nothing_more() {
        let mut stages = Recording::new(100);
        stages.fail_on = Some(EventToken::new(1));
        let mut lines = vec![Vec::new(), Vec::new()];
        assert!(PipelineRunner::new().run(&stages, lines.as_mut_slice()).is_err());

        // token 3 would go to the failed line and is never admitted
        assert_eq!(*stages.admitted.lock(), tokens(0..3));
        let executed: Vec<_> = stages.executed.lock().iter().map(|(_, t)| *t).collect();
        assert_eq!(executed, tokens([0, 2]));
        assert_eq!(lines[0], tokens([0, 2]));
    }

    #[test]
    fn test_event_pipeline_records_only_handed_tokens() {
        struct Failing;

        impl Job for Failing {
            fn run(&mut self) {}
        }

        // a two-node cycle makes every execution fail
        let recorder = EventRecorder::new();
        let pipeline: EventPipeline<'_, InlineExecutor, Failing> =
            EventPipeline::new(&InlineExecutor, 10, &recorder);
        let mut schedule = PrecedenceSchedule::new();
        schedule.add_node(NodeId::new(0), "A", Failing).unwrap();
        schedule.add_node(NodeId::new(1), "B", Failing).unwrap();
        schedule
            .add_edge(mockflow_plan::Edge::new(NodeId::new(0), NodeId::new(1)))
            .unwrap();
        schedule
            .add_edge(mockflow_plan::Edge::new(NodeId::new(1), NodeId::new(0)))
            .unwrap();
        let mut lines = vec![schedule];

        let err = PipelineRunner::new().run(&pipeline, lines.as_mut_slice()).unwrap_err();
        assert!(matches!(err, CoreError::CyclicSchedule { .. }));
        assert_eq!(recorder.tokens(Stage::Admitted), tokens([0]));
        assert!(recorder.tokens(Stage::Executed).is_empty());
    }

    struct Count(u64);

    impl Job for Count {
        fn run(&mut self) {
            self.0 += 1;
        }
    }

    #[test]
    fn test_event_pipeline_runs_schedule_per_token() {
        let recorder = EventRecorder::new();
        let pipeline: EventPipeline<'_, InlineExecutor, Count> =
            EventPipeline::new(&InlineExecutor, 5, &recorder);
        let mut lines: Vec<PrecedenceSchedule<Count>> = (0..2)
            .map(|_| {
                let mut schedule = PrecedenceSchedule::new();
                schedule.add_node(NodeId::new(0), "A", Count(0)).unwrap();
                schedule
            })
            .collect();

        let summary = PipelineRunner::new().run(&pipeline, lines.as_mut_slice()).unwrap();
        assert_eq!(summary.admitted, 5);

        let counts: Vec<u64> = lines.iter().flat_map(|s| s.payloads().map(|c| c.0)).collect();
        assert_eq!(counts, vec![3, 2]);

        assert_eq!(recorder.tokens(Stage::Admitted), tokens(0..5));
        assert_eq!(
            recorder.line_tokens(LineId::new(1), Stage::Completed),
            tokens([1, 3])
        );
        let metrics = recorder.metrics();
        assert!(metrics.is_drained());
        assert!(metrics.max_in_flight <= 2 + 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_tokens_covered_once_in_order(max in 0u64..24, count in 1usize..5) {
            let stages = Recording::new(max);
            let mut lines = vec![Vec::new(); count];
            let summary = PipelineRunner::new().run(&stages, lines.as_mut_slice()).unwrap();

            prop_assert_eq!(summary.admitted, max);
            prop_assert_eq!(stages.admitted.lock().clone(), tokens(0..max));

            let mut all = Vec::new();
            for (index, seen) in lines.iter().enumerate() {
                prop_assert!(seen.windows(2).all(|w| w[0] < w[1]));
                prop_assert!(seen.iter().all(|t| t.as_u64() as usize % count == index));
                all.extend(seen.iter().copied());
            }
            all.sort();
            prop_assert_eq!(all, tokens(0..max));
        }
    }
}
