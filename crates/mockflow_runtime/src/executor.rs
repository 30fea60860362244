//! Execution services for precedence schedules.
//!
//! A service runs every node of a schedule once, never starting a node
//! before all of its dependencies have finished.

use crate::scheduler::{ScheduleDecision, Scheduler};
use crate::workload::WorkloadTask;
use mockflow_core::{CoreError, CoreResult};
use mockflow_plan::{ExecutionPlan, PrecedenceSchedule};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Unit of work attached to a schedule node
pub trait Job: Send {
    /// Run once
    fn run(&mut self);
}

impl Job for WorkloadTask {
    fn run(&mut self) {
        self.invoke();
    }
}

/// Runs a schedule to completion
pub trait ExecutionService: Sync {
    /// Run every node once in dependency order
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CyclicSchedule`] if some nodes can never become
    /// ready
    fn run<J: Job>(&self, schedule: &mut PrecedenceSchedule<J>) -> CoreResult<()>;

    /// Upper bound on nodes running at once
    fn concurrency(&self) -> usize;
}

fn stalled<J>(schedule: &PrecedenceSchedule<J>, pending: &[usize]) -> CoreError {
    let nodes = schedule
        .nodes()
        .enumerate()
        .filter(|(i, _)| pending.contains(i))
        .map(|(_, node)| node.name.clone())
        .collect();
    CoreError::CyclicSchedule { nodes }
}

/// Runs nodes on a bounded rayon pool
///
/// Ready nodes run concurrently. A node is spawned by whichever dependency
/// finishes last.
#[derive(Debug)]
pub struct RayonExecutor {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl RayonExecutor {
    /// Create an executor with `threads` workers
    ///
    /// # Errors
    ///
    /// Returns error if `threads` is zero or the pool cannot be built
    pub fn new(threads: usize) -> CoreResult<Self> {
        if threads == 0 {
            return Err(CoreError::invalid_config("executor needs at least one thread"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mockflow-worker-{}", i))
            .build()
            .map_err(|e| CoreError::Internal {
                message: format!("failed to build thread pool: {}", e),
            })?;
        debug!(threads, "Started worker pool");
        Ok(Self { pool, threads })
    }
}

struct Shared<'j, J> {
    plan: ExecutionPlan,
    pending: Vec<AtomicUsize>,
    jobs: Vec<Mutex<&'j mut J>>,
    finished: AtomicUsize,
}

fn spawn_node<'s, J: Job>(scope: &rayon::Scope<'s>, shared: &'s Shared<'_, J>, index: usize) {
    scope.spawn(move |scope| {
        shared.jobs[index].lock().run();
        shared.finished.fetch_add(1, Ordering::AcqRel);

        for &next in &shared.plan.dependents[index] {
            if shared.pending[next].fetch_sub(1, Ordering::AcqRel) == 1 {
                spawn_node(scope, shared, next);
            }
        }
    });
}

impl ExecutionService for RayonExecutor {
    fn run<J: Job>(&self, schedule: &mut PrecedenceSchedule<J>) -> CoreResult<()> {
        let plan = schedule.execution_plan();
        if plan.is_empty() {
            return Ok(());
        }
        let total = plan.len();

        let pending_nodes = {
            let shared = Shared {
                pending: plan.indegree.iter().map(|&d| AtomicUsize::new(d)).collect(),
                jobs: schedule.payloads_mut().map(Mutex::new).collect(),
                finished: AtomicUsize::new(0),
                plan,
            };

            self.pool.scope(|scope| {
                for &root in &shared.plan.roots {
                    spawn_node(scope, &shared, root);
                }
            });

            if shared.finished.load(Ordering::Acquire) == total {
                return Ok(());
            }
            shared
                .pending
                .iter()
                .enumerate()
                .filter(|(_, p)| p.load(Ordering::Acquire) > 0)
                .map(|(i, _)| i)
                .collect::<Vec<_>>()
        };

        Err(stalled(schedule, &pending_nodes))
    }

    fn concurrency(&self) -> usize {
        self.threads
    }
}

/// Runs nodes one at a time on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl ExecutionService for InlineExecutor {
    fn run<J: Job>(&self, schedule: &mut PrecedenceSchedule<J>) -> CoreResult<()> {
        let mut scheduler = Scheduler::from_plan(schedule.execution_plan());

        let pending_nodes = {
            let mut jobs: Vec<&mut J> = schedule.payloads_mut().collect();
            loop {
                match scheduler.decide() {
                    ScheduleDecision::Run(index) => {
                        jobs[index].run();
                        scheduler.mark_complete(index)?;
                    }
                    ScheduleDecision::Wait => break scheduler.pending(),
                    ScheduleDecision::Complete => return Ok(()),
                }
            }
        };

        Err(stalled(schedule, &pending_nodes))
    }

    fn concurrency(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockflow_core::NodeId;
    use mockflow_plan::Edge;
    use std::sync::Arc;
    use std::time::Duration;

    /// Records its name into a shared log when run
    struct Probe {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        runs: usize,
        delay: Duration,
    }

    impl Job for Probe {
        fn run(&mut self) {
            std::thread::sleep(self.delay);
            self.runs += 1;
            self.log.lock().push(self.name);
        }
    }

    fn diamond(log: &Arc<Mutex<Vec<&'static str>>>) -> PrecedenceSchedule<Probe> {
        let mut schedule = PrecedenceSchedule::new();
        for (i, name) in ["A", "B", "C", "D"].into_iter().enumerate() {
            let probe = Probe {
                name,
                log: Arc::clone(log),
                runs: 0,
                delay: Duration::from_millis(2),
            };
            schedule.add_node(NodeId::new(i as u32), name, probe).unwrap();
        }
        let n = NodeId::new;
        for (from, to) in [(0, 1), (0, 2), (1, 3), (2, 3)] {
            schedule.add_edge(Edge::new(n(from), n(to))).unwrap();
        }
        schedule
    }

    fn assert_diamond_order(order: &[&str]) {
        let pos = |name: &str| order.iter().position(|n| *n == name).unwrap();
        assert_eq!(order.len(), 4);
        assert!(pos("A") < pos("B"));
        assert!(pos("A") < pos("C"));
        assert!(pos("B") < pos("D"));
        assert!(pos("C") < pos("D"));
    }

    #[test]
    fn test_inline_executor_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut schedule = diamond(&log);
        InlineExecutor.run(&mut schedule).unwrap();
        assert_eq!(*log.lock(), vec!["A", "B", "C", "D"]);
        assert!(schedule.payloads().all(|p| p.runs == 1));
    }

    #[test]
    fn test_rayon_executor_respects_edges() {
        let executor = RayonExecutor::new(4).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut schedule = diamond(&log);

        for _ in 0..3 {
            log.lock().clear();
            executor.run(&mut schedule).unwrap();
            assert_diamond_order(&log.lock());
        }
        assert!(schedule.payloads().all(|p| p.runs == 3));
        assert_eq!(executor.concurrency(), 4);
    }

    #[test]
    fn test_rayon_executor_zero_threads() {
        let err = RayonExecutor::new(0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_empty_schedule() {
        let mut schedule: PrecedenceSchedule<Probe> = PrecedenceSchedule::new();
        assert!(InlineExecutor.run(&mut schedule).is_ok());
        assert!(RayonExecutor::new(1).unwrap().run(&mut schedule).is_ok());
    }

    #[test]
    fn test_cycle_reported() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut schedule = diamond(&log);
        // D -> B closes B -> D -> B
        schedule
            .add_edge(Edge::new(NodeId::new(3), NodeId::new(1)))
            .unwrap();

        let err = InlineExecutor.run(&mut schedule).unwrap_err();
        assert_eq!(
            err,
            CoreError::CyclicSchedule {
                nodes: vec!["B".to_string(), "D".to_string()]
            }
        );

        let err = RayonExecutor::new(2).unwrap().run(&mut schedule).unwrap_err();
        assert!(matches!(err, CoreError::CyclicSchedule { .. }));
    }
}
