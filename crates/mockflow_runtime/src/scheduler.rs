//! Deterministic readiness tracking for sequential schedule execution.
//!
//! Nodes are addressed by their index in an [`ExecutionPlan`]. Among the
//! ready nodes the lowest index always runs first, so a sequential run
//! visits nodes in the same order every time.

use mockflow_core::{CoreError, CoreResult};
use mockflow_plan::ExecutionPlan;
use std::collections::BTreeSet;

/// Scheduling decision - which node to run next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Run this node next
    Run(usize),
    /// Nothing is ready but nodes remain
    Wait,
    /// No more nodes to run
    Complete,
}

/// Readiness tracker over a plan
#[derive(Debug, Clone)]
pub struct Scheduler {
    plan: ExecutionPlan,
    /// Unfinished dependencies per node
    remaining: Vec<usize>,
    ready: BTreeSet<usize>,
    completed: Vec<bool>,
    completed_count: usize,
}

impl Scheduler {
    /// Create a scheduler with the plan's roots ready
    #[must_use]
    pub fn from_plan(plan: ExecutionPlan) -> Self {
        let len = plan.len();
        let mut scheduler = Self {
            remaining: plan.indegree.clone(),
            ready: BTreeSet::new(),
            completed: vec![false; len],
            completed_count: 0,
            plan,
        };
        scheduler.reset();
        scheduler
    }

    /// Get the next scheduling decision
    #[must_use]
    pub fn decide(&self) -> ScheduleDecision {
        if let Some(&index) = self.ready.first() {
            ScheduleDecision::Run(index)
        } else if self.completed_count < self.plan.len() {
            ScheduleDecision::Wait
        } else {
            ScheduleDecision::Complete
        }
    }

    /// Mark a node as completed
    ///
    /// # Errors
    ///
    /// Returns error if node wasn't ready
    pub fn mark_complete(&mut self, index: usize) -> CoreResult<()> {
        if !self.ready.remove(&index) {
            return Err(CoreError::Internal {
                message: format!("node {} completed without being ready", index),
            });
        }
        self.completed[index] = true;
        self.completed_count += 1;

        for &next in &self.plan.dependents[index] {
            self.remaining[next] -= 1;
            if self.remaining[next] == 0 {
                self.ready.insert(next);
            }
        }
        Ok(())
    }

    /// Nodes not yet completed
    #[must_use]
    pub fn pending(&self) -> Vec<usize> {
        self.completed
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(i, _)| i)
            .collect()
    }

    /// Reset the scheduler state
    pub fn reset(&mut self) {
        self.remaining.clone_from(&self.plan.indegree);
        self.ready = self.plan.roots.iter().copied().collect();
        self.completed.fill(false);
        self.completed_count = 0;
    }
}
