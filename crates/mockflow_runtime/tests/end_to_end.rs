//! Workflow graphs driven through the engine.

use mockflow_core::{EventToken, LineId};
use mockflow_plan::{parse_workflow, Vertex, WorkflowGraph};
use mockflow_runtime::{
    CalibrationTable, EngineConfig, ExecutionEngine, InlineExecutor, JitterPolicy, RayonExecutor,
    SeedSource, Stage, WorkloadPolicy,
};
use std::sync::Arc;
use std::time::Duration;

/// Ten iterations per millisecond, far cheaper than a real calibration
fn table() -> Arc<CalibrationTable> {
    Arc::new(CalibrationTable::new(vec![0, 10], vec![0.0, 1000.0]).unwrap())
}

fn sleeping() -> WorkloadPolicy {
    WorkloadPolicy::default()
        .with_sleep_fraction(1.0)
        .with_jitter(JitterPolicy::none())
}

fn tokens(values: &[u64]) -> Vec<EventToken> {
    values.iter().copied().map(EventToken::new).collect()
}

#[test]
fn test_sleeping_algorithm_three_events() {
    let mut graph = WorkflowGraph::new();
    graph.add_vertex(Vertex::algorithm("A", 0.01));

    let config = EngineConfig::default()
        .with_lines(1)
        .with_max_events(3)
        .with_workload(sleeping());
    let mut engine =
        ExecutionEngine::with_parts(config, &graph, table(), RayonExecutor::new(2).unwrap())
            .unwrap();

    let timing = engine.run_trial().unwrap();
    assert!(timing.time_s >= 0.03, "took {} s", timing.time_s);
    assert!(timing.time_s < 1.0, "took {} s", timing.time_s);
    assert_eq!(timing.event_count, 3);

    let stats: Vec<_> = engine.task_stats().collect();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].1, "A");
    assert_eq!(stats[0].2.invocations, 3);
    assert_eq!(engine.recorder().tokens(Stage::Completed), tokens(&[0, 1, 2]));
}

#[test]
fn test_fan_out_on_two_lines() {
    // P produces D, read by C1 and C2
    let input = r#"{
        "nodes": [
            { "id": "P", "type": "Algorithm", "runtime_average_s": 0.002 },
            { "id": "D", "type": "DataObject", "size_average_B": 128 },
            { "id": "C1", "type": "Algorithm", "runtime_average_s": 0.002 },
            { "id": "C2", "type": "Algorithm", "runtime_average_s": 0.002 }
        ],
        "links": [
            { "source": "P", "target": "D" },
            { "source": "D", "target": "C1" },
            { "source": "D", "target": "C2" }
        ]
    }"#;
    let graph = parse_workflow(input).unwrap();

    let config = EngineConfig::default()
        .with_lines(2)
        .with_max_events(5)
        .with_workload(sleeping())
        .with_seed(SeedSource::Fixed(17));
    let mut engine =
        ExecutionEngine::with_parts(config, &graph, table(), RayonExecutor::new(4).unwrap())
            .unwrap();
    engine.run_trial().unwrap();

    let recorder = engine.recorder();
    assert_eq!(recorder.tokens(Stage::Admitted), tokens(&[0, 1, 2, 3, 4]));
    assert_eq!(
        recorder.line_tokens(LineId::new(0), Stage::Completed),
        tokens(&[0, 2, 4])
    );
    assert_eq!(
        recorder.line_tokens(LineId::new(1), Stage::Completed),
        tokens(&[1, 3])
    );
    assert!(engine.metrics().is_drained());

    for (line, name, stats) in engine.task_stats() {
        let expected = if line == LineId::new(0) { 3 } else { 2 };
        assert_eq!(stats.invocations, expected, "{} on {}", name, line);
    }
}

#[test]
fn test_lines_overlap_in_time() {
    let mut graph = WorkflowGraph::new();
    graph.add_vertex(Vertex::algorithm("A", 0.05));

    let config = EngineConfig::default()
        .with_lines(4)
        .with_max_events(4)
        .with_workload(sleeping());
    let mut engine =
        ExecutionEngine::with_parts(config, &graph, table(), InlineExecutor).unwrap();

    let timing = engine.run_trial().unwrap();
    // four sleeps of 50 ms on four lines run side by side
    assert!(timing.time_s < 0.18, "took {} s", timing.time_s);
    assert!(engine.metrics().max_in_flight >= 2);
    assert!(engine.metrics().is_drained());
}

#[test]
fn test_busy_work_counts_iterations() {
    let mut graph = WorkflowGraph::new();
    graph.add_vertex(Vertex::algorithm("A", 0.002));

    let policy = WorkloadPolicy::default().with_jitter(JitterPolicy::none());
    let config = EngineConfig::default()
        .with_max_events(2)
        .with_workload(policy);
    let mut engine =
        ExecutionEngine::with_parts(config, &graph, table(), InlineExecutor).unwrap();
    engine.run_trial().unwrap();

    let (_, _, stats) = engine.task_stats().next().unwrap();
    assert_eq!(stats.burns, 2);
    assert_eq!(stats.iterations, 40);
    assert_eq!(stats.sampled, Duration::from_millis(4));
}
